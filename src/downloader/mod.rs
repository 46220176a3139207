use anyhow::{Context, Result};
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::core::model::{DownloadDirective, PluginRecord};
use crate::data::Settings;

pub mod repair;
pub mod source;

pub use source::{resolve_source, SkipReason, SourceUrl};


#[derive(Debug, Error)]
pub enum FetchError {
    #[error("skipped {url}: {reason}")]
    Skipped { url: String, reason: SkipReason },
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<ureq::Transport>,
    },
    #[error("failed to read body of {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected an object or an array of objects, found {0}")]
    UnexpectedShape(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadStatus {
    Completed { size: u64, path: PathBuf },
    Failed(String),
}

impl DownloadStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, DownloadStatus::Completed { .. })
    }
}

/// Blocking HTTP client pair: a short-timeout agent for repository metadata
/// and a longer one for auxiliary file downloads.
#[derive(Clone)]
pub struct Downloader {
    metadata: ureq::Agent,
    files: ureq::Agent,
}

impl Downloader {
    pub fn new(settings: &Settings) -> Self {
        Self {
            metadata: agent(settings, settings.fetch_timeout_secs),
            files: agent(settings, settings.download_timeout_secs),
        }
    }

    /// Fetch `url` and parse it into plugin records.
    pub fn fetch_records(&self, url: &str) -> Result<Vec<PluginRecord>, FetchError> {
        let target = match resolve_source(url) {
            SourceUrl::Fetch(target) => target,
            SourceUrl::Skip(reason) => {
                return Err(FetchError::Skipped {
                    url: url.to_string(),
                    reason,
                })
            }
        };
        info!(url = %target, "fetching plugin metadata");

        let body = get(&self.metadata, &target)?;
        let text = String::from_utf8_lossy(&body);
        repair::parse_records(&text)
    }

    /// Like [`Downloader::fetch_records`], but every failure is logged and
    /// collapsed into `None` so callers can move on to the next source.
    pub fn fetch_plugin_data(&self, url: &str) -> Option<Vec<PluginRecord>> {
        match self.fetch_records(url) {
            Ok(records) => Some(records),
            Err(FetchError::Skipped { url, reason }) => {
                info!(%url, %reason, "source skipped");
                None
            }
            Err(e) => {
                warn!(%url, error = %e, "failed to fetch plugin metadata");
                None
            }
        }
    }

    /// Run every directive in order; a failure never stops the rest.
    pub fn run_downloads(&self, directives: &[DownloadDirective]) -> Vec<DownloadStatus> {
        directives.iter().map(|d| self.download(d)).collect()
    }

    pub fn download(&self, directive: &DownloadDirective) -> DownloadStatus {
        info!(url = %directive.url, filename = %directive.filename, "downloading");
        match self.download_once(directive) {
            Ok(status) => {
                if let DownloadStatus::Completed { size, path } = &status {
                    info!(size, path = %path.display(), "download complete");
                }
                status
            }
            Err(e) => {
                warn!(filename = %directive.filename, error = %format!("{e:#}"), "download failed");
                DownloadStatus::Failed(format!("{e:#}"))
            }
        }
    }

    fn download_once(&self, directive: &DownloadDirective) -> Result<DownloadStatus> {
        std::fs::create_dir_all(&directive.dir)
            .with_context(|| format!("creating {}", directive.dir.display()))?;

        let body = get(&self.files, &directive.url)?;
        let path = directive.target_path();
        std::fs::write(&path, &body).with_context(|| format!("writing {}", path.display()))?;
        Ok(DownloadStatus::Completed {
            size: body.len() as u64,
            path,
        })
    }
}

fn agent(settings: &Settings, timeout_secs: u64) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .user_agent(&settings.user_agent)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
}

/// GET `url` and return the full body; non-2xx statuses are errors.
fn get(agent: &ureq::Agent, url: &str) -> Result<Vec<u8>, FetchError> {
    let resp = agent.get(url).call().map_err(|e| match e {
        ureq::Error::Status(status, _) => FetchError::Status {
            url: url.to_string(),
            status,
        },
        ureq::Error::Transport(t) => FetchError::Transport {
            url: url.to_string(),
            source: Box::new(t),
        },
    })?;

    let mut body = Vec::new();
    resp.into_reader()
        .read_to_end(&mut body)
        .map_err(|source| FetchError::Body {
            url: url.to_string(),
            source,
        })?;
    Ok(body)
}
