//! Loading of the sync configuration.
//!
//! Two formats produce the same [`SyncConfig`]:
//!
//! * the annotation format (`origin_repo.ini`), where plugin names are
//!   written as `#` comments above the source URL they come from and
//!   auxiliary downloads are spelled out as a fixed-pattern comment;
//! * an explicit TOML manifest, selected by a `.toml` extension.

use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::model::{DownloadDirective, SyncConfig};

/// Leading text of a download directive comment.
pub const DIRECTIVE_MARKER: &str = "从该路径下载";

static DIRECTIVE_RE: OnceLock<Regex> = OnceLock::new();

fn directive_re() -> &'static Regex {
    DIRECTIVE_RE.get_or_init(|| {
        Regex::new(r"从该路径下载\s+(https?://\S+)\s+到([^\s,，]+)目录[，,]?\s*并且重命名为\s*(\S+)")
            .expect("directive pattern compiles")
    })
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {0} does not exist")]
    Missing(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid manifest {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Read the config at `path`, picking the format from its extension.
pub fn load_config(path: &Path) -> Result<SyncConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::Missing(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text = text.trim_start_matches('\u{feff}');

    let config = if is_manifest(path) {
        parse_manifest(text).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        parse_annotations(text)
    };

    info!(
        sources = config.sources.len(),
        targets = config.targets.len(),
        downloads = config.downloads.len(),
        "loaded config from {}",
        path.display()
    );
    debug!(
        targets = ?config.targets.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
        "target plugins"
    );
    Ok(config)
}

fn is_manifest(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"))
}

/// Parse the annotation format.
///
/// A name comment replaces the pending names; the next URL line claims all
/// of them. Directive comments leave the pending names alone. Anything else
/// is ignored.
pub fn parse_annotations(text: &str) -> SyncConfig {
    let mut config = SyncConfig::default();
    let mut pending: Vec<String> = Vec::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(comment) = line.strip_prefix('#') {
            let comment = comment.trim();
            if comment.starts_with(DIRECTIVE_MARKER) {
                match parse_directive(line) {
                    Some(directive) => config.downloads.push(directive),
                    None => debug!(line, "malformed download directive ignored"),
                }
            } else if let Some(names) = plugin_names(comment) {
                pending = names;
            }
            continue;
        }

        if line.starts_with("http") {
            for name in pending.drain(..) {
                config.assign(&name, line);
            }
            config.sources.push(line.to_string());
        }
    }

    config
}

/// Extract `{url, dir, filename}` from a directive comment.
pub fn parse_directive(line: &str) -> Option<DownloadDirective> {
    let caps = directive_re().captures(line)?;
    Some(DownloadDirective {
        url: caps[1].to_string(),
        dir: PathBuf::from(&caps[2]),
        filename: caps[3].to_string(),
    })
}

/// Comment text that reads as plugin names: not a URL, no `/`.
fn plugin_names(comment: &str) -> Option<Vec<String>> {
    if comment.is_empty() || comment.starts_with("http") || comment.contains('/') {
        return None;
    }
    let names: Vec<String> = comment
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect();
    (!names.is_empty()).then_some(names)
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default, rename = "source")]
    sources: Vec<ManifestSource>,
    #[serde(default, rename = "download")]
    downloads: Vec<DownloadDirective>,
}

#[derive(Debug, Deserialize)]
struct ManifestSource {
    url: String,
    #[serde(default)]
    plugins: Vec<String>,
}

/// Parse the structured manifest:
///
/// ```toml
/// [[source]]
/// url = "https://github.com/owner/repo/tree/main"
/// plugins = ["PluginA", "PluginB"]
///
/// [[download]]
/// url = "https://example.com/file.dll"
/// dir = "libs"
/// filename = "file.dll"
/// ```
pub fn parse_manifest(text: &str) -> Result<SyncConfig, toml::de::Error> {
    let manifest: Manifest = toml::from_str(text)?;
    let mut config = SyncConfig {
        downloads: manifest.downloads,
        ..SyncConfig::default()
    };
    for source in manifest.sources {
        for name in &source.plugins {
            config.assign(name, &source.url);
        }
        config.sources.push(source.url);
    }
    Ok(config)
}
