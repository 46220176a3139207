use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::model::PluginRecord;

pub const DEFAULT_CONFIG_FILE: &str = "origin_repo.ini";
pub const DEFAULT_OUTPUT_FILE: &str = "myrepo.json";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

#[derive(Debug, Clone)]
pub struct Settings {
    pub config_path: PathBuf,
    pub output_path: PathBuf,
    pub user_agent: String,
    pub fetch_timeout_secs: u64,
    pub download_timeout_secs: u64,
    /// Run the download directives a second time after the catalog is saved.
    pub repeat_downloads: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_FILE),
            output_path: PathBuf::from(DEFAULT_OUTPUT_FILE),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            fetch_timeout_secs: 10,
            download_timeout_secs: 30,
            repeat_downloads: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid catalog JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("catalog is not a JSON array")]
    NotAnArray,
}

/// Merge freshly fetched records into the existing catalog.
///
/// Records are keyed by [`PluginRecord::identity`]. A key keeps the position
/// of its first appearance and the value of its last, so new records replace
/// existing ones in place and unseen keys are appended. Records without any
/// identity are dropped.
pub fn merge_plugins(existing: Vec<PluginRecord>, new: Vec<PluginRecord>) -> Vec<PluginRecord> {
    let mut merged: Vec<PluginRecord> = Vec::with_capacity(existing.len() + new.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in existing.into_iter().chain(new) {
        let Some(key) = record.identity().map(str::to_string) else {
            debug!("dropping record without Name or InternalName");
            continue;
        };
        match index.get(&key) {
            Some(&i) => merged[i] = record,
            None => {
                index.insert(key, merged.len());
                merged.push(record);
            }
        }
    }
    merged
}

/// Read the persisted catalog. Non-object entries are skipped.
pub fn load_catalog(path: &Path) -> Result<Vec<PluginRecord>, CatalogError> {
    let bytes = fs::read(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let Value::Array(items) = serde_json::from_slice(&bytes)? else {
        return Err(CatalogError::NotAnArray);
    };
    let total = items.len();
    let records: Vec<PluginRecord> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map.into()),
            _ => None,
        })
        .collect();
    if records.len() != total {
        warn!(skipped = total - records.len(), "ignored non-object catalog entries");
    }
    Ok(records)
}

/// Catalog to start from: an absent or unreadable file counts as empty.
pub fn load_catalog_or_default(path: &Path) -> Vec<PluginRecord> {
    if !path.exists() {
        return Vec::new();
    }
    match load_catalog(path) {
        Ok(records) => records,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load existing catalog, starting empty");
            Vec::new()
        }
    }
}

/// Pretty-print with a four-space indent; non-ASCII text stays unescaped.
pub fn render_catalog(records: &[PluginRecord]) -> Result<String, serde_json::Error> {
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    records.serialize(&mut ser)?;
    // serde_json only ever emits UTF-8.
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Overwrite the catalog file with `records`.
pub fn save_catalog(path: &Path, records: &[PluginRecord]) -> Result<(), CatalogError> {
    let text = render_catalog(records)?;
    fs::write(path, text).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })
}
