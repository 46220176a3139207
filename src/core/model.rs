use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// One plugin entry as published by a remote repository.
///
/// Records are open-ended: only `Name` and `InternalName` are interpreted,
/// every other field is carried through untouched and in its original order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginRecord(pub Map<String, Value>);

impl PluginRecord {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn name(&self) -> Option<&str> {
        self.str_field("Name")
    }

    pub fn internal_name(&self) -> Option<&str> {
        self.str_field("InternalName")
    }

    /// Catalog key: `Name` when it is a non-empty string, else `InternalName`.
    pub fn identity(&self) -> Option<&str> {
        self.name()
            .filter(|n| !n.is_empty())
            .or_else(|| self.internal_name().filter(|n| !n.is_empty()))
    }

    /// Exact, case-sensitive match against either name field.
    pub fn matches(&self, target: &str) -> bool {
        self.name() == Some(target) || self.internal_name() == Some(target)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

impl From<Map<String, Value>> for PluginRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// "Download `url` into `dir`, renamed to `filename`".
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DownloadDirective {
    pub url: String,
    pub dir: PathBuf,
    pub filename: String,
}

impl DownloadDirective {
    pub fn target_path(&self) -> PathBuf {
        self.dir.join(&self.filename)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPlugin {
    pub name: String,
    pub url: String,
}

/// Parsed sync configuration: which plugin to pull from which source, plus
/// the auxiliary downloads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncConfig {
    /// Every source URL in file order, duplicates included.
    pub sources: Vec<String>,
    /// Plugin name to source URL, first-assignment order.
    pub targets: Vec<TargetPlugin>,
    pub downloads: Vec<DownloadDirective>,
}

impl SyncConfig {
    /// Map `name` to `url`. A name seen before keeps its position and takes
    /// the new URL.
    pub fn assign(&mut self, name: &str, url: &str) {
        match self.targets.iter_mut().find(|t| t.name == name) {
            Some(existing) => existing.url = url.to_string(),
            None => self.targets.push(TargetPlugin {
                name: name.to_string(),
                url: url.to_string(),
            }),
        }
    }

    pub fn url_for(&self, name: &str) -> Option<&str> {
        self.targets
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.url.as_str())
    }

    pub fn has_targets(&self) -> bool {
        !self.targets.is_empty()
    }
}
