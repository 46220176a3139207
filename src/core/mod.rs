pub mod config;
pub mod locator;
pub mod model;

pub use config::{load_config, ConfigError};
pub use locator::find_plugin;
pub use model::{DownloadDirective, PluginRecord, SyncConfig, TargetPlugin};
