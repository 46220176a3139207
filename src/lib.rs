pub mod commands;
pub mod core;
pub mod data;
pub mod downloader;

// Re-export commonly used items for integration tests and the binary
pub use crate::commands::{run_check, run_sync, CheckOptions, CheckReport, SyncOutcome, SyncReport};
pub use crate::core::*;
pub use crate::data::*;
pub use crate::downloader::{DownloadStatus, Downloader, FetchError};
