use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use repo_updater::commands::{run_check, run_sync, CheckOptions, SyncOutcome};
use repo_updater::data::{Settings, DEFAULT_CONFIG_FILE, DEFAULT_OUTPUT_FILE, DEFAULT_USER_AGENT};
use repo_updater::DownloadStatus;

#[derive(Parser)]
#[command(name = "repo-updater")]
#[command(about = "Pull selected plugins from remote Dalamud repositories into a local catalog")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    sync: SyncArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch target plugins, run downloads and rewrite the catalog (default)
    Sync(SyncArgs),

    /// Check that the files the scheduled update needs are present and valid
    Check(CheckArgs),
}

#[derive(Args, Clone)]
struct SyncArgs {
    /// Annotated source list (`.toml` selects the structured format)
    #[arg(short, long, env = "REPO_UPDATER_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Catalog file to merge into
    #[arg(short, long, env = "REPO_UPDATER_OUTPUT", default_value = DEFAULT_OUTPUT_FILE)]
    output: PathBuf,

    /// User-Agent sent with every request
    #[arg(long, env = "REPO_UPDATER_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    user_agent: String,

    /// Timeout for repository metadata requests, in seconds
    #[arg(long, default_value_t = 10)]
    fetch_timeout: u64,

    /// Timeout for auxiliary file downloads, in seconds
    #[arg(long, default_value_t = 30)]
    download_timeout: u64,

    /// Run the download directives again after the catalog is written
    #[arg(long)]
    repeat_downloads: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

impl SyncArgs {
    fn into_settings(self) -> Settings {
        Settings {
            config_path: self.config,
            output_path: self.output,
            user_agent: self.user_agent,
            fetch_timeout_secs: self.fetch_timeout,
            download_timeout_secs: self.download_timeout,
            repeat_downloads: self.repeat_downloads,
        }
    }
}

#[derive(Args)]
struct CheckArgs {
    /// Repository root the paths are resolved against
    #[arg(long, default_value = ".")]
    root: PathBuf,

    #[arg(short, long, env = "REPO_UPDATER_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[arg(short, long, env = "REPO_UPDATER_OUTPUT", default_value = DEFAULT_OUTPUT_FILE)]
    output: PathBuf,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Sync(cli.sync));

    let verbose = match &command {
        Commands::Sync(args) => args.verbose,
        Commands::Check(args) => args.verbose,
    };
    init_tracing(verbose);

    match command {
        Commands::Sync(args) => sync(args.into_settings()),
        Commands::Check(args) => {
            let report = run_check(&CheckOptions {
                root: args.root,
                config_file: args.config,
                output_file: args.output,
            });
            print!("{report}");
            if report.passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn sync(settings: Settings) -> ExitCode {
    match run_sync(&settings) {
        Ok(SyncOutcome::Completed(report)) => {
            let failed = report.downloads.iter().filter(|d| matches!(d, DownloadStatus::Failed(_))).count();
            tracing::info!(
                found = report.found.len(),
                missing = ?report.missing,
                downloads_failed = failed,
                catalog = report.catalog_len,
                saved = report.saved,
                "summary"
            );
            ExitCode::SUCCESS
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr; RUST_LOG overrides the default filter.
fn init_tracing(verbose: bool) {
    let default = if verbose { "repo_updater=debug" } else { "repo_updater=info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}
