use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::core::config::{load_config, ConfigError, DIRECTIVE_MARKER};
use crate::core::locator::find_plugin;
use crate::core::model::{DownloadDirective, PluginRecord, SyncConfig};
use crate::data::{
    load_catalog, load_catalog_or_default, merge_plugins, save_catalog, Settings, DEFAULT_CONFIG_FILE,
    DEFAULT_OUTPUT_FILE,
};
use crate::downloader::{DownloadStatus, Downloader};

pub const WORKFLOW_FILE: &str = ".github/workflows/update-plugins.yml";
pub const ENHANCED_WORKFLOW_FILE: &str = ".github/workflows/update-plugins-enhanced.yml";
pub const MANIFEST_FILE: &str = "Cargo.toml";

/// Comment lines in the sample config that label columns rather than name plugins.
const HEADER_COMMENTS: &[&str] = &["#", "# 插件名", "# 仓库名", "# URL链接"];

#[derive(Debug)]
pub enum SyncOutcome {
    MissingConfig(PathBuf),
    NoTargets,
    Completed(SyncReport),
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub found: Vec<String>,
    pub missing: Vec<String>,
    pub downloads: Vec<DownloadStatus>,
    pub catalog_len: usize,
    pub saved: bool,
}

/// One full sync: parse config, fetch and locate every target plugin, run
/// the downloads, merge into the existing catalog and write it back.
pub fn run_sync(settings: &Settings) -> Result<SyncOutcome> {
    info!("=== Dalamud plugin repository updater ===");

    let config = match load_config(&settings.config_path) {
        Ok(config) => config,
        Err(ConfigError::Missing(path)) => {
            warn!(path = %path.display(), "config file does not exist");
            return Ok(SyncOutcome::MissingConfig(path));
        }
        Err(e) => return Err(e).context("loading sync config"),
    };
    if !config.has_targets() {
        warn!("no target plugins configured, nothing to do");
        return Ok(SyncOutcome::NoTargets);
    }

    let downloader = Downloader::new(settings);
    let (records, found, missing) = collect_plugins(&downloader, &config);
    info!(found = found.len(), missing = missing.len(), "plugin lookup finished");

    let mut downloads = run_download_step(&downloader, &config.downloads);

    let existing = load_catalog_or_default(&settings.output_path);
    info!(existing = existing.len(), "loaded existing catalog");
    let merged = merge_plugins(existing, records);

    let saved = match save_catalog(&settings.output_path, &merged) {
        Ok(()) => {
            info!(plugins = merged.len(), path = %settings.output_path.display(), "catalog saved");
            true
        }
        Err(e) => {
            warn!(error = %e, "failed to save catalog");
            false
        }
    };

    if settings.repeat_downloads {
        downloads.extend(run_download_step(&downloader, &config.downloads));
    }

    info!("update finished");
    Ok(SyncOutcome::Completed(SyncReport {
        found,
        missing,
        downloads,
        catalog_len: merged.len(),
        saved,
    }))
}

/// Fetch each target's source (once per URL) and pick the named record out.
fn collect_plugins(downloader: &Downloader, config: &SyncConfig) -> (Vec<PluginRecord>, Vec<String>, Vec<String>) {
    let mut cache: HashMap<&str, Option<Vec<PluginRecord>>> = HashMap::new();
    let mut records = Vec::new();
    let mut found = Vec::new();
    let mut missing = Vec::new();

    for target in &config.targets {
        info!(plugin = %target.name, "looking up plugin");
        let source = cache
            .entry(target.url.as_str())
            .or_insert_with(|| downloader.fetch_plugin_data(&target.url));

        match source.as_deref().and_then(|list| find_plugin(list, &target.name)) {
            Some(record) => {
                info!(plugin = %target.name, "plugin found");
                records.push(record.clone());
                found.push(target.name.clone());
            }
            None => {
                if source.is_some() {
                    warn!(plugin = %target.name, url = %target.url, "plugin not found in source");
                }
                missing.push(target.name.clone());
            }
        }
    }
    (records, found, missing)
}

fn run_download_step(downloader: &Downloader, directives: &[DownloadDirective]) -> Vec<DownloadStatus> {
    if directives.is_empty() {
        return Vec::new();
    }
    info!(count = directives.len(), "running download directives");
    let results = downloader.run_downloads(directives);
    let failed = results.iter().filter(|s| !s.is_completed()).count();
    if failed > 0 {
        warn!(failed, "some downloads failed");
    }
    results
}

#[derive(Debug, Clone)]
pub struct CheckOptions {
    pub root: PathBuf,
    pub config_file: PathBuf,
    pub output_file: PathBuf,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            config_file: PathBuf::from(DEFAULT_CONFIG_FILE),
            output_file: PathBuf::from(DEFAULT_OUTPUT_FILE),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone)]
pub struct CheckItem {
    pub section: &'static str,
    pub status: CheckStatus,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct CheckReport {
    pub items: Vec<CheckItem>,
}

impl CheckReport {
    pub fn passed(&self) -> bool {
        !self.items.iter().any(|i| i.status == CheckStatus::Fail)
    }

    fn push(&mut self, section: &'static str, status: CheckStatus, message: impl Into<String>) {
        self.items.push(CheckItem {
            section,
            status,
            message: message.into(),
        });
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Update workflow self-check ===")?;
        let mut section = "";
        for item in &self.items {
            if item.section != section {
                section = item.section;
                writeln!(f, "\n{section}:")?;
            }
            let mark = match item.status {
                CheckStatus::Pass => "✓",
                CheckStatus::Warn => "⚠",
                CheckStatus::Fail => "✗",
            };
            writeln!(f, "   {mark} {}", item.message)?;
        }
        if self.passed() {
            writeln!(f, "\n✅ self-check complete")
        } else {
            writeln!(f, "\n❌ self-check failed, the update workflow cannot run")
        }
    }
}

/// Diagnose the files the scheduled update depends on. Stops at the first
/// failing section; catalog problems are only warnings.
pub fn run_check(opts: &CheckOptions) -> CheckReport {
    let mut report = CheckReport::default();
    let at = |p: &Path| opts.root.join(p);

    const FILES: &str = "1. required files";
    let required = [opts.config_file.clone(), PathBuf::from(MANIFEST_FILE), PathBuf::from(WORKFLOW_FILE)];
    let mut all_present = true;
    for file in &required {
        if at(file).exists() {
            report.push(FILES, CheckStatus::Pass, file.display().to_string());
        } else {
            report.push(FILES, CheckStatus::Fail, format!("{} (missing)", file.display()));
            all_present = false;
        }
    }
    if !all_present {
        return report;
    }

    const YAML: &str = "2. workflow syntax";
    for (file, mandatory) in [(WORKFLOW_FILE, true), (ENHANCED_WORKFLOW_FILE, false)] {
        let path = at(Path::new(file));
        if !mandatory && !path.exists() {
            continue;
        }
        match check_yaml(&path) {
            Ok(()) => report.push(YAML, CheckStatus::Pass, format!("{file} parses")),
            Err(e) => {
                report.push(YAML, CheckStatus::Fail, format!("{file}: {e:#}"));
                return report;
            }
        }
    }

    const MANIFEST: &str = "3. crate manifest";
    let manifest = match read_manifest(&at(Path::new(MANIFEST_FILE))) {
        Ok(table) => {
            report.push(MANIFEST, CheckStatus::Pass, format!("{MANIFEST_FILE} parses"));
            table
        }
        Err(e) => {
            report.push(MANIFEST, CheckStatus::Fail, format!("{MANIFEST_FILE}: {e:#}"));
            return report;
        }
    };

    const DEPS: &str = "4. dependencies";
    let deps = dependency_names(&manifest);
    report.push(DEPS, CheckStatus::Pass, format!("{MANIFEST_FILE} lists {} dependencies", deps.len()));
    for dep in deps {
        report.push(DEPS, CheckStatus::Pass, format!("  - {dep}"));
    }

    const CONFIG: &str = "5. plugin sources";
    match fs::read_to_string(at(&opts.config_file)) {
        Ok(text) => {
            let summary = summarize_config(&text);
            report.push(
                CONFIG,
                CheckStatus::Pass,
                format!("{} lists {} plugin sources", opts.config_file.display(), summary.urls),
            );
            report.push(CONFIG, CheckStatus::Pass, format!("{} plugin comments configured", summary.plugin_comments));
        }
        Err(e) => {
            report.push(CONFIG, CheckStatus::Fail, format!("{}: {e}", opts.config_file.display()));
            return report;
        }
    }

    const OUTPUT: &str = "6. output catalog";
    let output = at(&opts.output_file);
    if output.exists() {
        match load_catalog(&output) {
            Ok(records) => report.push(
                OUTPUT,
                CheckStatus::Pass,
                format!("{} holds {} plugins", opts.output_file.display(), records.len()),
            ),
            Err(e) => report.push(OUTPUT, CheckStatus::Warn, format!("{}: {e}", opts.output_file.display())),
        }
    } else {
        report.push(
            OUTPUT,
            CheckStatus::Warn,
            format!("{} does not exist yet (created on first run)", opts.output_file.display()),
        );
    }

    report
}

fn check_yaml(path: &Path) -> Result<()> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str::<serde_yaml::Value>(&text)?;
    Ok(())
}

fn read_manifest(path: &Path) -> Result<toml::Table> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(text.parse::<toml::Table>()?)
}

fn dependency_names(manifest: &toml::Table) -> Vec<String> {
    manifest
        .get("dependencies")
        .and_then(|d| d.as_table())
        .map(|t| t.keys().cloned().collect())
        .unwrap_or_default()
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ConfigSummary {
    pub urls: usize,
    pub plugin_comments: usize,
}

/// Line counts of an annotation config: URL lines, and comment lines that
/// are neither directives nor column headers.
pub fn summarize_config(text: &str) -> ConfigSummary {
    let mut summary = ConfigSummary::default();
    for line in text.lines().map(str::trim) {
        if line.starts_with("http") {
            summary.urls += 1;
        } else if line.starts_with('#')
            && !line.trim_start_matches('#').trim_start().starts_with(DIRECTIVE_MARKER)
            && !HEADER_COMMENTS.contains(&line)
        {
            summary.plugin_comments += 1;
        }
    }
    summary
}
