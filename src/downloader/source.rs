use std::fmt;
use url::Url;

/// File fetched from a repository tree link that does not name a JSON file.
pub const DEFAULT_MANIFEST: &str = "pluginmaster.json";

const REPO_HOST: &str = "github.com";
const RAW_HOST: &str = "raw.githubusercontent.com";

/// Hosts that serve HTML plugin pages rather than repository JSON.
const UNSUPPORTED_HOSTS: &[&str] = &["aetherment.sevii.dev", "plogon.meowrs.com"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    ReleasesPage,
    UnsupportedSite(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ReleasesPage => write!(f, "releases page"),
            SkipReason::UnsupportedSite(host) => write!(f, "unsupported plugin page on {host}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceUrl {
    Fetch(String),
    Skip(SkipReason),
}

/// Normalize a configured source URL into the URL that is actually fetched.
///
/// A `/tree/` segment is dropped and, unless the path already names a `.json`
/// file, `pluginmaster.json` is appended; a `/blob/` segment is dropped
/// as-is. On GitHub the host also moves to the raw-content domain. GitHub
/// release pages and known plugin-page hosts are skipped. Anything else,
/// including strings that do not parse as URLs, is fetched as written.
pub fn resolve_source(raw: &str) -> SourceUrl {
    let Ok(mut url) = Url::parse(raw) else {
        return SourceUrl::Fetch(raw.to_string());
    };
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let on_repo_host = host_matches(&host, REPO_HOST);
    let path = url.path().to_string();

    let rewritten = if path.contains("/tree/") {
        let path = path.replacen("/tree/", "/", 1);
        if path.ends_with(".json") {
            Some(path)
        } else {
            Some(format!("{}/{}", path.trim_end_matches('/'), DEFAULT_MANIFEST))
        }
    } else if path.contains("/blob/") {
        Some(path.replacen("/blob/", "/", 1))
    } else {
        None
    };

    if let Some(path) = rewritten {
        if on_repo_host {
            // Swapping the host of a parsed http(s) URL cannot fail.
            let _ = url.set_host(Some(RAW_HOST));
        }
        url.set_path(&path);
        return SourceUrl::Fetch(url.to_string());
    }

    if on_repo_host && path.contains("/releases") {
        return SourceUrl::Skip(SkipReason::ReleasesPage);
    }
    if let Some(site) = UNSUPPORTED_HOSTS.iter().find(|h| host_matches(&host, h)) {
        return SourceUrl::Skip(SkipReason::UnsupportedSite(site.to_string()));
    }

    SourceUrl::Fetch(raw.to_string())
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}
