//! Dashboard configuration.
//!
//! Resolution order: built-in defaults, then `~/.tagwatch/config.json`
//! (every field optional), then the `TAGWATCH_BASE_URL` environment
//! variable, then CLI flags. A missing or corrupt config file falls back to
//! defaults with a warning instead of failing startup.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

/// Where a local static server of the pipeline's `data/` directory lives by
/// default. Deployments point this at their published data root.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/data/";

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Root URL the data files are fetched from. Always ends with `/`.
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// On-disk shape; every field optional so partial configs merge over
/// defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

impl DashboardConfig {
    /// Default config file location (`~/.tagwatch/config.json`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".tagwatch").join("config.json"))
    }

    /// Load from the default location, falling back to defaults when the
    /// file is absent.
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Self::default().with_env(),
        }
    }

    /// Load from an explicit path; unreadable or unparseable files degrade
    /// to defaults with a warning.
    pub fn load_from(path: &Path) -> Self {
        let file = fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))
            .and_then(|content| {
                serde_json::from_str::<ConfigFile>(&content)
                    .map_err(|e| format!("failed to parse {}: {e}", path.display()))
            });

        let file = match file {
            Ok(file) => file,
            Err(msg) => {
                warn!("{msg}; using default configuration");
                ConfigFile::default()
            }
        };

        let defaults = Self::default();
        Self {
            base_url: normalize_base_url(file.base_url.unwrap_or(defaults.base_url)),
            timeout_secs: file.timeout_secs.unwrap_or(defaults.timeout_secs),
        }
        .with_env()
    }

    fn with_env(mut self) -> Self {
        if let Ok(url) = std::env::var("TAGWATCH_BASE_URL") {
            if !url.is_empty() {
                self.base_url = normalize_base_url(url);
            }
        }
        self
    }

    /// Apply CLI-level overrides on top of whatever was loaded.
    pub fn with_overrides(mut self, base_url: Option<String>, timeout_secs: Option<u64>) -> Self {
        if let Some(url) = base_url {
            self.base_url = normalize_base_url(url);
        }
        if let Some(timeout) = timeout_secs {
            self.timeout_secs = timeout;
        }
        self
    }
}

/// Relative resource paths are joined onto the base, so it has to be a
/// directory URL.
fn normalize_base_url(mut url: String) -> String {
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_when_file_is_empty_object() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{}}").unwrap();
        let config = DashboardConfig::load_from(file.path());
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn partial_file_merges_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"baseUrl": "https://tags.example.net/data"}}"#).unwrap();
        let config = DashboardConfig::load_from(file.path());
        // Trailing slash is enforced so Url::join keeps the last segment.
        assert_eq!(config.base_url, "https://tags.example.net/data/");
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn corrupt_file_degrades_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let config = DashboardConfig::load_from(file.path());
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn cli_overrides_win() {
        let config = DashboardConfig::default()
            .with_overrides(Some("https://cdn.example.org/st".into()), Some(5));
        assert_eq!(config.base_url, "https://cdn.example.org/st/");
        assert_eq!(config.timeout_secs, 5);
    }
}
