//! Data loader: fetches the published JSON artifacts over HTTP.
//!
//! Per-resource policy (see `LoadError`):
//! - `current.json` and `summary.json` are required; any failure aborts
//!   initialization.
//! - `changes/latest-changes.json` may not exist on first run and defaults
//!   to an empty change set.
//! - everything behind the manifest (historical change files, history
//!   entries) is best-effort: failures are logged and skipped by callers.
//!
//! Every request carries a `t=<unix-millis>` cache-busting query parameter
//! so intermediate caches never serve a stale week. There are no retries
//! and no backoff anywhere.

use chrono::Utc;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::DashboardConfig;
use crate::error::LoadError;
use crate::types::{ChangeFile, HistoryEntry, Manifest, ServiceTagSnapshot, Summary};

pub struct DataLoader {
    client: reqwest::Client,
    base_url: Url,
}

/// The three files fetched jointly at startup.
#[derive(Debug)]
pub struct InitialData {
    pub current: ServiceTagSnapshot,
    pub summary: Summary,
    pub latest_changes: ChangeFile,
}

impl DataLoader {
    pub fn new(config: &DashboardConfig) -> Result<Self, LoadError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|_| LoadError::BadBaseUrl(config.base_url.clone()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|source| LoadError::Network {
                resource: config.base_url.clone(),
                source,
            })?;
        Ok(Self { client, base_url })
    }

    fn resource_url(&self, path: &str) -> Result<Url, LoadError> {
        let ts = Utc::now().timestamp_millis();
        self.resource_url_at(path, ts)
    }

    fn resource_url_at(&self, path: &str, ts: i64) -> Result<Url, LoadError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|_| LoadError::BadBaseUrl(format!("{}{path}", self.base_url)))?;
        url.query_pairs_mut().append_pair("t", &ts.to_string());
        Ok(url)
    }

    /// Fetch and decode one resource. Maps non-success statuses and decode
    /// failures to typed errors; the caller decides whether that is fatal.
    async fn fetch_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, LoadError> {
        let url = self.resource_url(path)?;
        debug!(resource = path, "fetching");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| LoadError::Network {
                resource: path.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Status {
                resource: path.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|source| LoadError::Network {
            resource: path.to_string(),
            source,
        })?;
        serde_json::from_str(&body).map_err(|source| LoadError::Decode {
            resource: path.to_string(),
            source,
        })
    }

    /// Issue the three startup fetches concurrently and await them jointly.
    /// The snapshot and summary are required; the latest changes file is
    /// substituted with an empty change set when absent (first run).
    pub async fn load_initial(&self) -> Result<InitialData, LoadError> {
        let (current, summary, latest) = tokio::join!(
            self.fetch_json::<ServiceTagSnapshot>("current.json"),
            self.fetch_json::<Summary>("summary.json"),
            self.fetch_json::<ChangeFile>("changes/latest-changes.json"),
        );

        let latest_changes = match latest {
            Ok(file) => file,
            Err(err) => {
                warn!("latest changes unavailable ({err}); assuming no changes yet");
                ChangeFile::default()
            }
        };

        Ok(InitialData {
            current: current?,
            summary: summary?,
            latest_changes,
        })
    }

    pub async fn load_manifest(&self) -> Result<Manifest, LoadError> {
        self.fetch_json("changes/manifest.json").await
    }

    /// One per-date change file, e.g. `2025-10-08-changes.json`.
    pub async fn load_change_file(&self, filename: &str) -> Result<ChangeFile, LoadError> {
        self.fetch_json(&format!("changes/{filename}")).await
    }

    /// Provider version counter captured alongside a snapshot.
    pub async fn load_history(&self, date: &str) -> Result<HistoryEntry, LoadError> {
        self.fetch_json(&format!("history/{date}.json")).await
    }
}
