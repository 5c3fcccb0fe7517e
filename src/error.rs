//! Error types for data loading and export.
//!
//! Load errors are classified by the per-resource policy:
//! - Required resources (current snapshot, summary): any failure is fatal
//!   for initialization.
//! - Optional resources (latest changes, historical files): failures are
//!   defaulted or skipped and the feature degrades.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("request for {resource} failed: {source}")]
    Network {
        resource: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{resource} returned HTTP {status}")]
    Status { resource: String, status: u16 },

    #[error("could not decode {resource}: {source}")]
    Decode {
        resource: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid data base URL: {0}")]
    BadBaseUrl(String),
}

impl LoadError {
    /// True when the resource simply is not there (first run, pruned file).
    /// Optional resources use this to pick the default-or-skip path.
    pub fn is_missing(&self) -> bool {
        matches!(self, LoadError::Status { status: 404, .. })
    }

    /// The resource path this error refers to, for log context.
    pub fn resource(&self) -> &str {
        match self {
            LoadError::Network { resource, .. }
            | LoadError::Status { resource, .. }
            | LoadError::Decode { resource, .. } => resource,
            LoadError::BadBaseUrl(url) => url,
        }
    }
}

/// Export operations are rejected up front rather than silently producing
/// an everything-export or an empty file.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no filters applied; set a search term or region filter first")]
    NoActiveFilters,

    #[error("no weeks selected; select at least one week first")]
    NoSelection,

    #[error("nothing to export: the current selection contains no IP changes")]
    NoRows,

    #[error("could not serialize export document: {0}")]
    Serialize(#[from] serde_json::Error),
}
