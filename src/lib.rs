//! Client for the Azure service-tags tracking dashboard's published data.
//!
//! Loads the batch pipeline's JSON artifacts (current snapshot, summary,
//! change manifest and per-week change files), aggregates them into ranked
//! activity views, and supports filtered search, week comparison and
//! JSON/CSV export over the change history.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod export;
pub mod loader;
pub mod regions;
pub mod render;
pub mod state;
pub mod timeline;
pub mod types;
