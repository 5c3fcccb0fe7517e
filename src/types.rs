//! Data model for the published dashboard artifacts.
//!
//! Raw types mirror the JSON the batch pipeline writes (`current.json`,
//! `summary.json`, `changes/manifest.json`, per-date change files and
//! `history/<date>.json`). Field absence is tolerated everywhere: counters
//! default to zero, lists to empty, regions to the empty string (the
//! Global bucket). Nothing here is validated beyond that defaulting.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// current.json — the full service-tag snapshot
// ============================================================================

/// The complete snapshot of published service tags. Replaced wholesale on
/// every reload; identity key is the tag name.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceTagSnapshot {
    #[serde(default)]
    pub values: Vec<ServiceTag>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceTag {
    #[serde(default)]
    pub name: String,
    pub properties: Option<TagProperties>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagProperties {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub system_service: Option<String>,
    #[serde(default)]
    pub address_prefixes: Vec<String>,
}

impl ServiceTag {
    /// Raw region code, `""` when the tag is global or properties are absent.
    pub fn region(&self) -> &str {
        self.properties
            .as_ref()
            .and_then(|p| p.region.as_deref())
            .unwrap_or("")
    }

    pub fn prefix_count(&self) -> usize {
        self.properties
            .as_ref()
            .map(|p| p.address_prefixes.len())
            .unwrap_or(0)
    }
}

// ============================================================================
// summary.json — externally derived aggregate counters
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub total_services: u64,
    #[serde(default)]
    pub total_ip_ranges: u64,
    #[serde(default)]
    pub changes_this_week: u64,
    #[serde(default)]
    pub ip_changes: u64,
    #[serde(default)]
    pub service_additions: u64,
    #[serde(default)]
    pub service_removals: u64,
    /// Raw region code (possibly `""`) → change count for the latest week.
    #[serde(default)]
    pub regional_changes: HashMap<String, u64>,
    #[serde(default)]
    pub top_active_services: Vec<TopService>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopService {
    pub service: String,
    #[serde(default)]
    pub change_count: u64,
}

// ============================================================================
// Change files
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    IpChanges,
    ServiceAdded,
    ServiceRemoved,
}

/// One detected difference between two consecutive snapshots for a tag.
///
/// The pipeline writes `added_count == added_prefixes.len()` (likewise
/// removed); the count fields are treated as the source of truth here.
/// `service_added` records carry `ip_count` instead of prefix deltas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub service: String,
    /// Raw region code; empty means Global.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub region: String,
    #[serde(default)]
    pub system_service: Option<String>,
    #[serde(default)]
    pub added_prefixes: Vec<String>,
    #[serde(default)]
    pub removed_prefixes: Vec<String>,
    #[serde(default)]
    pub added_count: u64,
    #[serde(default)]
    pub removed_count: u64,
    #[serde(default)]
    pub ip_count: u64,
}

impl ChangeRecord {
    /// Total IP churn for this record (additions plus removals).
    pub fn total_ip_change(&self) -> u64 {
        self.added_count + self.removed_count
    }
}

fn null_as_empty<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(de)?.unwrap_or_default())
}

/// A per-date change file (`<date>-changes.json`, `latest-changes.json`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeFile {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub changes: Vec<ChangeRecord>,
    #[serde(default)]
    pub total_changes: u64,
    #[serde(default)]
    pub metadata: Option<ChangeMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeMetadata {
    /// Provider publish date, `MM/DD/YYYY`.
    #[serde(default)]
    pub date_published: Option<String>,
}

impl ChangeMetadata {
    /// Parses the `MM/DD/YYYY` publish date. Returns `None` when absent or
    /// malformed rather than failing the whole file.
    pub fn published_date(&self) -> Option<NaiveDate> {
        let raw = self.date_published.as_deref()?;
        let mut parts = raw.split('/');
        let month: u32 = parts.next()?.parse().ok()?;
        let day: u32 = parts.next()?.parse().ok()?;
        let year: i32 = parts.next()?.parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    }
}

// ============================================================================
// changes/manifest.json — index of available change files
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub files: Vec<ManifestEntry>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub total_files: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    pub date: String,
    pub filename: String,
}

impl ManifestEntry {
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        self.date.parse().ok()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DateRange {
    pub oldest: String,
    pub newest: String,
}

impl Manifest {
    /// Entries excluding the baseline (oldest date). The baseline is the
    /// first-ever snapshot and has no prior state to diff against, so it
    /// never counts toward change statistics.
    pub fn change_entries(&self) -> Vec<&ManifestEntry> {
        let oldest = self.date_range.as_ref().map(|r| r.oldest.as_str());
        self.files
            .iter()
            .filter(|f| Some(f.date.as_str()) != oldest)
            .collect()
    }
}

// ============================================================================
// history/<date>.json — provider version counter
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Provider-assigned version counter. Published as either a number or a
    /// numeric string depending on pipeline vintage.
    #[serde(default, deserialize_with = "flexible_u64")]
    pub change_number: Option<u64>,
}

fn flexible_u64<'de, D>(de: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(de)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

// ============================================================================
// Derived: history-page timeline items
// ============================================================================

/// One week on the history page: a change file plus its precomputed stats.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineItem {
    pub date: NaiveDate,
    pub filename: String,
    pub change_count: usize,
    pub service_count: usize,
    pub region_count: usize,
    pub total_ip_changes: u64,
    pub added_ips: u64,
    pub removed_ips: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_published: Option<NaiveDate>,
    pub changes: Vec<ChangeRecord>,
}

impl TimelineItem {
    pub fn has_changes(&self) -> bool {
        self.change_count > 0
    }

    /// Long-form date as shown on the history page ("October 8, 2025").
    pub fn formatted_date(&self) -> String {
        format_long_date(self.date)
    }
}

pub fn format_long_date(date: NaiveDate) -> String {
    // %-d is not portable in all chrono feature sets; trim the zero by hand.
    let day = date.format("%d").to_string();
    let day = day.trim_start_matches('0');
    format!("{} {}, {}", date.format("%B"), day, date.format("%Y"))
}
