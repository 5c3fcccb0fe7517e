//! Aggregation of per-date change files into ranked, de-duplicated views.
//!
//! All passes exclude the baseline (the oldest manifest entry): it is the
//! first-ever snapshot and has no prior state to diff against. Historical
//! files are fetched sequentially; an unreachable file is logged and
//! skipped, never aborting the pass.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::loader::DataLoader;
use crate::types::{ChangeFile, ChangeRecord, Manifest};

/// Provider-wide infrastructure tags (`AzureCloud`, `AzureCloud.WestUS2`…)
/// are tracked separately from per-service activity.
pub const INFRA_PREFIX: &str = "AzureCloud";

/// Regions with this many changes or fewer are left out of the hotspot view.
pub const HOTSPOT_MIN_CHANGES: u64 = 3;

/// Degraded mode when the manifest itself is unreachable: probe the last
/// two published change files directly.
const FALLBACK_CHANGE_FILES: [&str; 2] =
    ["2025-10-08-changes.json", "2025-10-10-changes.json"];

// ============================================================================
// Historical per-service activity
// ============================================================================

/// Per-service counters accumulated across all non-baseline change files.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServiceActivity {
    pub service: String,
    /// Number of weeks in which the service changed.
    pub change_count: u64,
    pub total_ips_added: u64,
    pub total_ips_removed: u64,
    /// Additions plus removals: churn magnitude, not net drift.
    pub total_ip_change: u64,
}

impl ServiceActivity {
    /// Ranking metric: frequency dominates, churn magnitude breaks ties.
    /// The weights (100 and 0.1) deliberately favor a service that changes
    /// every week over one that changed a lot once.
    pub fn activity_score(&self) -> f64 {
        self.change_count as f64 * 100.0 + self.total_ip_change as f64 * 0.1
    }
}

/// Fold one week's change records into the per-service activity map.
/// Infrastructure tags are skipped; they are rolled up separately.
pub fn accumulate_activity(
    activity: &mut HashMap<String, ServiceActivity>,
    changes: &[ChangeRecord],
) {
    for change in changes {
        if change.service.starts_with(INFRA_PREFIX) {
            continue;
        }
        let entry = activity
            .entry(change.service.clone())
            .or_insert_with(|| ServiceActivity {
                service: change.service.clone(),
                ..Default::default()
            });
        entry.change_count += 1;
        entry.total_ips_added += change.added_count;
        entry.total_ips_removed += change.removed_count;
        entry.total_ip_change += change.total_ip_change();
    }
}

/// Rank services by activity score, descending. Name breaks exact ties so
/// the ordering is stable across runs.
pub fn rank_services(activity: HashMap<String, ServiceActivity>) -> Vec<ServiceActivity> {
    let mut services: Vec<ServiceActivity> = activity.into_values().collect();
    services.sort_by(|a, b| {
        b.activity_score()
            .partial_cmp(&a.activity_score())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.service.cmp(&b.service))
    });
    services
}

/// Aggregate activity across every non-baseline change file the manifest
/// lists. When the manifest is unreachable, degrade to the fixed fallback
/// file list and aggregate whatever loads.
pub async fn historical_activity(loader: &DataLoader) -> Vec<ServiceActivity> {
    let mut activity = HashMap::new();

    match loader.load_manifest().await {
        Ok(manifest) => {
            let entries = manifest.change_entries();
            info!(files = entries.len(), "aggregating historical change files");
            for entry in entries {
                match loader.load_change_file(&entry.filename).await {
                    Ok(file) => {
                        debug!(file = %entry.filename, changes = file.changes.len(), "loaded");
                        accumulate_activity(&mut activity, &file.changes);
                    }
                    Err(err) => warn!("skipping {}: {err}", entry.filename),
                }
            }
        }
        Err(err) => {
            warn!("manifest unavailable ({err}); falling back to known change files");
            for filename in FALLBACK_CHANGE_FILES {
                match loader.load_change_file(filename).await {
                    Ok(file) => accumulate_activity(&mut activity, &file.changes),
                    Err(err) => warn!("skipping {filename}: {err}"),
                }
            }
        }
    }

    rank_services(activity)
}

/// Last-resort ranking from the current week only, used when historical
/// aggregation produced nothing. Scored by raw churn since there is no
/// frequency signal in a single week.
pub fn current_week_activity(latest: &ChangeFile) -> Vec<ServiceActivity> {
    let mut activity = HashMap::new();
    accumulate_activity(&mut activity, &latest.changes);
    let mut services: Vec<ServiceActivity> = activity.into_values().collect();
    services.sort_by(|a, b| {
        b.total_ip_change
            .cmp(&a.total_ip_change)
            .then_with(|| a.service.cmp(&b.service))
    });
    services
}

// ============================================================================
// Regional rollup (latest week)
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct RegionActivity {
    /// Raw region code; empty string is the Global bucket.
    pub region: String,
    pub change_count: u64,
    pub ips_added: u64,
    pub ips_removed: u64,
}

impl RegionActivity {
    pub fn net_ip_change(&self) -> i64 {
        self.ips_added as i64 - self.ips_removed as i64
    }

    pub fn is_global(&self) -> bool {
        self.region.is_empty()
    }
}

/// Group one week's change records by raw region code.
pub fn regional_rollup(changes: &[ChangeRecord]) -> Vec<RegionActivity> {
    let mut regions: HashMap<&str, RegionActivity> = HashMap::new();
    for change in changes {
        let entry = regions
            .entry(change.region.as_str())
            .or_insert_with(|| RegionActivity {
                region: change.region.clone(),
                change_count: 0,
                ips_added: 0,
                ips_removed: 0,
            });
        entry.change_count += 1;
        entry.ips_added += change.added_count;
        entry.ips_removed += change.removed_count;
    }
    let mut regions: Vec<RegionActivity> = regions.into_values().collect();
    regions.sort_by(|a, b| a.region.cmp(&b.region));
    regions
}

/// Geographic regions busy enough to show: more than
/// [`HOTSPOT_MIN_CHANGES`] changes, the Global bucket excluded,
/// alphabetical order.
pub fn hotspots(regions: &[RegionActivity]) -> Vec<&RegionActivity> {
    regions
        .iter()
        .filter(|r| !r.is_global() && r.change_count > HOTSPOT_MIN_CHANGES)
        .collect()
}

/// Geographic regions that changed but fell below the hotspot threshold,
/// for the "minor activity" rendering.
pub fn minor_regions(regions: &[RegionActivity]) -> Vec<&RegionActivity> {
    regions
        .iter()
        .filter(|r| !r.is_global() && r.change_count <= HOTSPOT_MIN_CHANGES)
        .collect()
}

/// The service with the most change records in a region this week.
pub fn top_service_in_region<'a>(
    changes: &'a [ChangeRecord],
    region: &str,
) -> Option<(&'a str, u64)> {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for change in changes.iter().filter(|c| c.region == region) {
        *counts.entry(change.service.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
}

// ============================================================================
// Provider-wide infrastructure rollup
// ============================================================================

/// IP churn of `AzureCloud*` tags across all tracked weeks, bucketed by the
/// region suffix of the tag name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InfraRollup {
    pub total_ip_changes: u64,
    pub global_ip_changes: u64,
    /// Region suffix (as written in the tag name) → accumulated churn.
    pub regions: HashMap<String, u64>,
}

impl InfraRollup {
    pub fn accumulate(&mut self, changes: &[ChangeRecord]) {
        for change in changes {
            if !change.service.starts_with(INFRA_PREFIX) {
                continue;
            }
            let churn = change.total_ip_change();
            self.total_ip_changes += churn;
            match change.service.strip_prefix("AzureCloud.") {
                Some(region) if !region.is_empty() => {
                    *self.regions.entry(region.to_string()).or_default() += churn;
                }
                // Bare `AzureCloud` (or no dot suffix) is the global tag.
                _ => self.global_ip_changes += churn,
            }
        }
    }

    /// Most affected regions, descending by churn, capped at `limit`.
    pub fn top_regions(&self, limit: usize) -> Vec<(&str, u64)> {
        let mut regions: Vec<(&str, u64)> = self
            .regions
            .iter()
            .map(|(region, churn)| (region.as_str(), *churn))
            .collect();
        regions.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        regions.truncate(limit);
        regions
    }
}

pub async fn infra_rollup(loader: &DataLoader, manifest: &Manifest) -> InfraRollup {
    let mut rollup = InfraRollup::default();
    for entry in manifest.change_entries() {
        match loader.load_change_file(&entry.filename).await {
            Ok(file) => rollup.accumulate(&file.changes),
            Err(err) => warn!("skipping {}: {err}", entry.filename),
        }
    }
    rollup
}

// ============================================================================
// Provider update timeline
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateEventKind {
    /// First tracked snapshot; gets only its own marker.
    Baseline,
    /// The provider's publish date for a new version.
    Published,
    /// The date the tracker collected that version.
    Collected,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateEvent {
    pub date: NaiveDate,
    pub kind: UpdateEventKind,
    pub change_number: u64,
}

/// One collected snapshot with a provider version counter.
#[derive(Debug, Clone)]
pub struct VersionObservation {
    pub collected: NaiveDate,
    pub change_number: u64,
    pub published: Option<NaiveDate>,
}

/// Turn raw version observations into timeline events: consecutive equal
/// change numbers collapse (the provider did not publish in between), the
/// first retained observation is the baseline, and publish events before
/// the baseline date are dropped.
pub fn version_events(mut observations: Vec<VersionObservation>) -> Vec<UpdateEvent> {
    observations.sort_by_key(|o| o.collected);

    let mut events = Vec::new();
    let mut last_number: Option<u64> = None;
    let mut baseline_date: Option<NaiveDate> = None;

    for obs in observations {
        if last_number == Some(obs.change_number) {
            continue;
        }
        last_number = Some(obs.change_number);

        match baseline_date {
            None => {
                baseline_date = Some(obs.collected);
                events.push(UpdateEvent {
                    date: obs.collected,
                    kind: UpdateEventKind::Baseline,
                    change_number: obs.change_number,
                });
            }
            Some(baseline) => {
                if let Some(published) = obs.published {
                    if published > baseline {
                        events.push(UpdateEvent {
                            date: published,
                            kind: UpdateEventKind::Published,
                            change_number: obs.change_number,
                        });
                    }
                }
                events.push(UpdateEvent {
                    date: obs.collected,
                    kind: UpdateEventKind::Collected,
                    change_number: obs.change_number,
                });
            }
        }
    }
    events
}

/// Collect version observations for every manifest entry (baseline
/// included) and derive the update timeline. Missing history or change
/// files degrade to fewer data points.
pub async fn update_events(loader: &DataLoader, manifest: &Manifest) -> Vec<UpdateEvent> {
    let mut observations = Vec::new();
    for entry in &manifest.files {
        let Some(collected) = entry.parsed_date() else {
            warn!("unparseable manifest date {}", entry.date);
            continue;
        };
        let history = match loader.load_history(&entry.date).await {
            Ok(history) => history,
            Err(err) => {
                debug!("no history entry for {}: {err}", entry.date);
                continue;
            }
        };
        let Some(change_number) = history.change_number else {
            continue;
        };
        let published = match loader
            .load_change_file(&format!("{}-changes.json", entry.date))
            .await
        {
            Ok(file) => file.metadata.as_ref().and_then(|m| m.published_date()),
            Err(_) => None,
        };
        observations.push(VersionObservation {
            collected,
            change_number,
            published,
        });
    }
    version_events(observations)
}

// ============================================================================
// Tracking coverage
// ============================================================================

/// How much history the dataset covers, baseline excluded.
#[derive(Debug, Clone, Default)]
pub struct Coverage {
    pub tracked_weeks: u64,
    /// First non-baseline date through the newest date, when known.
    pub span: Option<(NaiveDate, NaiveDate)>,
}

impl Coverage {
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let tracked_weeks = manifest.total_files.saturating_sub(1);
        if tracked_weeks == 0 {
            return Self::default();
        }

        let mut dates: Vec<NaiveDate> =
            manifest.files.iter().filter_map(|f| f.parsed_date()).collect();
        dates.sort();

        // Skip the oldest (baseline); the second-oldest is the first real
        // change observation.
        let start = match dates.get(1).copied() {
            Some(date) => Some(date),
            None => manifest
                .date_range
                .as_ref()
                .and_then(|r| r.oldest.parse().ok()),
        };
        let end = manifest
            .date_range
            .as_ref()
            .and_then(|r| r.newest.parse().ok())
            .or_else(|| dates.last().copied());

        Self {
            tracked_weeks,
            span: start.zip(end),
        }
    }

    /// Span length in whole weeks, rounded up, at least one.
    pub fn span_weeks(&self) -> Option<u64> {
        let (start, end) = self.span?;
        let days = (end - start).num_days().max(0) as u64;
        Some(days.div_ceil(7).max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChangeType;

    fn ip_change(service: &str, region: &str, added: u64, removed: u64) -> ChangeRecord {
        ChangeRecord {
            change_type: ChangeType::IpChanges,
            service: service.to_string(),
            region: region.to_string(),
            system_service: None,
            added_prefixes: Vec::new(),
            removed_prefixes: Vec::new(),
            added_count: added,
            removed_count: removed,
            ip_count: 0,
        }
    }

    #[test]
    fn two_weeks_accumulate_per_service() {
        let mut activity = HashMap::new();
        accumulate_activity(&mut activity, &[ip_change("Storage", "eastus", 5, 0)]);
        accumulate_activity(&mut activity, &[ip_change("Storage", "eastus", 0, 3)]);

        let storage = &activity["Storage"];
        assert_eq!(storage.change_count, 2);
        assert_eq!(storage.total_ips_added, 5);
        assert_eq!(storage.total_ips_removed, 3);
        assert_eq!(storage.total_ip_change, 8);
    }

    #[test]
    fn infrastructure_tags_never_enter_the_service_ranking() {
        let mut activity = HashMap::new();
        accumulate_activity(
            &mut activity,
            &[
                ip_change("AzureCloud", "", 100, 0),
                ip_change("AzureCloud.WestUS2", "westus2", 50, 0),
                ip_change("Sql", "westus2", 1, 0),
            ],
        );
        let ranked = rank_services(activity);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].service, "Sql");
    }

    #[test]
    fn frequency_dominates_churn_in_the_score() {
        let mut activity = HashMap::new();
        // A: 3 weeks, tiny churn. B: 1 week, large churn.
        for _ in 0..3 {
            accumulate_activity(&mut activity, &[ip_change("A", "", 1, 0)]);
        }
        accumulate_activity(&mut activity, &[ip_change("B", "", 900, 0)]);

        let ranked = rank_services(activity);
        assert_eq!(ranked[0].service, "A"); // 300.3 vs 190.0

        // Exact formula check.
        assert!((ranked[0].activity_score() - 300.3).abs() < 1e-9);
        assert!((ranked[1].activity_score() - 190.0).abs() < 1e-9);
    }

    #[test]
    fn enough_churn_overrides_frequency() {
        let mut activity = HashMap::new();
        accumulate_activity(&mut activity, &[ip_change("A", "", 1, 0)]);
        accumulate_activity(&mut activity, &[ip_change("A", "", 1, 0)]);
        // One week but 3000 churn: 100 + 300 > 200 + 0.2.
        accumulate_activity(&mut activity, &[ip_change("B", "", 3000, 0)]);
        let ranked = rank_services(activity);
        assert_eq!(ranked[0].service, "B");
    }

    #[test]
    fn hotspot_boundary_is_strictly_greater_than_three() {
        let changes: Vec<ChangeRecord> = std::iter::repeat(ip_change("Sql", "eastus", 1, 0))
            .take(3)
            .chain(std::iter::repeat(ip_change("Web", "westus2", 1, 0)).take(4))
            .chain(std::iter::once(ip_change("Dns", "", 1, 0)))
            .collect();
        let rollup = regional_rollup(&changes);
        let hot = hotspots(&rollup);
        assert_eq!(hot.len(), 1);
        assert_eq!(hot[0].region, "westus2");

        let minor = minor_regions(&rollup);
        assert_eq!(minor.len(), 1);
        assert_eq!(minor[0].region, "eastus");
    }

    #[test]
    fn regional_rollup_tracks_net_ip_delta() {
        let rollup = regional_rollup(&[
            ip_change("A", "eastus", 10, 2),
            ip_change("B", "eastus", 0, 5),
        ]);
        let eastus = rollup.iter().find(|r| r.region == "eastus").unwrap();
        assert_eq!(eastus.change_count, 2);
        assert_eq!(eastus.net_ip_change(), 3);
    }

    #[test]
    fn global_bucket_uses_the_empty_region_code() {
        let rollup = regional_rollup(&[ip_change("Dns", "", 1, 0)]);
        assert!(rollup[0].is_global());
        assert_eq!(crate::regions::display_name(&rollup[0].region), "Global");
    }

    #[test]
    fn top_service_breaks_ties_deterministically() {
        let changes = vec![
            ip_change("Sql", "eastus", 1, 0),
            ip_change("Sql", "eastus", 1, 0),
            ip_change("Web", "eastus", 1, 0),
        ];
        assert_eq!(top_service_in_region(&changes, "eastus"), Some(("Sql", 2)));
    }

    #[test]
    fn infra_rollup_buckets_by_name_suffix() {
        let mut rollup = InfraRollup::default();
        rollup.accumulate(&[
            ip_change("AzureCloud", "", 10, 2),
            ip_change("AzureCloud.WestUS2", "westus2", 5, 0),
            ip_change("AzureCloud.WestUS2", "westus2", 3, 0),
            ip_change("AzureCloud.EastUS", "eastus", 1, 0),
            ip_change("Storage", "eastus", 100, 0),
        ]);
        assert_eq!(rollup.total_ip_changes, 21);
        assert_eq!(rollup.global_ip_changes, 12);
        assert_eq!(rollup.regions["WestUS2"], 8);
        assert_eq!(
            rollup.top_regions(5),
            vec![("WestUS2", 8), ("EastUS", 1)]
        );
    }

    #[test]
    fn current_week_fallback_ranks_by_raw_churn() {
        let latest = ChangeFile {
            changes: vec![
                ip_change("Small", "", 1, 0),
                ip_change("Big", "", 50, 10),
                ip_change("AzureCloud", "", 999, 0),
            ],
            ..Default::default()
        };
        let ranked = current_week_activity(&latest);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].service, "Big");
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn version_events_collapse_repeats_and_mark_the_baseline() {
        let events = version_events(vec![
            VersionObservation {
                collected: date("2025-10-01"),
                change_number: 100,
                published: Some(date("2025-09-30")),
            },
            VersionObservation {
                collected: date("2025-10-08"),
                change_number: 100, // unchanged: collapsed
                published: None,
            },
            VersionObservation {
                collected: date("2025-10-15"),
                change_number: 101,
                published: Some(date("2025-10-13")),
            },
        ]);

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].kind, UpdateEventKind::Baseline);
        assert_eq!(events[0].date, date("2025-10-01"));
        assert_eq!(events[1].kind, UpdateEventKind::Published);
        assert_eq!(events[1].date, date("2025-10-13"));
        assert_eq!(events[2].kind, UpdateEventKind::Collected);
    }

    #[test]
    fn publish_dates_before_the_baseline_are_dropped() {
        let events = version_events(vec![
            VersionObservation {
                collected: date("2025-10-01"),
                change_number: 100,
                published: None,
            },
            VersionObservation {
                collected: date("2025-10-08"),
                change_number: 101,
                published: Some(date("2025-09-20")),
            },
        ]);
        assert!(events.iter().all(|e| e.kind != UpdateEventKind::Published));
    }

    #[test]
    fn coverage_excludes_the_baseline_week() {
        let manifest: Manifest = serde_json::from_str(
            r#"{
                "files": [
                    {"date": "2025-10-01", "filename": "a.json"},
                    {"date": "2025-10-08", "filename": "b.json"},
                    {"date": "2025-10-22", "filename": "c.json"}
                ],
                "date_range": {"oldest": "2025-10-01", "newest": "2025-10-22"},
                "total_files": 3
            }"#,
        )
        .unwrap();
        let coverage = Coverage::from_manifest(&manifest);
        assert_eq!(coverage.tracked_weeks, 2);
        assert_eq!(coverage.span, Some((date("2025-10-08"), date("2025-10-22"))));
        assert_eq!(coverage.span_weeks(), Some(2));
    }
}
