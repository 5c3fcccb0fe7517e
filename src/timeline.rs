//! Change-history timeline: construction, filter/search, week comparison,
//! and multi-week selection.
//!
//! The timeline is built once per page load and filtered in memory. All
//! filters combine conjunctively.

use std::collections::{BTreeSet, HashSet};

use chrono::NaiveDate;
use tracing::warn;

use crate::loader::DataLoader;
use crate::regions;
use crate::types::{ChangeRecord, Manifest, TimelineItem};

/// Window choices offered to the user; only those covered by the data's
/// actual span are shown.
pub const WINDOW_LADDER_DAYS: [u32; 9] = [7, 14, 21, 30, 45, 60, 90, 180, 365];

/// Build one timeline item per non-baseline manifest entry, newest first.
/// Files that fail to load or carry an unparseable date are skipped.
pub async fn build_timeline(loader: &DataLoader, manifest: &Manifest) -> Vec<TimelineItem> {
    let mut entries = manifest.change_entries();
    entries.sort_by(|a, b| b.date.cmp(&a.date));

    let mut items = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(date) = entry.parsed_date() else {
            warn!("unparseable manifest date {}", entry.date);
            continue;
        };
        match loader.load_change_file(&entry.filename).await {
            Ok(file) => {
                let published = file.metadata.as_ref().and_then(|m| m.published_date());
                items.push(timeline_item(date, entry.filename.clone(), file.changes, published));
            }
            Err(err) => warn!("skipping {}: {err}", entry.filename),
        }
    }
    items
}

/// Precompute the per-week stats the history page shows.
pub fn timeline_item(
    date: NaiveDate,
    filename: String,
    changes: Vec<ChangeRecord>,
    date_published: Option<NaiveDate>,
) -> TimelineItem {
    let service_count = changes
        .iter()
        .map(|c| c.service.as_str())
        .collect::<HashSet<_>>()
        .len();
    // The empty region code is its own (Global) bucket.
    let region_count = changes
        .iter()
        .map(|c| c.region.as_str())
        .collect::<HashSet<_>>()
        .len();
    let added_ips: u64 = changes.iter().map(|c| c.added_count).sum();
    let removed_ips: u64 = changes.iter().map(|c| c.removed_count).sum();

    TimelineItem {
        date,
        filename,
        change_count: changes.len(),
        service_count,
        region_count,
        total_ip_changes: added_ips + removed_ips,
        added_ips,
        removed_ips,
        date_published,
        changes,
    }
}

// ============================================================================
// Filter / search
// ============================================================================

/// Conjunctive history filters. `search` and `region` drive the filtered
/// exports; the date window alone does not count as an active filter.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Case-insensitive free text, matched against the item's formatted
    /// date and each change's service/region (raw and display name).
    pub search: Option<String>,
    /// Exact raw region code.
    pub region: Option<String>,
    /// Keep items dated within the last N days (inclusive). `None` = all.
    pub window_days: Option<u32>,
}

impl HistoryFilter {
    /// Whether a search or region filter is set (export guard).
    pub fn is_active(&self) -> bool {
        self.search_term().is_some() || self.region_code().is_some()
    }

    fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    fn region_code(&self) -> Option<&str> {
        self.region.as_deref().filter(|r| !r.is_empty())
    }

    /// Apply all filters to the timeline, preserving order.
    pub fn apply<'a>(&self, items: &'a [TimelineItem], today: NaiveDate) -> Vec<&'a TimelineItem> {
        items
            .iter()
            .filter(|item| self.matches(item, today))
            .collect()
    }

    pub fn matches(&self, item: &TimelineItem, today: NaiveDate) -> bool {
        if let Some(days) = self.window_days {
            // Inclusive: an item dated exactly `today - days` is kept.
            let threshold = today - chrono::Duration::days(i64::from(days));
            if item.date < threshold {
                return false;
            }
        }

        if let Some(term) = self.search_term() {
            let date_match = item.formatted_date().to_lowercase().contains(&term);
            let change_match = item.changes.iter().any(|c| change_matches(c, &term));
            if !date_match && !change_match {
                return false;
            }
        }

        if let Some(region) = self.region_code() {
            if !item.changes.iter().any(|c| c.region == region) {
                return false;
            }
        }

        true
    }

    /// The subset of an item's changes matching the search and region
    /// filters, used by detail rendering and the filtered exports.
    pub fn matching_changes<'a>(&self, item: &'a TimelineItem) -> Vec<&'a ChangeRecord> {
        let term = self.search_term();
        let region = self.region_code();
        item.changes
            .iter()
            .filter(|c| region.map_or(true, |r| c.region == r))
            .filter(|c| term.as_deref().map_or(true, |t| change_matches(c, t)))
            .collect()
    }
}

fn change_matches(change: &ChangeRecord, term: &str) -> bool {
    change.service.to_lowercase().contains(term)
        || (!change.region.is_empty()
            && (change.region.to_lowercase().contains(term)
                || regions::display_name(&change.region)
                    .to_lowercase()
                    .contains(term)))
}

/// Window options the data span actually covers.
pub fn window_options(span_days: u32) -> Vec<u32> {
    WINDOW_LADDER_DAYS
        .iter()
        .copied()
        .filter(|days| *days <= span_days)
        .collect()
}

// ============================================================================
// Week comparison
// ============================================================================

/// Compare-mode selection: at most two weeks.
#[derive(Debug, Clone, Default)]
pub struct CompareSelection {
    dates: Vec<NaiveDate>,
}

impl CompareSelection {
    /// Toggle a week in or out. Selecting a third week is a no-op.
    pub fn toggle(&mut self, date: NaiveDate) {
        if let Some(pos) = self.dates.iter().position(|d| *d == date) {
            self.dates.remove(pos);
        } else if self.dates.len() < 2 {
            self.dates.push(date);
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn clear(&mut self) {
        self.dates.clear();
    }

    /// The selected pair in chronological order, once exactly two are set.
    pub fn pair(&self) -> Option<(NaiveDate, NaiveDate)> {
        match self.dates.as_slice() {
            [a, b] => Some((*a.min(b), *a.max(b))),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Increased,
    Decreased,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct ComparisonRow {
    pub metric: &'static str,
    pub earlier: u64,
    pub later: u64,
}

impl ComparisonRow {
    pub fn delta(&self) -> i64 {
        self.later as i64 - self.earlier as i64
    }

    /// Percentage change vs the earlier week, zero when the base is zero.
    pub fn percent(&self) -> f64 {
        if self.earlier == 0 {
            0.0
        } else {
            self.delta() as f64 / self.earlier as f64 * 100.0
        }
    }

    pub fn direction(&self) -> Direction {
        match self.delta() {
            d if d > 0 => Direction::Increased,
            d if d < 0 => Direction::Decreased,
            _ => Direction::Unchanged,
        }
    }

    pub fn describe(&self) -> String {
        match self.direction() {
            Direction::Increased => {
                format!("increased by {} ({:.1}%)", self.delta().abs(), self.percent().abs())
            }
            Direction::Decreased => {
                format!("decreased by {} ({:.1}%)", self.delta().abs(), self.percent().abs())
            }
            Direction::Unchanged => "no change (same value)".to_string(),
        }
    }
}

/// Side-by-side numeric comparison of two weeks.
#[derive(Debug, Clone)]
pub struct WeekComparison {
    pub earlier: NaiveDate,
    pub later: NaiveDate,
    pub rows: Vec<ComparisonRow>,
}

impl WeekComparison {
    pub fn between(a: &TimelineItem, b: &TimelineItem) -> Self {
        let (earlier, later) = if a.date <= b.date { (a, b) } else { (b, a) };
        let row = |metric, e: u64, l: u64| ComparisonRow {
            metric,
            earlier: e,
            later: l,
        };
        Self {
            earlier: earlier.date,
            later: later.date,
            rows: vec![
                row(
                    "total changes",
                    earlier.change_count as u64,
                    later.change_count as u64,
                ),
                row(
                    "services",
                    earlier.service_count as u64,
                    later.service_count as u64,
                ),
                row("ip changes", earlier.total_ip_changes, later.total_ip_changes),
            ],
        }
    }
}

// ============================================================================
// Multi-week selection (bulk export, independent of compare mode)
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct WeekSelection {
    dates: BTreeSet<NaiveDate>,
}

impl WeekSelection {
    pub fn toggle(&mut self, date: NaiveDate) {
        if !self.dates.remove(&date) {
            self.dates.insert(date);
        }
    }

    pub fn select_all<'a>(&mut self, items: impl IntoIterator<Item = &'a TimelineItem>) {
        self.dates.extend(items.into_iter().map(|i| i.date));
    }

    pub fn clear(&mut self) {
        self.dates.clear();
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date)
    }

    pub fn insert(&mut self, date: NaiveDate) {
        self.dates.insert(date);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChangeType;

    fn change(service: &str, region: &str, added: u64, removed: u64) -> ChangeRecord {
        ChangeRecord {
            change_type: ChangeType::IpChanges,
            service: service.to_string(),
            region: region.to_string(),
            system_service: None,
            added_prefixes: (0..added).map(|i| format!("10.0.{i}.0/24")).collect(),
            removed_prefixes: (0..removed).map(|i| format!("10.1.{i}.0/24")).collect(),
            added_count: added,
            removed_count: removed,
            ip_count: 0,
        }
    }

    fn item(date: &str, changes: Vec<ChangeRecord>) -> TimelineItem {
        timeline_item(
            date.parse().unwrap(),
            format!("{date}-changes.json"),
            changes,
            None,
        )
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn timeline_item_stats_count_distinct_services_and_regions() {
        let it = item(
            "2025-10-08",
            vec![
                change("Sql", "eastus", 2, 1),
                change("Sql", "westus2", 1, 0),
                change("Web", "", 0, 4),
            ],
        );
        assert_eq!(it.change_count, 3);
        assert_eq!(it.service_count, 2);
        assert_eq!(it.region_count, 3); // eastus, westus2, global bucket
        assert_eq!(it.added_ips, 3);
        assert_eq!(it.removed_ips, 5);
        assert_eq!(it.total_ip_changes, 8);
    }

    #[test]
    fn search_matches_service_raw_region_and_display_region() {
        let items = vec![item("2025-10-08", vec![change("AppService", "westeurope", 1, 0)])];
        let today = date("2025-10-10");

        for term in ["appser", "westeur", "west europe", "October 8"] {
            let filter = HistoryFilter {
                search: Some(term.to_string()),
                ..Default::default()
            };
            assert_eq!(filter.apply(&items, today).len(), 1, "term {term:?}");
        }

        let miss = HistoryFilter {
            search: Some("koreacentral".to_string()),
            ..Default::default()
        };
        assert!(miss.apply(&items, today).is_empty());
    }

    #[test]
    fn region_filter_requires_exact_raw_code() {
        let items = vec![
            item("2025-10-08", vec![change("Sql", "eastus", 1, 0)]),
            item("2025-10-01", vec![change("Sql", "eastus2", 1, 0)]),
        ];
        let filter = HistoryFilter {
            region: Some("eastus".to_string()),
            ..Default::default()
        };
        let kept = filter.apply(&items, date("2025-10-10"));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].date, date("2025-10-08"));
    }

    #[test]
    fn window_boundary_is_inclusive() {
        let items = vec![
            item("2025-10-03", vec![change("Sql", "eastus", 1, 0)]),
            item("2025-10-02", vec![change("Sql", "eastus", 1, 0)]),
        ];
        let filter = HistoryFilter {
            window_days: Some(7),
            ..Default::default()
        };
        // today - 7 = 2025-10-03: kept; the day before: dropped.
        let kept = filter.apply(&items, date("2025-10-10"));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].date, date("2025-10-03"));
    }

    #[test]
    fn filters_combine_conjunctively() {
        let items = vec![
            item("2025-10-08", vec![change("Sql", "eastus", 1, 0)]),
            item("2025-10-08", vec![change("Web", "eastus", 1, 0)]),
        ];
        let filter = HistoryFilter {
            search: Some("sql".to_string()),
            region: Some("eastus".to_string()),
            window_days: Some(30),
        };
        assert_eq!(filter.apply(&items, date("2025-10-10")).len(), 1);
    }

    #[test]
    fn window_alone_is_not_an_active_filter() {
        let filter = HistoryFilter {
            window_days: Some(7),
            ..Default::default()
        };
        assert!(!filter.is_active());
        let filter = HistoryFilter {
            search: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(!filter.is_active());
    }

    #[test]
    fn matching_changes_narrows_within_an_item() {
        let it = item(
            "2025-10-08",
            vec![
                change("Sql", "eastus", 1, 0),
                change("Sql", "westus2", 1, 0),
                change("Web", "eastus", 1, 0),
            ],
        );
        let filter = HistoryFilter {
            search: Some("sql".to_string()),
            region: Some("eastus".to_string()),
            ..Default::default()
        };
        let matched = filter.matching_changes(&it);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].service, "Sql");
        assert_eq!(matched[0].region, "eastus");
    }

    #[test]
    fn window_options_track_the_data_span() {
        assert_eq!(window_options(6), Vec::<u32>::new());
        assert_eq!(window_options(21), vec![7, 14, 21]);
        assert_eq!(window_options(400).len(), WINDOW_LADDER_DAYS.len());
    }

    #[test]
    fn compare_selection_caps_at_two() {
        let mut sel = CompareSelection::default();
        sel.toggle(date("2025-10-01"));
        sel.toggle(date("2025-10-08"));
        sel.toggle(date("2025-10-15")); // ignored
        assert_eq!(sel.len(), 2);
        assert_eq!(sel.pair(), Some((date("2025-10-01"), date("2025-10-08"))));

        sel.toggle(date("2025-10-08")); // deselect
        assert_eq!(sel.len(), 1);
        assert_eq!(sel.pair(), None);
    }

    #[test]
    fn comparison_orders_by_date_and_labels_direction() {
        let later = item("2025-10-08", vec![change("Sql", "eastus", 6, 0)]);
        let earlier = item(
            "2025-10-01",
            vec![change("Sql", "eastus", 2, 0), change("Web", "", 2, 0)],
        );

        // Argument order must not matter.
        let cmp = WeekComparison::between(&later, &earlier);
        assert_eq!(cmp.earlier, date("2025-10-01"));
        assert_eq!(cmp.later, date("2025-10-08"));

        let changes_row = &cmp.rows[0];
        assert_eq!(changes_row.direction(), Direction::Decreased);
        assert_eq!(changes_row.describe(), "decreased by 1 (50.0%)");

        let ip_row = &cmp.rows[2];
        assert_eq!(ip_row.earlier, 4);
        assert_eq!(ip_row.later, 6);
        assert_eq!(ip_row.direction(), Direction::Increased);
        assert_eq!(ip_row.describe(), "increased by 2 (50.0%)");
    }

    #[test]
    fn comparison_percent_is_zero_on_zero_base() {
        let row = ComparisonRow {
            metric: "services",
            earlier: 0,
            later: 5,
        };
        assert_eq!(row.percent(), 0.0);
        assert_eq!(row.direction(), Direction::Increased);
    }

    #[test]
    fn week_selection_toggles_and_selects_all() {
        let items = vec![
            item("2025-10-08", vec![]),
            item("2025-10-01", vec![]),
        ];
        let mut sel = WeekSelection::default();
        sel.toggle(date("2025-10-08"));
        assert!(sel.contains(date("2025-10-08")));
        sel.toggle(date("2025-10-08"));
        assert!(sel.is_empty());

        sel.select_all(&items);
        assert_eq!(sel.len(), 2);
        sel.clear();
        assert!(sel.is_empty());
    }
}
