//! Terminal rendering of the dashboard pages.
//!
//! Each page renders to a plain `String`; the binary just prints it. The
//! pagination math mirrors the published dashboard so page numbers line up
//! with what the web view shows.

use std::fmt::Write;

use crate::aggregator::{
    top_service_in_region, Coverage, InfraRollup, RegionActivity, ServiceActivity, UpdateEvent,
    UpdateEventKind,
};
use crate::regions;
use crate::timeline::{HistoryFilter, WeekComparison};
use crate::types::{format_long_date, ChangeRecord, ServiceTagSnapshot, Summary, TimelineItem};

/// Which page the session is on. Features check the mode instead of probing
/// for page-specific state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageMode {
    #[default]
    Overview,
    Analytics,
    History,
}

// ============================================================================
// Stat cards
// ============================================================================

/// The four headline numbers at the top of every page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatCards {
    pub total_services: u64,
    pub total_ip_ranges: u64,
    pub changes_this_week: u64,
    pub region_count: usize,
}

impl StatCards {
    /// Summary counters, with the region count taken from the summary's
    /// per-region breakdown when present and derived from the snapshot
    /// otherwise.
    pub fn build(summary: &Summary, snapshot: &ServiceTagSnapshot) -> Self {
        let region_count = if summary.regional_changes.is_empty() {
            region_count_from_snapshot(snapshot)
        } else {
            summary.regional_changes.len()
        };
        Self {
            total_services: summary.total_services,
            total_ip_ranges: summary.total_ip_ranges,
            changes_this_week: summary.changes_this_week,
            region_count,
        }
    }
}

/// Count the distinct regions the snapshot's tags cover. Tags without a
/// region property may still encode one as the last dotted segment of their
/// name (`Storage.WestUS2`); only segments that resolve to a known region
/// count, so `Sql.EastUS.Backup`-style names do not invent regions.
pub fn region_count_from_snapshot(snapshot: &ServiceTagSnapshot) -> usize {
    let mut seen = std::collections::HashSet::new();
    for tag in &snapshot.values {
        let region = tag.region();
        if !region.is_empty() {
            seen.insert(regions::lookup_key(region));
        } else if let Some((_, segment)) = tag.name.rsplit_once('.') {
            if regions::is_known_region(segment) {
                seen.insert(regions::lookup_key(segment));
            }
        }
    }
    seen.len()
}

// ============================================================================
// Pagination
// ============================================================================

/// Rows per page on the active-services table.
pub const SERVICES_PAGE_SIZE: usize = 5;

/// Inline page numbers shown before the list collapses to ellipses.
const MAX_VISIBLE_PAGES: usize = 4;

pub fn page_count(total_items: usize, page_size: usize) -> usize {
    total_items.div_ceil(page_size).max(1)
}

/// The 1-based `page`'s slice of `items`, clamped into range.
pub fn page_slice<T>(items: &[T], page: usize, page_size: usize) -> &[T] {
    let pages = page_count(items.len(), page_size);
    let page = page.clamp(1, pages);
    let start = (page - 1) * page_size;
    let end = (start + page_size).min(items.len());
    &items[start..end]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageToken {
    Num(usize),
    Ellipsis,
}

/// The page-number strip: every page inline while short, otherwise the
/// first page, a window around the current page, and the last page, with
/// ellipses marking the gaps.
pub fn page_numbers(current: usize, total: usize) -> Vec<PageToken> {
    if total <= MAX_VISIBLE_PAGES + 2 {
        return (1..=total).map(PageToken::Num).collect();
    }

    let mut tokens = vec![PageToken::Num(1)];
    if current > 3 {
        tokens.push(PageToken::Ellipsis);
    }
    let from = current.saturating_sub(1).max(2);
    let to = (current + 1).min(total - 1);
    for page in from..=to {
        tokens.push(PageToken::Num(page));
    }
    if current < total - 2 {
        tokens.push(PageToken::Ellipsis);
    }
    tokens.push(PageToken::Num(total));
    tokens
}

fn page_strip(current: usize, total: usize) -> String {
    page_numbers(current, total)
        .into_iter()
        .map(|token| match token {
            PageToken::Num(page) if page == current => format!("[{page}]"),
            PageToken::Num(page) => page.to_string(),
            PageToken::Ellipsis => "…".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// Pages
// ============================================================================

pub fn render_stat_cards(stats: &StatCards) -> String {
    format!(
        "Services: {}   IP ranges: {}   Changes this week: {}   Regions: {}\n",
        stats.total_services, stats.total_ip_ranges, stats.changes_this_week, stats.region_count
    )
}

pub fn render_overview(stats: &StatCards, summary: &Summary) -> String {
    let mut out = render_stat_cards(stats);
    if let Some(updated) = summary.last_updated.as_deref() {
        let _ = writeln!(out, "Last updated: {updated}");
    }
    if summary.changes_this_week > 0 {
        let _ = writeln!(
            out,
            "This week: {} IP changes, {} services added, {} removed",
            summary.ip_changes, summary.service_additions, summary.service_removals
        );
    }

    if summary.top_active_services.is_empty() {
        out.push_str("\nNo change activity recorded yet.\n");
        return out;
    }

    out.push_str("\nMost active services this week:\n");
    for top in &summary.top_active_services {
        let _ = writeln!(out, "  {:<40} {} changes", top.service, top.change_count);
    }
    out
}

/// One page of the ranked active-services table.
pub fn render_services_page(ranked: &[ServiceActivity], page: usize) -> String {
    if ranked.is_empty() {
        return "No service activity in the tracked period.\n".to_string();
    }

    let pages = page_count(ranked.len(), SERVICES_PAGE_SIZE);
    let page = page.clamp(1, pages);
    let slice = page_slice(ranked, page, SERVICES_PAGE_SIZE);

    let mut out = String::from("Most active services (all tracked weeks):\n");
    let offset = (page - 1) * SERVICES_PAGE_SIZE;
    for (i, svc) in slice.iter().enumerate() {
        let _ = writeln!(
            out,
            "  {:>3}. {:<40} {} weeks, +{} / -{} IPs",
            offset + i + 1,
            svc.service,
            svc.change_count,
            svc.total_ips_added,
            svc.total_ips_removed
        );
    }
    if pages > 1 {
        let _ = writeln!(out, "  page {page} of {pages}: {}", page_strip(page, pages));
    }
    out
}

/// The regional hotspot panel: busy regions with their most-changed service,
/// then a one-line tail for the regions with minor activity.
pub fn render_hotspots(
    hotspots: &[&RegionActivity],
    minor: &[&RegionActivity],
    changes: &[ChangeRecord],
) -> String {
    if hotspots.is_empty() && minor.is_empty() {
        return "No regional changes this week.\n".to_string();
    }

    let mut out = String::new();
    if hotspots.is_empty() {
        out.push_str("No regional hotspots this week.\n");
    } else {
        out.push_str("Regional hotspots:\n");
        for region in hotspots {
            let _ = write!(
                out,
                "  {:<24} {} changes, net {:+} IPs",
                regions::display_name(&region.region),
                region.change_count,
                region.net_ip_change()
            );
            if let Some((service, count)) = top_service_in_region(changes, &region.region) {
                let _ = write!(out, ", most changed: {service} ({count})");
            }
            out.push('\n');
        }
    }
    if !minor.is_empty() {
        let names: Vec<String> = minor
            .iter()
            .map(|r| regions::display_name(&r.region))
            .collect();
        let _ = writeln!(out, "Minor activity: {}", names.join(", "));
    }
    out
}

/// The history timeline. With an active filter, each kept week also lists
/// its matching change records.
pub fn render_timeline(
    items: &[&TimelineItem],
    filter: &HistoryFilter,
    page: usize,
    page_size: usize,
) -> String {
    if items.is_empty() {
        return if filter.is_active() {
            "No weeks match the current filters.\n".to_string()
        } else {
            "No change history available yet.\n".to_string()
        };
    }

    let pages = page_count(items.len(), page_size);
    let page = page.clamp(1, pages);

    let mut out = String::new();
    for item in page_slice(items, page, page_size) {
        let _ = writeln!(
            out,
            "{}: {} changes, {} services, {} regions, +{} / -{} IPs",
            item.formatted_date(),
            item.change_count,
            item.service_count,
            item.region_count,
            item.added_ips,
            item.removed_ips
        );
        if let Some(published) = item.date_published {
            let _ = writeln!(out, "  published {}", format_long_date(published));
        }
        if filter.is_active() {
            for change in filter.matching_changes(item) {
                let _ = writeln!(
                    out,
                    "  {} ({}): +{} / -{} IPs",
                    change.service,
                    regions::display_name(&change.region),
                    change.added_count,
                    change.removed_count
                );
            }
        }
    }
    if pages > 1 {
        let _ = writeln!(out, "page {page} of {pages}: {}", page_strip(page, pages));
    }
    out
}

pub fn render_comparison(cmp: &WeekComparison) -> String {
    let mut out = format!(
        "Comparing {} with {}:\n",
        format_long_date(cmp.earlier),
        format_long_date(cmp.later)
    );
    for row in &cmp.rows {
        let _ = writeln!(
            out,
            "  {:<14} {:>6} → {:>6}  {}",
            row.metric,
            row.earlier,
            row.later,
            row.describe()
        );
    }
    out
}

pub fn render_infra(rollup: &InfraRollup) -> String {
    if rollup.total_ip_changes == 0 {
        return "No infrastructure tag activity in the tracked period.\n".to_string();
    }

    let mut out = format!(
        "Infrastructure IP churn: {} total, {} global\n",
        rollup.total_ip_changes, rollup.global_ip_changes
    );
    for (region, churn) in rollup.top_regions(5) {
        let _ = writeln!(out, "  {region:<24} {churn} IP changes");
    }
    out
}

pub fn render_update_events(events: &[UpdateEvent]) -> String {
    if events.is_empty() {
        return "No provider version history available.\n".to_string();
    }

    let mut out = String::from("Provider updates:\n");
    for event in events {
        let label = match event.kind {
            UpdateEventKind::Baseline => "baseline",
            UpdateEventKind::Published => "published",
            UpdateEventKind::Collected => "collected",
        };
        let _ = writeln!(
            out,
            "  {}  {:<9} version {}",
            event.date, label, event.change_number
        );
    }
    out
}

pub fn render_coverage(coverage: &Coverage) -> String {
    match coverage.span {
        Some((start, end)) => {
            let weeks = coverage.span_weeks().unwrap_or(1);
            format!(
                "Tracking {} change files over {} week(s), {} through {}\n",
                coverage.tracked_weeks, weeks, start, end
            )
        }
        None => "No change history tracked yet.\n".to_string(),
    }
}
