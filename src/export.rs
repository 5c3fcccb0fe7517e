//! Export of timeline data to downloadable JSON and CSV documents.
//!
//! Two selection sources (active filters vs explicit week selection) times
//! two formats gives four operations. Exports with nothing selected or no
//! active filter are rejected up front — exporting everything by accident
//! is worse than a warning.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::error::ExportError;
use crate::regions;
use crate::timeline::{HistoryFilter, WeekSelection};
use crate::types::{ChangeRecord, TimelineItem};

/// Hard cap on CSV rows to bound file size; rows past the cap are dropped.
pub const MAX_CSV_ROWS: usize = 50_000;

pub const CSV_HEADER: &str = "Date,Service,Region,Change Type,IP Address/Prefix";

// ============================================================================
// JSON documents
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FilteredDocument {
    exported: DateTime<Utc>,
    filters: ActiveFilters,
    total_weeks: usize,
    total_changes: usize,
    changes: Vec<FilteredChange>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActiveFilters {
    search: Option<String>,
    /// Display name, not the raw code, to match what the user saw.
    region: Option<String>,
    date_range: Option<ExportDateRange>,
}

#[derive(Debug, Serialize)]
struct ExportDateRange {
    from: NaiveDate,
    to: NaiveDate,
}

#[derive(Debug, Serialize)]
struct FilteredChange {
    date: NaiveDate,
    service: String,
    region: Option<String>,
    added: Vec<String>,
    removed: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SelectedDocument<'a> {
    exported: DateTime<Utc>,
    description: &'static str,
    selected_weeks: usize,
    total_weeks: usize,
    date_range: Option<ExportDateRange>,
    data: Vec<&'a TimelineItem>,
}

/// `items` are newest-first; the export range runs oldest → newest.
fn date_range_of(items: &[&TimelineItem]) -> Option<ExportDateRange> {
    let newest = items.first()?.date;
    let oldest = items.last()?.date;
    Some(ExportDateRange {
        from: oldest,
        to: newest,
    })
}

/// Export the records matching the active filters as structured JSON.
/// Records without any prefix delta (pure add/remove service events) are
/// omitted; this export is about IP movement.
pub fn export_filtered_json(
    items: &[&TimelineItem],
    filter: &HistoryFilter,
    exported_at: DateTime<Utc>,
) -> Result<String, ExportError> {
    if !filter.is_active() {
        return Err(ExportError::NoActiveFilters);
    }

    let mut changes = Vec::new();
    for item in items {
        for change in filter.matching_changes(item) {
            if change.added_prefixes.is_empty() && change.removed_prefixes.is_empty() {
                continue;
            }
            changes.push(FilteredChange {
                date: item.date,
                service: change.service.clone(),
                region: if change.region.is_empty() {
                    None
                } else {
                    Some(regions::display_name(&change.region))
                },
                added: change.added_prefixes.clone(),
                removed: change.removed_prefixes.clone(),
            });
        }
    }

    let doc = FilteredDocument {
        exported: exported_at,
        filters: ActiveFilters {
            search: filter.search.clone().filter(|s| !s.trim().is_empty()),
            region: filter
                .region
                .as_deref()
                .filter(|r| !r.is_empty())
                .map(regions::display_name),
            date_range: date_range_of(items),
        },
        total_weeks: items.len(),
        total_changes: changes.len(),
        changes,
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

/// Export the selected weeks, embedding each week's full timeline item.
pub fn export_selected_json(
    items: &[&TimelineItem],
    selection: &WeekSelection,
    exported_at: DateTime<Utc>,
) -> Result<String, ExportError> {
    if selection.is_empty() {
        return Err(ExportError::NoSelection);
    }

    let selected: Vec<&TimelineItem> = items
        .iter()
        .copied()
        .filter(|item| selection.contains(item.date))
        .collect();

    let doc = SelectedDocument {
        exported: exported_at,
        description: "Selected Azure service tags change history",
        selected_weeks: selected.len(),
        total_weeks: items.len(),
        date_range: date_range_of(&selected),
        data: selected,
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

// ============================================================================
// CSV
// ============================================================================

/// Quote a field when it contains a comma, quote, or newline; double any
/// internal quotes.
pub fn escape_csv(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// One row per added/removed prefix, up to the row cap.
fn push_csv_rows(csv: &mut String, rows: &mut usize, date: NaiveDate, change: &ChangeRecord) {
    let service = if change.service.is_empty() {
        "N/A".to_string()
    } else {
        escape_csv(&change.service)
    };
    let region = escape_csv(&regions::display_name(&change.region));

    for (kind, prefixes) in [
        ("Added", &change.added_prefixes),
        ("Removed", &change.removed_prefixes),
    ] {
        for prefix in prefixes {
            if *rows >= MAX_CSV_ROWS {
                return;
            }
            csv.push_str(&format!(
                "{date},{service},{region},{kind},{}\n",
                escape_csv(prefix)
            ));
            *rows += 1;
        }
    }
}

/// Export the filter-matched IP changes as flat CSV.
pub fn export_filtered_csv(
    items: &[&TimelineItem],
    filter: &HistoryFilter,
) -> Result<String, ExportError> {
    if !filter.is_active() {
        return Err(ExportError::NoActiveFilters);
    }

    let mut csv = format!("{CSV_HEADER}\n");
    let mut rows = 0usize;
    for item in items {
        if rows >= MAX_CSV_ROWS {
            break;
        }
        for change in filter.matching_changes(item) {
            push_csv_rows(&mut csv, &mut rows, item.date, change);
        }
    }

    if rows == 0 {
        return Err(ExportError::NoRows);
    }
    Ok(csv)
}

/// Export every IP change of the selected weeks as flat CSV.
pub fn export_selected_csv(
    items: &[&TimelineItem],
    selection: &WeekSelection,
) -> Result<String, ExportError> {
    if selection.is_empty() {
        return Err(ExportError::NoSelection);
    }

    let mut csv = format!("{CSV_HEADER}\n");
    let mut rows = 0usize;
    for item in items.iter().filter(|i| selection.contains(i.date)) {
        if rows >= MAX_CSV_ROWS {
            break;
        }
        for change in &item.changes {
            push_csv_rows(&mut csv, &mut rows, item.date, change);
        }
    }

    if rows == 0 {
        return Err(ExportError::NoRows);
    }
    Ok(csv)
}

// ============================================================================
// File names
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub enum ExportKind {
    FilteredJson,
    FilteredCsv,
    SelectedJson,
    SelectedCsv,
}

/// Download name matching the dashboard's convention, e.g.
/// `azure-service-tags-filtered-westus2-2025-10-10.json`.
pub fn export_filename(kind: ExportKind, filter: &HistoryFilter, today: NaiveDate) -> String {
    let suffix = filter
        .region
        .as_deref()
        .filter(|r| !r.is_empty())
        .map(|r| format!("-{r}"))
        .unwrap_or_else(|| "-filtered".to_string());
    match kind {
        ExportKind::FilteredJson => format!("azure-service-tags-filtered{suffix}-{today}.json"),
        ExportKind::FilteredCsv => format!("azure-service-tags-details{suffix}-{today}.csv"),
        ExportKind::SelectedJson => format!("azure-service-tags-selected-weeks-{today}.json"),
        ExportKind::SelectedCsv => format!("azure-service-tags-selected-weeks-{today}.csv"),
    }
}
