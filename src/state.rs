//! Per-session UI state, gathered in one place instead of scattered fields.

use crate::render::PageMode;
use crate::timeline::{CompareSelection, HistoryFilter, WeekSelection};

/// Everything a dashboard session mutates between renders. `Default` is the
/// freshly-loaded state: first pages, no filters, nothing selected.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub page_mode: PageMode,
    /// 1-based; 0 is treated as 1 by the pagination helpers.
    pub services_page: usize,
    pub changes_page: usize,
    pub filter: HistoryFilter,
    pub compare: CompareSelection,
    pub selected_weeks: WeekSelection,
}

impl SessionState {
    pub fn new(page_mode: PageMode) -> Self {
        Self {
            page_mode,
            services_page: 1,
            changes_page: 1,
            ..Default::default()
        }
    }

    /// Clear filters and drop back to the first history page. Compare and
    /// export selections survive a filter reset.
    pub fn reset_filters(&mut self) {
        self.filter = HistoryFilter::default();
        self.changes_page = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_keeps_selections() {
        let mut state = SessionState::new(PageMode::History);
        state.filter.search = Some("sql".to_string());
        state.changes_page = 3;
        state.selected_weeks.insert("2025-10-08".parse().unwrap());

        state.reset_filters();
        assert!(!state.filter.is_active());
        assert_eq!(state.changes_page, 1);
        assert_eq!(state.selected_weeks.len(), 1);
    }
}
