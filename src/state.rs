use std::collections::BTreeSet;
use std::sync::Arc;

use log::warn;

use crate::data::filter::{AgeRange, FilterSelection, filter};
use crate::data::model::{Dimension, SalesTable};
use crate::error::Result;

/// Age window a fresh session starts with, before clamping to the data.
pub const DEFAULT_AGE_WINDOW: AgeRange = AgeRange { lo: 20, hi: 50 };

// ---------------------------------------------------------------------------
// Dashboard session state
// ---------------------------------------------------------------------------

/// One user's dashboard session, independent of rendering.
///
/// The raw table is shared and never modified. Every mutator recomputes the
/// filtered table straight away, so `filtered()` always matches `selection()`.
#[derive(Debug, Clone)]
pub struct DashboardState {
    table: Arc<SalesTable>,
    selection: FilterSelection,
    filtered: SalesTable,
}

impl DashboardState {
    /// Start a session over `table` with the default selection.
    pub fn new(table: Arc<SalesTable>) -> Result<Self> {
        let selection = default_selection(&table);
        let filtered = filter(&table, &selection)?;
        Ok(Self {
            table,
            selection,
            filtered,
        })
    }

    /// Swap in a newly loaded table and reset the selection.
    pub fn set_table(&mut self, table: Arc<SalesTable>) -> Result<()> {
        self.selection = default_selection(&table);
        self.table = table;
        self.refilter()
    }

    /// Replace the whole selection at once (e.g. one restored from disk).
    pub fn set_selection(&mut self, selection: FilterSelection) -> Result<()> {
        selection.age.validate()?;
        self.selection = selection;
        self.refilter()
    }

    pub fn set_age_range(&mut self, range: AgeRange) -> Result<()> {
        range.validate()?;
        if let Some(domain) = self.table.age_domain() {
            if range.lo < domain.0 || range.hi > domain.1 {
                warn!(
                    "age range [{}, {}] extends past the data domain [{}, {}]",
                    range.lo, range.hi, domain.0, domain.1
                );
            }
        }
        self.selection.age = range;
        self.refilter()
    }

    /// Replace the allowed values of one dimension.
    pub fn set_allowed(&mut self, dim: Dimension, values: BTreeSet<String>) -> Result<()> {
        *self.selection.allowed_mut(dim) = values;
        self.refilter()
    }

    /// Toggle a single value in a dimension's selection.
    pub fn toggle_value(&mut self, dim: Dimension, value: &str) -> Result<()> {
        let selected = self.selection.allowed_mut(dim);
        if !selected.remove(value) {
            selected.insert(value.to_string());
        }
        self.refilter()
    }

    /// Select every observed value of a dimension.
    pub fn select_all(&mut self, dim: Dimension) -> Result<()> {
        let all = self.table.distinct_values(dim).clone();
        self.set_allowed(dim, all)
    }

    /// Deselect every value of a dimension; the filtered table becomes empty.
    pub fn select_none(&mut self, dim: Dimension) -> Result<()> {
        self.set_allowed(dim, BTreeSet::new())
    }

    /// Recompute the filtered table after a selection change.
    fn refilter(&mut self) -> Result<()> {
        self.filtered = filter(&self.table, &self.selection)?;
        Ok(())
    }

    pub fn table(&self) -> &Arc<SalesTable> {
        &self.table
    }

    pub fn selection(&self) -> &FilterSelection {
        &self.selection
    }

    pub fn filtered(&self) -> &SalesTable {
        &self.filtered
    }
}

/// Every value selected; age window [`DEFAULT_AGE_WINDOW`] clamped into the
/// table's domain, or the full domain when the two do not overlap.
pub fn default_selection(table: &SalesTable) -> FilterSelection {
    let mut selection = FilterSelection::all(table);
    if let Some(domain) = table.age_domain() {
        if let Some(window) = DEFAULT_AGE_WINDOW.clamp_to(domain) {
            selection.age = window;
        }
    }
    selection
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::tests::{sample_table, txn};
    use crate::error::DashboardError;

    fn state() -> DashboardState {
        DashboardState::new(Arc::new(sample_table())).unwrap()
    }

    #[test]
    fn default_window_is_clamped_to_data() {
        let state = state();
        assert_eq!(state.selection().age, AgeRange { lo: 25, hi: 50 });
        assert_eq!(state.filtered().len(), 2);
    }

    #[test]
    fn default_window_falls_back_to_full_domain() {
        let table = SalesTable::from_rows(vec![
            txn("A", 61, "F", "Dubai", "High", "Yes", "Grocery", 1.0, 1, 0),
            txn("B", 70, "M", "Dubai", "Low", "No", "Grocery", 2.0, 1, 0),
        ]);
        let selection = default_selection(&table);
        assert_eq!(selection.age, AgeRange { lo: 61, hi: 70 });
    }

    #[test]
    fn toggling_and_select_all_recompute() {
        let mut state = state();
        state.toggle_value(Dimension::Location, "Dubai").unwrap();
        assert_eq!(state.filtered().len(), 1);
        assert_eq!(state.filtered().rows()[0].location, "Abu Dhabi");

        state.toggle_value(Dimension::Location, "Dubai").unwrap();
        assert_eq!(state.filtered().len(), 2);

        state.select_none(Dimension::Gender).unwrap();
        assert!(state.filtered().is_empty());

        state.select_all(Dimension::Gender).unwrap();
        assert_eq!(state.filtered().len(), 2);
    }

    #[test]
    fn invalid_age_range_leaves_state_untouched() {
        let mut state = state();
        let before = state.selection().clone();
        let err = state.set_age_range(AgeRange { lo: 55, hi: 30 }).unwrap_err();
        assert_eq!(err, DashboardError::InvalidRange { lo: 55, hi: 30 });
        assert_eq!(state.selection(), &before);
    }

    #[test]
    fn widening_age_range_admits_older_rows() {
        let mut state = state();
        state.set_age_range(AgeRange { lo: 25, hi: 60 }).unwrap();
        assert_eq!(state.filtered().len(), 3);
    }

    #[test]
    fn set_table_resets_selection() {
        let mut state = state();
        state.select_none(Dimension::Gender).unwrap();
        let table = Arc::new(SalesTable::from_rows(vec![txn(
            "Z", 30, "M", "Ajman", "Low", "No", "Home", 9.0, 1, 0,
        )]));
        state.set_table(Arc::clone(&table)).unwrap();
        assert_eq!(state.filtered().len(), 1);
        assert!(Arc::ptr_eq(state.table(), &table));
    }
}
