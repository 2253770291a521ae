use std::collections::BTreeSet;

use log::debug;
use serde::{Deserialize, Serialize};

use super::model::{Dimension, SalesTable, Transaction};
use crate::error::{DashboardError, Result};

// ---------------------------------------------------------------------------
// AgeRange
// ---------------------------------------------------------------------------

/// Inclusive customer-age interval `[lo, hi]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRange {
    pub lo: u32,
    pub hi: u32,
}

impl AgeRange {
    pub fn new(lo: u32, hi: u32) -> Result<Self> {
        let range = AgeRange { lo, hi };
        range.validate()?;
        Ok(range)
    }

    /// Fails with `InvalidRange` when `lo > hi`. Bounds are never swapped.
    pub fn validate(&self) -> Result<()> {
        if self.lo > self.hi {
            return Err(DashboardError::InvalidRange {
                lo: self.lo,
                hi: self.hi,
            });
        }
        Ok(())
    }

    pub fn contains(&self, age: u32) -> bool {
        self.lo <= age && age <= self.hi
    }

    /// Intersect with an inclusive `(min, max)` domain.
    /// Returns `None` when the two intervals do not overlap.
    pub fn clamp_to(&self, domain: (u32, u32)) -> Option<AgeRange> {
        let lo = self.lo.max(domain.0);
        let hi = self.hi.min(domain.1);
        (lo <= hi).then_some(AgeRange { lo, hi })
    }
}

// ---------------------------------------------------------------------------
// FilterSelection – the user's current filter choices
// ---------------------------------------------------------------------------

/// Age interval plus one set of allowed values per categorical dimension.
///
/// An empty set admits nothing: there is no implicit "all" fallback.
/// Values that never occur in the table are tolerated and simply match no row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSelection {
    pub age: AgeRange,
    pub gender: BTreeSet<String>,
    pub location: BTreeSet<String>,
    pub income_level: BTreeSet<String>,
    pub loyalty_member: BTreeSet<String>,
    pub product_category: BTreeSet<String>,
}

impl FilterSelection {
    /// Selection admitting every row of `table`: the full age domain and
    /// every observed value. An empty table yields `[0, u32::MAX]` and empty sets.
    pub fn all(table: &SalesTable) -> Self {
        let (lo, hi) = table.age_domain().unwrap_or((0, u32::MAX));
        let values = |dim| table.distinct_values(dim).clone();
        FilterSelection {
            age: AgeRange { lo, hi },
            gender: values(Dimension::Gender),
            location: values(Dimension::Location),
            income_level: values(Dimension::IncomeLevel),
            loyalty_member: values(Dimension::LoyaltyMember),
            product_category: values(Dimension::ProductCategory),
        }
    }

    pub fn allowed(&self, dim: Dimension) -> &BTreeSet<String> {
        match dim {
            Dimension::Gender => &self.gender,
            Dimension::Location => &self.location,
            Dimension::IncomeLevel => &self.income_level,
            Dimension::LoyaltyMember => &self.loyalty_member,
            Dimension::ProductCategory => &self.product_category,
        }
    }

    pub fn allowed_mut(&mut self, dim: Dimension) -> &mut BTreeSet<String> {
        match dim {
            Dimension::Gender => &mut self.gender,
            Dimension::Location => &mut self.location,
            Dimension::IncomeLevel => &mut self.income_level,
            Dimension::LoyaltyMember => &mut self.loyalty_member,
            Dimension::ProductCategory => &mut self.product_category,
        }
    }

    /// Whether `row` satisfies all six predicates.
    pub fn admits(&self, row: &Transaction) -> bool {
        self.age.contains(row.customer_age)
            && Dimension::ALL
                .iter()
                .all(|&dim| self.allowed(dim).contains(row.value(dim)))
    }
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Return indices of rows that pass every predicate of `selection`,
/// in their original order.
///
/// A dimension is skipped when its selection is a superset of every value the
/// table contains: the membership test could not reject any row. An empty
/// selection set rejects everything up front.
pub fn filtered_indices(table: &SalesTable, selection: &FilterSelection) -> Result<Vec<usize>> {
    selection.age.validate()?;

    if Dimension::ALL
        .iter()
        .any(|&dim| selection.allowed(dim).is_empty())
    {
        debug!("filter: empty selection set, 0 of {} rows kept", table.len());
        return Ok(Vec::new());
    }

    let active: Vec<(Dimension, &BTreeSet<String>)> = Dimension::ALL
        .iter()
        .map(|&dim| (dim, selection.allowed(dim)))
        .filter(|(dim, selected)| !table.distinct_values(*dim).is_subset(selected))
        .collect();

    let indices: Vec<usize> = table
        .rows()
        .iter()
        .enumerate()
        .filter(|(_, row)| {
            selection.age.contains(row.customer_age)
                && active
                    .iter()
                    .all(|(dim, selected)| selected.contains(row.value(*dim)))
        })
        .map(|(i, _)| i)
        .collect();

    debug!(
        "filter: {} of {} rows kept ({} active dimensions)",
        indices.len(),
        table.len(),
        active.len()
    );
    Ok(indices)
}

/// The filtered table: every row of `table` admitted by `selection`, same
/// column set, original relative order. `table` is left untouched.
pub fn filter(table: &SalesTable, selection: &FilterSelection) -> Result<SalesTable> {
    let indices = filtered_indices(table, selection)?;
    Ok(table.select(&indices))
}
