use std::collections::BTreeMap;

use serde::Serialize;

use super::model::{Dimension, SalesTable, Transaction};
use crate::error::{DashboardError, Result};

// ---------------------------------------------------------------------------
// Scalar aggregates
// ---------------------------------------------------------------------------

/// Sum of `SalesAmount`; `0.0` for an empty table.
pub fn total_sales(table: &SalesTable) -> f64 {
    table.rows().iter().map(|r| r.sales_amount).sum()
}

/// Mean of `SalesAmount`. Fails with `EmptyAggregate` on an empty table.
pub fn mean_sales(table: &SalesTable) -> Result<f64> {
    mean(table, "mean sales", |r| r.sales_amount)
}

/// Sum of `NumTransactions`; `0` for an empty table.
pub fn total_transactions(table: &SalesTable) -> u64 {
    table.rows().iter().map(|r| r.num_transactions).sum()
}

/// Mean of `LoyaltyPointsRedeemed`. Fails with `EmptyAggregate` on an empty table.
pub fn mean_loyalty_points(table: &SalesTable) -> Result<f64> {
    mean(table, "mean loyalty points", |r| r.loyalty_points_redeemed as f64)
}

fn mean(table: &SalesTable, metric: &'static str, value: impl Fn(&Transaction) -> f64) -> Result<f64> {
    if table.is_empty() {
        return Err(DashboardError::EmptyAggregate { metric });
    }
    let sum: f64 = table.rows().iter().map(value).sum();
    Ok(sum / table.len() as f64)
}

// ---------------------------------------------------------------------------
// Grouped sums
// ---------------------------------------------------------------------------

/// One partition of a grouped sum.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupedSum {
    pub key: String,
    pub sales_amount: f64,
}

/// Sum `SalesAmount` per distinct value of `dim`.
///
/// Only values present in `table` appear. Groups are ordered by key,
/// ascending, so repeated calls over the same rows produce the same series.
pub fn grouped_sales(table: &SalesTable, dim: Dimension) -> Vec<GroupedSum> {
    group_rows(table.rows().iter(), dim)
}

/// Sales per product category among rows whose location is `location`.
pub fn category_sales_for_location(table: &SalesTable, location: &str) -> Vec<GroupedSum> {
    group_rows(
        table.rows().iter().filter(|r| r.location == location),
        Dimension::ProductCategory,
    )
}

fn group_rows<'a>(rows: impl Iterator<Item = &'a Transaction>, dim: Dimension) -> Vec<GroupedSum> {
    let mut sums: BTreeMap<&str, f64> = BTreeMap::new();
    for row in rows {
        *sums.entry(row.value(dim)).or_default() += row.sales_amount;
    }
    sums.into_iter()
        .map(|(key, sales_amount)| GroupedSum {
            key: key.to_string(),
            sales_amount,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Customer drilldown
// ---------------------------------------------------------------------------

/// All rows of one customer, original order preserved.
pub fn customer_rows(table: &SalesTable, customer_id: &str) -> Vec<Transaction> {
    table
        .rows()
        .iter()
        .filter(|r| r.customer_id == customer_id)
        .cloned()
        .collect()
}

/// Distinct customer ids in first-seen order.
pub fn customer_ids(table: &SalesTable) -> Vec<&str> {
    let mut seen = std::collections::HashSet::new();
    table
        .rows()
        .iter()
        .map(|r| r.customer_id.as_str())
        .filter(|id| seen.insert(*id))
        .collect()
}

// ---------------------------------------------------------------------------
// KPI block
// ---------------------------------------------------------------------------

/// The four headline metrics. Means are `None` over an empty table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiSummary {
    pub total_sales: f64,
    pub total_transactions: u64,
    pub mean_sales: Option<f64>,
    pub mean_loyalty_points: Option<f64>,
}

impl KpiSummary {
    pub fn compute(table: &SalesTable) -> Self {
        KpiSummary {
            total_sales: total_sales(table),
            total_transactions: total_transactions(table),
            mean_sales: mean_sales(table).ok(),
            mean_loyalty_points: mean_loyalty_points(table).ok(),
        }
    }
}
