use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::data::aggregate::{
    GroupedSum, KpiSummary, category_sales_for_location, customer_rows, grouped_sales,
};
use crate::data::filter::FilterSelection;
use crate::data::model::{Dimension, REQUIRED_COLUMNS, Transaction};
use crate::state::DashboardState;

const CURRENCY: &str = "AED";
const BAR_WIDTH: usize = 30;

// ---------------------------------------------------------------------------
// Chart series
// ---------------------------------------------------------------------------

/// How a grouped series should be drawn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    #[default]
    Bar,
    Pie,
    Line,
}

impl FromStr for ChartKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bar" => Ok(ChartKind::Bar),
            "pie" => Ok(ChartKind::Pie),
            "line" => Ok(ChartKind::Line),
            other => Err(format!("unknown chart kind `{other}` (expected bar, pie or line)")),
        }
    }
}

/// A grouped sum ready to hand to a charting library.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub kind: ChartKind,
    pub title: String,
    pub dimension: Dimension,
    pub points: Vec<GroupedSum>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerDrilldown {
    pub customer_id: String,
    pub rows: Vec<Transaction>,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// What the host wants in the report besides the KPI block.
#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    pub chart: ChartKind,
    /// Location for the category breakdown; defaults to the first location in the data.
    pub focus_location: Option<String>,
    pub customer_id: Option<String>,
    /// Include the filtered rows themselves.
    pub include_rows: bool,
}

/// Everything the dashboard displays for one selection.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardReport {
    pub selection: FilterSelection,
    pub total_rows: usize,
    pub filtered_rows: usize,
    pub kpis: KpiSummary,
    pub sales_by_location: ChartSeries,
    /// Category breakdown over the unfiltered table. `None` for an empty table.
    pub category_sales: Option<ChartSeries>,
    pub customer: Option<CustomerDrilldown>,
    pub rows: Option<Vec<Transaction>>,
}

impl DashboardReport {
    pub fn build(state: &DashboardState, options: &ReportOptions) -> Self {
        let raw = state.table();
        let filtered = state.filtered();

        let sales_by_location = ChartSeries {
            kind: options.chart,
            title: "Sales by Location".to_string(),
            dimension: Dimension::Location,
            points: grouped_sales(filtered, Dimension::Location),
        };

        let focus = options
            .focus_location
            .clone()
            .or_else(|| raw.rows().first().map(|r| r.location.clone()));
        let category_sales = focus.map(|location| ChartSeries {
            kind: ChartKind::Bar,
            title: format!("Product Category Sales in {location}"),
            dimension: Dimension::ProductCategory,
            points: category_sales_for_location(raw, &location),
        });

        let customer = options.customer_id.as_ref().map(|id| CustomerDrilldown {
            customer_id: id.clone(),
            rows: customer_rows(raw, id),
        });

        DashboardReport {
            selection: state.selection().clone(),
            total_rows: raw.len(),
            filtered_rows: filtered.len(),
            kpis: KpiSummary::compute(filtered),
            sales_by_location,
            category_sales,
            customer,
            rows: options.include_rows.then(|| filtered.rows().to_vec()),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Plain-text rendering for terminals and logs.
    pub fn render_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DashboardReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Sales Dashboard")?;
        writeln!(
            f,
            "{} of {} transactions match the filters (age {}-{})",
            self.filtered_rows, self.total_rows, self.selection.age.lo, self.selection.age.hi
        )?;
        writeln!(f)?;

        let kpis = &self.kpis;
        let na = || "n/a".to_string();
        let metrics = [
            ("Total Sales", format_currency(kpis.total_sales)),
            ("Transactions", kpis.total_transactions.to_string()),
            ("Avg Sales", kpis.mean_sales.map(format_currency).unwrap_or_else(na)),
            (
                "Avg Loyalty Points Redeemed",
                kpis.mean_loyalty_points
                    .map(|v| format!("{v:.1}"))
                    .unwrap_or_else(na),
            ),
        ];
        for (label, value) in metrics {
            writeln!(f, "{label:<29}{value}")?;
        }

        writeln!(f)?;
        write_series(f, &self.sales_by_location)?;
        if let Some(series) = &self.category_sales {
            writeln!(f)?;
            write_series(f, series)?;
        }

        if let Some(customer) = &self.customer {
            writeln!(f)?;
            writeln!(f, "Customer {}", customer.customer_id)?;
            write_rows(f, &customer.rows)?;
        }

        if let Some(rows) = &self.rows {
            writeln!(f)?;
            writeln!(f, "Filtered dataset")?;
            write_rows(f, rows)?;
        }
        Ok(())
    }
}

fn write_series(f: &mut fmt::Formatter<'_>, series: &ChartSeries) -> fmt::Result {
    let kind = match series.kind {
        ChartKind::Bar => "bar",
        ChartKind::Pie => "pie",
        ChartKind::Line => "line",
    };
    writeln!(f, "{} [{kind}]", series.title)?;
    if series.points.is_empty() {
        return writeln!(f, "  (no data)");
    }

    // Padding counts chars, so the width must too.
    let width = series
        .points
        .iter()
        .map(|p| p.key.chars().count())
        .max()
        .unwrap_or(0);
    let total: f64 = series.points.iter().map(|p| p.sales_amount).sum();
    let max = series
        .points
        .iter()
        .map(|p| p.sales_amount)
        .fold(0.0_f64, f64::max);

    for point in &series.points {
        let amount = format_currency(point.sales_amount);
        match series.kind {
            ChartKind::Bar => {
                let len = if max > 0.0 {
                    ((point.sales_amount / max) * BAR_WIDTH as f64).round() as usize
                } else {
                    0
                };
                writeln!(f, "  {:<width$}  {amount:>16}  {}", point.key, "#".repeat(len))?;
            }
            ChartKind::Pie => {
                let share = if total != 0.0 { point.sales_amount / total * 100.0 } else { 0.0 };
                writeln!(f, "  {:<width$}  {amount:>16}  {share:5.1}%", point.key)?;
            }
            ChartKind::Line => writeln!(f, "  {:<width$}  {amount:>16}", point.key)?,
        }
    }
    Ok(())
}

fn write_rows(f: &mut fmt::Formatter<'_>, rows: &[Transaction]) -> fmt::Result {
    if rows.is_empty() {
        return writeln!(f, "  (no rows)");
    }
    writeln!(f, "  {}", REQUIRED_COLUMNS.join("\t"))?;
    for r in rows {
        writeln!(
            f,
            "  {}\t{}\t{}\t{}\t{}\t{}\t{}\t{:.2}\t{}\t{}",
            r.customer_id,
            r.customer_age,
            r.gender,
            r.location,
            r.income_level,
            r.loyalty_member,
            r.product_category,
            r.sales_amount,
            r.num_transactions,
            r.loyalty_points_redeemed
        )?;
    }
    Ok(())
}

/// `AED 1,234.56` style amount with thousands separators.
pub fn format_currency(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if amount < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{CURRENCY} {sign}{grouped}.{frac_part}")
}
