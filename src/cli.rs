use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;

use rusty_sales::data::filter::{AgeRange, FilterSelection};
use rusty_sales::data::loader::TableCache;
use rusty_sales::data::aggregate::customer_ids;
use rusty_sales::data::model::{Dimension, SalesTable};
use rusty_sales::report::{ChartKind, DashboardReport, ReportOptions};
use rusty_sales::state::DashboardState;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Filter a sales dataset and print the dashboard KPIs and series.
#[derive(Debug, Parser)]
#[command(name = "rusty-sales", version, about)]
pub struct Args {
    /// Sales dataset (.xlsx, .xls, .csv, .json or .parquet).
    pub file: PathBuf,

    /// Restore a saved selection (JSON) before applying the flags below.
    #[arg(long, value_name = "PATH")]
    pub selection: Option<PathBuf>,

    /// Lower bound of the customer age window (inclusive).
    #[arg(long)]
    pub age_min: Option<u32>,

    /// Upper bound of the customer age window (inclusive).
    #[arg(long)]
    pub age_max: Option<u32>,

    /// Allowed genders (repeatable). Replaces the current set.
    #[arg(long, value_name = "VALUE")]
    pub gender: Vec<String>,

    /// Allowed locations (repeatable).
    #[arg(long, value_name = "VALUE")]
    pub location: Vec<String>,

    /// Allowed income levels (repeatable).
    #[arg(long, value_name = "VALUE")]
    pub income: Vec<String>,

    /// Allowed loyalty flags (repeatable).
    #[arg(long, value_name = "VALUE")]
    pub loyalty: Vec<String>,

    /// Allowed product categories (repeatable).
    #[arg(long, value_name = "VALUE")]
    pub category: Vec<String>,

    /// Deselect every value of a dimension (repeatable), e.g. `--clear Gender`.
    #[arg(long, value_name = "DIMENSION")]
    pub clear: Vec<Dimension>,

    /// Chart style for the sales-by-location series.
    #[arg(long, default_value = "bar")]
    pub chart: ChartKind,

    /// Location for the product category breakdown.
    #[arg(long, value_name = "LOCATION")]
    pub focus_location: Option<String>,

    /// Show every transaction of this customer.
    #[arg(long, value_name = "ID")]
    pub customer: Option<String>,

    /// Include the filtered rows in the output.
    #[arg(long)]
    pub show_rows: bool,

    /// Print the distinct customer ids, one per line, instead of the report.
    #[arg(long)]
    pub list_customers: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl Args {
    /// Apply the selection file and flag overrides to `state`, in that order.
    pub fn apply(&self, state: &mut DashboardState) -> Result<()> {
        if let Some(path) = &self.selection {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading selection {}", path.display()))?;
            let selection: FilterSelection = serde_json::from_str(&text)
                .with_context(|| format!("parsing selection {}", path.display()))?;
            state.set_selection(selection)?;
            info!("restored selection from {}", path.display());
        }

        if self.age_min.is_some() || self.age_max.is_some() {
            let current = state.selection().age;
            let range = AgeRange {
                lo: self.age_min.unwrap_or(current.lo),
                hi: self.age_max.unwrap_or(current.hi),
            };
            state.set_age_range(range)?;
        }

        let overrides = [
            (Dimension::Gender, &self.gender),
            (Dimension::Location, &self.location),
            (Dimension::IncomeLevel, &self.income),
            (Dimension::LoyaltyMember, &self.loyalty),
            (Dimension::ProductCategory, &self.category),
        ];
        for (dim, values) in overrides {
            if !values.is_empty() {
                state.set_allowed(dim, values.iter().cloned().collect())?;
            }
        }

        for &dim in &self.clear {
            state.select_none(dim)?;
        }
        Ok(())
    }

    pub fn report_options(&self) -> ReportOptions {
        ReportOptions {
            chart: self.chart,
            focus_location: self.focus_location.clone(),
            customer_id: self.customer.clone(),
            include_rows: self.show_rows,
        }
    }
}

/// Customer ids in first-seen order, newline separated.
pub fn customer_listing(table: &SalesTable) -> String {
    customer_ids(table).join("\n")
}

pub fn run(args: &Args) -> Result<()> {
    let mut cache = TableCache::default();
    let table = cache.get_or_load(&args.file)?;

    if args.list_customers {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", customer_listing(&table)).context("writing customer ids")?;
        return Ok(());
    }

    let mut state = DashboardState::new(table)?;
    args.apply(&mut state)?;

    let report = DashboardReport::build(&state, &args.report_options());
    let rendered = match args.format {
        OutputFormat::Text => report.render_text(),
        OutputFormat::Json => report.to_json().context("serializing report")?,
    };

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{rendered}").context("writing report")?;
    Ok(())
}
