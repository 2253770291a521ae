/// Data layer: core types, loading, filtering and aggregation.
///
/// Architecture:
/// ```text
///  .xlsx / .csv / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → SalesTable (schema checked)
///   └──────────┘
///        │
///        ▼
///   ┌────────────┐
///   │ SalesTable  │  Vec<Transaction>, distinct values, age domain
///   └────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  apply FilterSelection predicates → filtered SalesTable
///   └──────────┘
///        │
///        ▼
///   ┌───────────┐
///   │ aggregate  │  KPIs, grouped sums
///   └───────────┘
/// ```

pub mod aggregate;
pub mod filter;
pub mod loader;
pub mod model;
