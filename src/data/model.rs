use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DashboardError, Result};

// ---------------------------------------------------------------------------
// Column names of the sales sheet
// ---------------------------------------------------------------------------

pub const CUSTOMER_ID: &str = "CustomerID";
pub const CUSTOMER_AGE: &str = "CustomerAge";
pub const GENDER: &str = "Gender";
pub const LOCATION: &str = "Location";
pub const INCOME_LEVEL: &str = "IncomeLevel";
pub const LOYALTY_MEMBER: &str = "LoyaltyMember";
pub const PRODUCT_CATEGORY: &str = "ProductCategory";
pub const SALES_AMOUNT: &str = "SalesAmount";
pub const NUM_TRANSACTIONS: &str = "NumTransactions";
pub const LOYALTY_POINTS_REDEEMED: &str = "LoyaltyPointsRedeemed";

/// Every column a sales table must carry, in canonical order.
pub const REQUIRED_COLUMNS: [&str; 10] = [
    CUSTOMER_ID,
    CUSTOMER_AGE,
    GENDER,
    LOCATION,
    INCOME_LEVEL,
    LOYALTY_MEMBER,
    PRODUCT_CATEGORY,
    SALES_AMOUNT,
    NUM_TRANSACTIONS,
    LOYALTY_POINTS_REDEEMED,
];

/// Columns holding categorical labels. Their text is kept verbatim on load.
pub const LABEL_COLUMNS: [&str; 6] = [
    CUSTOMER_ID,
    GENDER,
    LOCATION,
    INCOME_LEVEL,
    LOYALTY_MEMBER,
    PRODUCT_CATEGORY,
];

// ---------------------------------------------------------------------------
// CellValue – a single cell as read from a source file
// ---------------------------------------------------------------------------

/// A dynamically-typed cell, the common currency of every file reader.
/// Readers produce these; [`Transaction::from_cells`] turns them into typed fields.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::String(s) => write!(f, "{s}"),
            CellValue::Integer(i) => write!(f, "{i}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Null => write!(f, "<null>"),
        }
    }
}

impl CellValue {
    /// Guess the type of a raw text cell (CSV fields, spreadsheet strings).
    pub fn guess(s: &str) -> CellValue {
        let s = s.trim();
        if s.is_empty() {
            return CellValue::Null;
        }
        if let Ok(i) = s.parse::<i64>() {
            return CellValue::Integer(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            return CellValue::Float(f);
        }
        if s == "true" || s == "false" {
            return CellValue::Bool(s == "true");
        }
        CellValue::String(s.to_string())
    }

    /// A raw text cell taken as-is: `007` stays `007`, only blank is `Null`.
    pub fn text(s: &str) -> CellValue {
        let s = s.trim();
        if s.is_empty() {
            CellValue::Null
        } else {
            CellValue::String(s.to_string())
        }
    }

    /// Interpret the cell as a categorical label.
    ///
    /// Integral floats print without a fractional part so that an id stored as
    /// `1001.0` by a spreadsheet matches one stored as `1001` elsewhere.
    pub fn as_label(&self, column: &str) -> Result<String> {
        match self {
            CellValue::String(s) => Ok(s.clone()),
            CellValue::Integer(i) => Ok(i.to_string()),
            CellValue::Float(v) if v.fract() == 0.0 && v.is_finite() => Ok(format!("{}", *v as i64)),
            CellValue::Float(v) => Ok(v.to_string()),
            CellValue::Bool(b) => Ok(b.to_string()),
            CellValue::Null => Err(DashboardError::schema(column, "missing value")),
        }
    }

    /// Interpret the cell as a finite decimal number.
    pub fn as_f64(&self, column: &str) -> Result<f64> {
        let value = match self {
            CellValue::Float(v) => *v,
            CellValue::Integer(i) => *i as f64,
            CellValue::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| DashboardError::schema(column, format!("`{s}` is not a number")))?,
            CellValue::Null => return Err(DashboardError::schema(column, "missing value")),
            other => {
                return Err(DashboardError::schema(column, format!("`{other}` is not a number")));
            }
        };
        if !value.is_finite() {
            return Err(DashboardError::schema(column, format!("`{value}` is not a finite number")));
        }
        Ok(value)
    }

    /// Interpret the cell as a non-negative whole number.
    pub fn as_u64(&self, column: &str) -> Result<u64> {
        match self {
            CellValue::Integer(i) => u64::try_from(*i)
                .map_err(|_| DashboardError::schema(column, format!("`{i}` is negative"))),
            CellValue::Float(v) if v.fract() == 0.0 && *v >= 0.0 && *v <= u64::MAX as f64 => {
                Ok(*v as u64)
            }
            CellValue::String(s) => s
                .trim()
                .parse::<u64>()
                .map_err(|_| DashboardError::schema(column, format!("`{s}` is not a whole number"))),
            CellValue::Null => Err(DashboardError::schema(column, "missing value")),
            other => Err(DashboardError::schema(
                column,
                format!("`{other}` is not a non-negative whole number"),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Dimension – the categorical columns a selection and a grouping can use
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Gender,
    Location,
    IncomeLevel,
    LoyaltyMember,
    ProductCategory,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::Gender,
        Dimension::Location,
        Dimension::IncomeLevel,
        Dimension::LoyaltyMember,
        Dimension::ProductCategory,
    ];

    /// Header name of the column backing this dimension.
    pub fn column_name(self) -> &'static str {
        match self {
            Dimension::Gender => GENDER,
            Dimension::Location => LOCATION,
            Dimension::IncomeLevel => INCOME_LEVEL,
            Dimension::LoyaltyMember => LOYALTY_MEMBER,
            Dimension::ProductCategory => PRODUCT_CATEGORY,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

impl FromStr for Dimension {
    type Err = DashboardError;

    /// Accepts the column header (case-insensitive) or a short alias
    /// (`income`, `loyalty`, `category`).
    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase();
        let dim = match key.as_str() {
            "gender" => Dimension::Gender,
            "location" => Dimension::Location,
            "incomelevel" | "income" => Dimension::IncomeLevel,
            "loyaltymember" | "loyalty" => Dimension::LoyaltyMember,
            "productcategory" | "category" => Dimension::ProductCategory,
            "customerage" | "salesamount" | "numtransactions" | "loyaltypointsredeemed" => {
                return Err(DashboardError::schema(
                    s.trim(),
                    "numeric column cannot be used as a categorical dimension",
                ));
            }
            "customerid" => {
                return Err(DashboardError::schema(
                    s.trim(),
                    "identifier column cannot be used as a categorical dimension",
                ));
            }
            _ => return Err(DashboardError::schema(s.trim(), "no such column")),
        };
        Ok(dim)
    }
}

// ---------------------------------------------------------------------------
// Transaction – one row of the sales sheet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "CustomerID")]
    pub customer_id: String,
    #[serde(rename = "CustomerAge")]
    pub customer_age: u32,
    #[serde(rename = "Gender")]
    pub gender: String,
    #[serde(rename = "Location")]
    pub location: String,
    #[serde(rename = "IncomeLevel")]
    pub income_level: String,
    #[serde(rename = "LoyaltyMember")]
    pub loyalty_member: String,
    #[serde(rename = "ProductCategory")]
    pub product_category: String,
    #[serde(rename = "SalesAmount")]
    pub sales_amount: f64,
    #[serde(rename = "NumTransactions")]
    pub num_transactions: u64,
    #[serde(rename = "LoyaltyPointsRedeemed")]
    pub loyalty_points_redeemed: u64,
}

impl Transaction {
    /// Value of a categorical dimension for this row.
    pub fn value(&self, dim: Dimension) -> &str {
        match dim {
            Dimension::Gender => &self.gender,
            Dimension::Location => &self.location,
            Dimension::IncomeLevel => &self.income_level,
            Dimension::LoyaltyMember => &self.loyalty_member,
            Dimension::ProductCategory => &self.product_category,
        }
    }

    /// Build a row from reader cells, using `columns` to find each field.
    /// Cells past the end of `cells` count as missing.
    pub fn from_cells(columns: &ColumnMap, cells: &[CellValue]) -> Result<Self> {
        let cell = |name: &str| cell_at(columns, cells, name);

        let age = cell(CUSTOMER_AGE).as_u64(CUSTOMER_AGE)?;
        let customer_age = u32::try_from(age)
            .map_err(|_| DashboardError::schema(CUSTOMER_AGE, format!("`{age}` is out of range")))?;

        Ok(Transaction {
            customer_id: cell(CUSTOMER_ID).as_label(CUSTOMER_ID)?,
            customer_age,
            gender: cell(GENDER).as_label(GENDER)?,
            location: cell(LOCATION).as_label(LOCATION)?,
            income_level: cell(INCOME_LEVEL).as_label(INCOME_LEVEL)?,
            loyalty_member: cell(LOYALTY_MEMBER).as_label(LOYALTY_MEMBER)?,
            product_category: cell(PRODUCT_CATEGORY).as_label(PRODUCT_CATEGORY)?,
            sales_amount: cell(SALES_AMOUNT).as_f64(SALES_AMOUNT)?,
            num_transactions: cell(NUM_TRANSACTIONS).as_u64(NUM_TRANSACTIONS)?,
            loyalty_points_redeemed: cell(LOYALTY_POINTS_REDEEMED).as_u64(LOYALTY_POINTS_REDEEMED)?,
        })
    }
}

fn cell_at<'a>(columns: &ColumnMap, cells: &'a [CellValue], name: &str) -> &'a CellValue {
    static NULL: CellValue = CellValue::Null;
    columns
        .index_of(name)
        .and_then(|i| cells.get(i))
        .unwrap_or(&NULL)
}

// ---------------------------------------------------------------------------
// ColumnMap – where each required column sits in a source file
// ---------------------------------------------------------------------------

/// Positions of the required columns within a reader's header row.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    positions: BTreeMap<&'static str, usize>,
}

impl ColumnMap {
    /// Locate every required column in `headers` (exact, whitespace-trimmed match).
    /// Extra columns are ignored; the first missing column is a schema violation.
    pub fn from_headers<S: AsRef<str>>(headers: &[S]) -> Result<Self> {
        let mut positions = BTreeMap::new();
        for name in REQUIRED_COLUMNS {
            let idx = headers
                .iter()
                .position(|h| h.as_ref().trim() == name)
                .ok_or_else(|| DashboardError::schema(name, "required column is absent"))?;
            positions.insert(name, idx);
        }
        Ok(ColumnMap { positions })
    }

    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.positions.get(column).copied()
    }

    /// Whether header position `idx` is one of the [`LABEL_COLUMNS`].
    pub fn is_label_position(&self, idx: usize) -> bool {
        LABEL_COLUMNS
            .iter()
            .any(|name| self.index_of(name) == Some(idx))
    }
}

// ---------------------------------------------------------------------------
// SalesTable – the complete loaded dataset
// ---------------------------------------------------------------------------

/// An ordered, read-only set of transactions with pre-computed column indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SalesTable {
    rows: Vec<Transaction>,
    /// For each dimension the sorted set of values present in `rows`.
    distinct: BTreeMap<Dimension, BTreeSet<String>>,
    /// Inclusive `(min, max)` of `customer_age`; `None` when empty.
    age_domain: Option<(u32, u32)>,
}

impl SalesTable {
    /// Build column indices from the loaded rows.
    pub fn from_rows(rows: Vec<Transaction>) -> Self {
        let mut distinct: BTreeMap<Dimension, BTreeSet<String>> =
            Dimension::ALL.iter().map(|d| (*d, BTreeSet::new())).collect();
        let mut age_domain: Option<(u32, u32)> = None;

        for row in &rows {
            for dim in Dimension::ALL {
                if let Some(values) = distinct.get_mut(&dim) {
                    if !values.contains(row.value(dim)) {
                        values.insert(row.value(dim).to_string());
                    }
                }
            }
            let age = row.customer_age;
            age_domain = Some(match age_domain {
                Some((lo, hi)) => (lo.min(age), hi.max(age)),
                None => (age, age),
            });
        }

        SalesTable {
            rows,
            distinct,
            age_domain,
        }
    }

    /// New table holding clones of the rows at `indices`, in the given order.
    pub fn select(&self, indices: &[usize]) -> SalesTable {
        SalesTable::from_rows(
            indices
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
        )
    }

    pub fn rows(&self) -> &[Transaction] {
        &self.rows
    }

    /// Sorted distinct values observed for `dim`.
    pub fn distinct_values(&self, dim: Dimension) -> &BTreeSet<String> {
        static EMPTY: BTreeSet<String> = BTreeSet::new();
        self.distinct.get(&dim).unwrap_or(&EMPTY)
    }

    /// Inclusive `(min, max)` customer age, `None` for an empty table.
    pub fn age_domain(&self) -> Option<(u32, u32)> {
        self.age_domain
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn txn(
        id: &str,
        age: u32,
        gender: &str,
        location: &str,
        income: &str,
        loyalty: &str,
        category: &str,
        sales: f64,
        count: u64,
        points: u64,
    ) -> Transaction {
        Transaction {
            customer_id: id.to_string(),
            customer_age: age,
            gender: gender.to_string(),
            location: location.to_string(),
            income_level: income.to_string(),
            loyalty_member: loyalty.to_string(),
            product_category: category.to_string(),
            sales_amount: sales,
            num_transactions: count,
            loyalty_points_redeemed: points,
        }
    }

    /// The three-row table used throughout the engine tests.
    pub(crate) fn sample_table() -> SalesTable {
        SalesTable::from_rows(vec![
            txn("C1", 25, "F", "Dubai", "High", "Yes", "Grocery", 100.0, 2, 10),
            txn("C2", 40, "M", "Abu Dhabi", "Low", "No", "Electronics", 200.0, 3, 40),
            txn("C1", 60, "F", "Dubai", "High", "Yes", "Grocery", 50.0, 1, 5),
        ])
    }

    #[test]
    fn from_rows_indexes_distinct_values_and_age_domain() {
        let table = sample_table();
        assert_eq!(table.len(), 3);
        assert_eq!(table.age_domain(), Some((25, 60)));
        let locations: Vec<_> = table.distinct_values(Dimension::Location).iter().cloned().collect();
        assert_eq!(locations, vec!["Abu Dhabi".to_string(), "Dubai".to_string()]);
        assert_eq!(table.distinct_values(Dimension::Gender).len(), 2);
    }

    #[test]
    fn empty_table_has_no_age_domain() {
        let table = SalesTable::default();
        assert!(table.is_empty());
        assert_eq!(table.age_domain(), None);
        assert!(table.distinct_values(Dimension::Location).is_empty());
    }

    #[test]
    fn select_preserves_requested_order() {
        let table = sample_table();
        let picked = table.select(&[2, 0]);
        assert_eq!(picked.rows()[0].customer_age, 60);
        assert_eq!(picked.rows()[1].customer_age, 25);
    }

    #[test]
    fn dimension_parsing_rejects_numeric_and_unknown_columns() {
        assert_eq!("Location".parse::<Dimension>(), Ok(Dimension::Location));
        assert_eq!("category".parse::<Dimension>(), Ok(Dimension::ProductCategory));
        assert!(matches!(
            "SalesAmount".parse::<Dimension>(),
            Err(DashboardError::SchemaViolation { .. })
        ));
        assert!(matches!(
            "CustomerID".parse::<Dimension>(),
            Err(DashboardError::SchemaViolation { .. })
        ));
        assert!(matches!(
            "Region".parse::<Dimension>(),
            Err(DashboardError::SchemaViolation { .. })
        ));
    }

    #[test]
    fn column_map_reports_first_missing_column() {
        let headers = ["CustomerID", "CustomerAge", "Gender"];
        let err = ColumnMap::from_headers(&headers).unwrap_err();
        assert_eq!(
            err,
            DashboardError::SchemaViolation {
                column: LOCATION.to_string(),
                reason: "required column is absent".to_string(),
            }
        );
    }

    #[test]
    fn from_cells_converts_and_validates() {
        let headers: Vec<&str> = REQUIRED_COLUMNS.to_vec();
        let columns = ColumnMap::from_headers(&headers).unwrap();
        let mut cells = vec![
            CellValue::Float(1001.0),
            CellValue::Integer(33),
            CellValue::String("F".into()),
            CellValue::String("Sharjah".into()),
            CellValue::String("Medium".into()),
            CellValue::String("Yes".into()),
            CellValue::String("Fashion".into()),
            CellValue::Float(12.5),
            CellValue::Integer(4),
            CellValue::Integer(0),
        ];
        let row = Transaction::from_cells(&columns, &cells).unwrap();
        assert_eq!(row.customer_id, "1001");
        assert_eq!(row.customer_age, 33);
        assert_eq!(row.sales_amount, 12.5);

        cells[8] = CellValue::Integer(-1);
        let err = Transaction::from_cells(&columns, &cells).unwrap_err();
        assert!(matches!(err, DashboardError::SchemaViolation { ref column, .. } if column == NUM_TRANSACTIONS));

        cells[8] = CellValue::Integer(4);
        cells[7] = CellValue::Null;
        assert!(Transaction::from_cells(&columns, &cells).is_err());
    }

    #[test]
    fn text_keeps_numeric_looking_labels() {
        assert_eq!(CellValue::text(" 007 "), CellValue::String("007".into()));
        assert_eq!(CellValue::text("1.50"), CellValue::String("1.50".into()));
        assert_eq!(CellValue::text("  "), CellValue::Null);
    }

    #[test]
    fn label_positions_follow_headers() {
        let headers: Vec<&str> = REQUIRED_COLUMNS.to_vec();
        let columns = ColumnMap::from_headers(&headers).unwrap();
        assert!(columns.is_label_position(0));
        assert!(!columns.is_label_position(1));
        assert!(columns.is_label_position(6));
        assert!(!columns.is_label_position(7));
        assert!(!columns.is_label_position(42));
    }

    #[test]
    fn guess_recognises_basic_types() {
        assert_eq!(CellValue::guess(""), CellValue::Null);
        assert_eq!(CellValue::guess("42"), CellValue::Integer(42));
        assert_eq!(CellValue::guess("4.5"), CellValue::Float(4.5));
        assert_eq!(CellValue::guess("true"), CellValue::Bool(true));
        assert_eq!(CellValue::guess("Dubai"), CellValue::String("Dubai".into()));
    }
}
