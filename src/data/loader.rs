use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{DataType, Float32Type, Float64Type, Int32Type, Int64Type, UInt32Type, UInt64Type};
use calamine::{Data, Reader, open_workbook_auto};
use log::{debug, info};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{CellValue, ColumnMap, REQUIRED_COLUMNS, SalesTable, Transaction};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a sales table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.xlsx` / `.xlsm` / `.xls` – first worksheet, header in the first row
/// * `.csv`     – header row with the sales column names
/// * `.json`    – `[{ "CustomerID": ..., "CustomerAge": ..., ... }, ...]`
/// * `.parquet` – one column per field, names as in the header row
///
/// Every format must carry all required columns; anything extra is ignored.
pub fn load_file(path: &Path) -> Result<SalesTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let table = match ext.as_str() {
        "xlsx" | "xlsm" | "xls" => load_spreadsheet(path),
        "csv" => load_csv(path),
        "json" => load_json(path),
        "parquet" | "pq" => load_parquet(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
    .with_context(|| format!("loading {}", path.display()))?;

    info!("loaded {} transactions from {}", table.len(), path.display());
    Ok(table)
}

/// Convert one row of cells, tagging failures with the 1-based data row number.
fn build_row(columns: &ColumnMap, cells: &[CellValue], row_no: usize) -> Result<Transaction> {
    Transaction::from_cells(columns, cells).with_context(|| format!("data row {}", row_no + 1))
}

// ---------------------------------------------------------------------------
// Load-once cache
// ---------------------------------------------------------------------------

/// Host-owned memoization of loaded tables, keyed by path.
///
/// The first `get_or_load` for a path reads the file; later calls hand back
/// the same shared table without touching the disk.
#[derive(Debug, Default)]
pub struct TableCache {
    tables: HashMap<PathBuf, Arc<SalesTable>>,
}

impl TableCache {
    pub fn get_or_load(&mut self, path: &Path) -> Result<Arc<SalesTable>> {
        if let Some(table) = self.tables.get(path) {
            debug!("table cache hit for {}", path.display());
            return Ok(Arc::clone(table));
        }
        let table = Arc::new(load_file(path)?);
        self.tables.insert(path.to_path_buf(), Arc::clone(&table));
        Ok(table)
    }

    /// Forget the cached table for `path`. Returns whether one was cached.
    pub fn invalidate(&mut self, path: &Path) -> bool {
        self.tables.remove(path).is_some()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Spreadsheet loader
// ---------------------------------------------------------------------------

/// Reads the first worksheet. The first non-empty row is the header row.
fn load_spreadsheet(path: &Path) -> Result<SalesTable> {
    let mut workbook = open_workbook_auto(path).context("opening workbook")?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .context("workbook has no worksheets")?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .with_context(|| format!("reading worksheet `{sheet_name}`"))?;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok(SalesTable::default());
    };
    let headers: Vec<String> = header_row.iter().map(|c| c.to_string()).collect();
    let columns = ColumnMap::from_headers(&headers)?;

    let mut transactions = Vec::new();
    for (row_no, row) in rows.enumerate() {
        if row.iter().all(|c| matches!(c, Data::Empty)) {
            continue;
        }
        let cells: Vec<CellValue> = row.iter().map(spreadsheet_to_cell).collect();
        transactions.push(build_row(&columns, &cells, row_no)?);
    }

    Ok(SalesTable::from_rows(transactions))
}

fn spreadsheet_to_cell(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Null,
        Data::Bool(b) => CellValue::Bool(*b),
        Data::Int(i) => CellValue::Integer(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::String(s) => CellValue::String(s.trim().to_string()),
        Data::DateTime(dt) => CellValue::Float(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::String(s.clone()),
        Data::Error(e) => CellValue::String(e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names, one transaction per record.
/// Label columns keep their text verbatim; other field types are guessed per
/// cell and checked against the column's kind.
fn load_csv(path: &Path) -> Result<SalesTable> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();
    let columns = ColumnMap::from_headers(&headers)?;

    let mut transactions = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let cells: Vec<CellValue> = record
            .iter()
            .enumerate()
            .map(|(idx, field)| {
                if columns.is_label_position(idx) {
                    CellValue::text(field)
                } else {
                    CellValue::guess(field)
                }
            })
            .collect();
        transactions.push(build_row(&columns, &cells, row_no)?);
    }

    Ok(SalesTable::from_rows(transactions))
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, the default `df.to_json(orient='records')`):
///
/// ```json
/// [
///   {
///     "CustomerID": "C0001",
///     "CustomerAge": 34,
///     "Gender": "F",
///     "Location": "Dubai",
///     ...
///   },
///   ...
/// ]
/// ```
fn load_json(path: &Path) -> Result<SalesTable> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root.as_array().context("Expected top-level JSON array")?;

    let headers: Vec<String> = REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect();
    let columns = ColumnMap::from_headers(&headers)?;

    let mut transactions = Vec::with_capacity(records.len());
    for (row_no, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {row_no} is not a JSON object"))?;

        // A key missing from the record is a missing column, not a missing value.
        ColumnMap::from_headers(&obj.keys().collect::<Vec<_>>())
            .with_context(|| format!("data row {}", row_no + 1))?;

        let cells: Vec<CellValue> = headers
            .iter()
            .map(|h| obj.get(h).map(json_to_cell).unwrap_or(CellValue::Null))
            .collect();
        transactions.push(build_row(&columns, &cells, row_no)?);
    }

    Ok(SalesTable::from_rows(transactions))
}

fn json_to_cell(val: &JsonValue) -> CellValue {
    match val {
        JsonValue::String(s) => CellValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                CellValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                CellValue::Float(f)
            } else {
                CellValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => CellValue::Bool(*b),
        JsonValue::Null => CellValue::Null,
        other => CellValue::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file of transactions.
///
/// Categorical columns may be Utf8 / LargeUtf8 (or integers for ids);
/// numeric columns may be any of Int32 / Int64 / UInt32 / UInt64 / Float32 / Float64.
///
/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`).
fn load_parquet(path: &Path) -> Result<SalesTable> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut transactions = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();
        let names: Vec<&String> = schema.fields().iter().map(|f| f.name()).collect();
        let columns = ColumnMap::from_headers(&names)?;

        let wanted: Vec<usize> = REQUIRED_COLUMNS
            .iter()
            .filter_map(|name| columns.index_of(name))
            .collect();

        for row in 0..batch.num_rows() {
            let mut cells = vec![CellValue::Null; batch.num_columns()];
            for &col_idx in &wanted {
                cells[col_idx] = extract_cell(batch.column(col_idx), row).with_context(|| {
                    format!("Row {row}: failed to read '{}'", names[col_idx])
                })?;
            }
            let row_no = transactions.len();
            transactions.push(build_row(&columns, &cells, row_no)?);
        }
    }

    Ok(SalesTable::from_rows(transactions))
}

// -- Parquet / Arrow helpers --

/// Extract a single cell from an Arrow column at a given row.
fn extract_cell(col: &ArrayRef, row: usize) -> Result<CellValue> {
    if col.is_null(row) {
        return Ok(CellValue::Null);
    }
    let cell = match col.data_type() {
        DataType::Utf8 => {
            let arr = col.as_string_opt::<i32>().context("expected StringArray")?;
            CellValue::String(arr.value(row).to_string())
        }
        DataType::LargeUtf8 => {
            let arr = col.as_string_opt::<i64>().context("expected LargeStringArray")?;
            CellValue::String(arr.value(row).to_string())
        }
        DataType::Int32 => {
            let arr = col.as_primitive_opt::<Int32Type>().context("expected Int32Array")?;
            CellValue::Integer(arr.value(row) as i64)
        }
        DataType::Int64 => {
            let arr = col.as_primitive_opt::<Int64Type>().context("expected Int64Array")?;
            CellValue::Integer(arr.value(row))
        }
        DataType::UInt32 => {
            let arr = col.as_primitive_opt::<UInt32Type>().context("expected UInt32Array")?;
            CellValue::Integer(arr.value(row) as i64)
        }
        DataType::UInt64 => {
            let arr = col.as_primitive_opt::<UInt64Type>().context("expected UInt64Array")?;
            let v = arr.value(row);
            CellValue::Integer(i64::try_from(v).with_context(|| format!("{v} overflows i64"))?)
        }
        DataType::Float32 => {
            let arr = col.as_primitive_opt::<Float32Type>().context("expected Float32Array")?;
            CellValue::Float(arr.value(row) as f64)
        }
        DataType::Float64 => {
            let arr = col.as_primitive_opt::<Float64Type>().context("expected Float64Array")?;
            CellValue::Float(arr.value(row))
        }
        DataType::Boolean => {
            let arr = col.as_boolean_opt().context("expected BooleanArray")?;
            CellValue::Bool(arr.value(row))
        }
        other => bail!("unsupported column type {other:?}"),
    };
    Ok(cell)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::error::DashboardError;

    const HEADER: &str = "CustomerID,CustomerAge,Gender,Location,IncomeLevel,LoyaltyMember,ProductCategory,SalesAmount,NumTransactions,LoyaltyPointsRedeemed";

    fn write_temp(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn loads_csv_with_extra_columns() {
        let csv = format!(
            "{HEADER},AdSpend\n\
             C001,25,F,Dubai,High,Yes,Grocery,100.50,2,10,7\n\
             1002,40,M,Abu Dhabi,Low,No,Electronics,200,3,40,9\n"
        );
        let file = write_temp(".csv", &csv);
        let table = load_file(file.path()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].sales_amount, 100.5);
        assert_eq!(table.rows()[1].customer_id, "1002");
        assert_eq!(table.rows()[1].location, "Abu Dhabi");
        assert_eq!(table.age_domain(), Some((25, 40)));
    }

    #[test]
    fn csv_labels_that_look_numeric_are_kept_verbatim() {
        let csv = format!(
            "{HEADER}\n\
             007,30,F,Dubai,High,Yes,Grocery,10,1,0\n\
             7,31,M,Dubai,Low,No,1.50,20,1,0\n"
        );
        let file = write_temp(".csv", &csv);
        let table = load_file(file.path()).unwrap();
        let ids: Vec<&str> = table.rows().iter().map(|r| r.customer_id.as_str()).collect();
        assert_eq!(ids, vec!["007", "7"]);
        assert_eq!(table.rows()[1].product_category, "1.50");
        assert_eq!(crate::data::aggregate::customer_rows(&table, "007").len(), 1);
    }

    #[test]
    fn missing_column_is_a_schema_violation() {
        let file = write_temp(".csv", "CustomerID,CustomerAge\nC1,30\n");
        let err = load_file(file.path()).unwrap_err();
        let violation = err.downcast_ref::<DashboardError>().unwrap();
        assert!(matches!(
            violation,
            DashboardError::SchemaViolation { column, .. } if column == "Gender"
        ));
    }

    #[test]
    fn non_numeric_amount_is_a_schema_violation() {
        let csv = format!("{HEADER}\nC1,30,F,Dubai,High,Yes,Grocery,lots,1,0\n");
        let file = write_temp(".csv", &csv);
        let err = load_file(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("data row 1"));
        assert!(matches!(
            err.downcast_ref::<DashboardError>(),
            Some(DashboardError::SchemaViolation { column, .. }) if column == "SalesAmount"
        ));
    }

    #[test]
    fn loads_json_records() {
        let json = r#"[
            {"CustomerID": 7, "CustomerAge": 33, "Gender": "M", "Location": "Sharjah",
             "IncomeLevel": "Medium", "LoyaltyMember": "No", "ProductCategory": "Home",
             "SalesAmount": 42.25, "NumTransactions": 1, "LoyaltyPointsRedeemed": 0}
        ]"#;
        let file = write_temp(".json", json);
        let table = load_file(file.path()).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].customer_id, "7");
        assert_eq!(table.rows()[0].product_category, "Home");
    }

    #[test]
    fn json_record_missing_key_is_rejected() {
        let json = r#"[{"CustomerID": 7, "CustomerAge": 33}]"#;
        let file = write_temp(".json", json);
        let err = load_file(file.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DashboardError>(),
            Some(DashboardError::SchemaViolation { .. })
        ));
    }

    #[test]
    fn unsupported_extension_fails() {
        let file = write_temp(".txt", "hello");
        assert!(load_file(file.path()).is_err());
    }

    #[test]
    fn loads_parquet() {
        use arrow::array::{Float64Array, Int64Array, StringArray};
        use arrow::datatypes::{Field, Schema};
        use arrow::record_batch::RecordBatch;
        use parquet::arrow::ArrowWriter;

        let text = |v: &[&str]| Arc::new(StringArray::from(v.to_vec())) as ArrayRef;
        let int = |v: &[i64]| Arc::new(Int64Array::from(v.to_vec())) as ArrayRef;

        let mut fields = Vec::new();
        let mut arrays = Vec::new();
        for name in REQUIRED_COLUMNS {
            let (dtype, array) = match name {
                "CustomerAge" => (DataType::Int64, int(&[30, 45])),
                "NumTransactions" => (DataType::Int64, int(&[2, 5])),
                "LoyaltyPointsRedeemed" => (DataType::Int64, int(&[0, 120])),
                "SalesAmount" => (
                    DataType::Float64,
                    Arc::new(Float64Array::from(vec![10.0, 32.5])) as ArrayRef,
                ),
                "CustomerID" => (DataType::Utf8, text(&["C1", "C2"])),
                "Location" => (DataType::Utf8, text(&["Dubai", "Ajman"])),
                _ => (DataType::Utf8, text(&["x", "y"])),
            };
            fields.push(Field::new(name, dtype, false));
            arrays.push(array);
        }
        let schema = Arc::new(Schema::new(fields));
        let batch = RecordBatch::try_new(schema.clone(), arrays).unwrap();

        let file = tempfile::Builder::new().suffix(".parquet").tempfile().unwrap();
        let mut writer = ArrowWriter::try_new(file.reopen().unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let table = load_file(file.path()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[1].location, "Ajman");
        assert_eq!(table.rows()[1].loyalty_points_redeemed, 120);
        assert_eq!(table.rows()[1].sales_amount, 32.5);
    }

    #[test]
    fn loads_first_worksheet_skipping_blank_rows() {
        use rust_xlsxwriter::Workbook;

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "AdSpend").unwrap();
        for (col, name) in REQUIRED_COLUMNS.iter().enumerate() {
            sheet.write_string(0, col as u16 + 1, *name).unwrap();
        }

        // Row 1: numeric customer id, as Excel stores it.
        sheet.write_number(1, 0, 12.0).unwrap();
        sheet.write_number(1, 1, 1001.0).unwrap();
        sheet.write_number(1, 2, 25.0).unwrap();
        for (col, value) in [(3, "F"), (4, "Dubai"), (5, "High"), (6, "Yes"), (7, "Grocery")] {
            sheet.write_string(1, col, value).unwrap();
        }
        sheet.write_number(1, 8, 100.5).unwrap();
        sheet.write_number(1, 9, 2.0).unwrap();
        sheet.write_number(1, 10, 15.0).unwrap();

        // Row 2 stays blank; row 3 carries a text id.
        sheet.write_string(3, 1, "C2").unwrap();
        sheet.write_number(3, 2, 41.0).unwrap();
        for (col, value) in [(3, "M"), (4, "Al Ain"), (5, "Low"), (6, "No"), (7, "Home")] {
            sheet.write_string(3, col, value).unwrap();
        }
        sheet.write_number(3, 8, 20.0).unwrap();
        sheet.write_number(3, 9, 1.0).unwrap();
        sheet.write_number(3, 10, 0.0).unwrap();

        let file = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
        workbook.save(file.path()).unwrap();

        let table = load_file(file.path()).unwrap();
        assert_eq!(table.len(), 2);
        let first = &table.rows()[0];
        assert_eq!(first.customer_id, "1001");
        assert_eq!(first.customer_age, 25);
        assert_eq!(first.sales_amount, 100.5);
        assert_eq!(first.loyalty_points_redeemed, 15);
        assert_eq!(table.rows()[1].customer_id, "C2");
        assert_eq!(table.rows()[1].location, "Al Ain");
    }

    #[test]
    fn workbook_missing_column_is_a_schema_violation() {
        use rust_xlsxwriter::Workbook;

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "CustomerID").unwrap();
        sheet.write_string(1, 0, "C1").unwrap();
        let file = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
        workbook.save(file.path()).unwrap();

        let err = load_file(file.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DashboardError>(),
            Some(DashboardError::SchemaViolation { column, .. }) if column == "CustomerAge"
        ));
    }

    #[test]
    fn cache_loads_once_and_can_be_invalidated() {
        let csv = format!("{HEADER}\nC1,30,F,Dubai,High,Yes,Grocery,1,1,0\n");
        let file = write_temp(".csv", &csv);

        let mut cache = TableCache::default();
        let first = cache.get_or_load(file.path()).unwrap();
        let second = cache.get_or_load(file.path()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        assert!(cache.invalidate(file.path()));
        assert!(cache.is_empty());
        let third = cache.get_or_load(file.path()).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(*first, *third);
    }
}
