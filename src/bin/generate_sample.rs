use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{ArrayRef, Float64Array, StringArray, UInt32Array, UInt64Array};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use clap::Parser;
use log::info;
use parquet::arrow::ArrowWriter;
use rusty_sales::data::model::{REQUIRED_COLUMNS, Transaction};

const GENDERS: [&str; 2] = ["F", "M"];
const LOCATIONS: [&str; 5] = ["Dubai", "Abu Dhabi", "Sharjah", "Ajman", "Al Ain"];
const INCOME_LEVELS: [&str; 3] = ["Low", "Medium", "High"];
const CATEGORIES: [&str; 5] = ["Grocery", "Electronics", "Fashion", "Home", "Beauty"];

/// Write a deterministic synthetic sales dataset.
#[derive(Debug, Parser)]
#[command(name = "generate_sample", about)]
struct Args {
    /// Output file; `.csv` writes CSV, anything else Parquet.
    #[arg(long, default_value = "sample_sales.parquet")]
    output: PathBuf,

    /// Number of transactions.
    #[arg(long, default_value_t = 2000)]
    rows: usize,

    /// Number of distinct customers.
    #[arg(long, default_value_t = 300)]
    customers: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform integer in `[lo, hi]`.
    fn range(&mut self, lo: u64, hi: u64) -> u64 {
        lo + self.next_u64() % (hi - lo + 1)
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[(self.next_u64() % items.len() as u64) as usize]
    }
}

/// Fixed per-customer attributes; transactions vary category and amounts.
struct Customer {
    id: String,
    age: u32,
    gender: &'static str,
    location: &'static str,
    income: &'static str,
    loyalty: &'static str,
}

fn generate(args: &Args) -> Vec<Transaction> {
    let mut rng = SimpleRng::new(args.seed);

    let customers: Vec<Customer> = (0..args.customers)
        .map(|i| Customer {
            id: format!("C{:05}", i + 1),
            age: rng.range(18, 70) as u32,
            gender: rng.pick(&GENDERS),
            location: rng.pick(&LOCATIONS),
            income: rng.pick(&INCOME_LEVELS),
            loyalty: if rng.next_f64() < 0.4 { "Yes" } else { "No" },
        })
        .collect();

    (0..args.rows)
        .map(|_| {
            let customer = &customers[(rng.next_u64() % customers.len() as u64) as usize];
            let income_factor = match customer.income {
                "High" => 2.5,
                "Medium" => 1.5,
                _ => 1.0,
            };
            let amount = (20.0 + rng.next_f64() * 480.0) * income_factor;
            let points = if customer.loyalty == "Yes" { rng.range(0, 500) } else { 0 };
            Transaction {
                customer_id: customer.id.clone(),
                customer_age: customer.age,
                gender: customer.gender.to_string(),
                location: customer.location.to_string(),
                income_level: customer.income.to_string(),
                loyalty_member: customer.loyalty.to_string(),
                product_category: rng.pick(&CATEGORIES).to_string(),
                sales_amount: (amount * 100.0).round() / 100.0,
                num_transactions: rng.range(1, 10),
                loyalty_points_redeemed: points,
            }
        })
        .collect()
}

fn write_csv(path: &Path, rows: &[Transaction]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("creating CSV file")?;
    for row in rows {
        writer.serialize(row).context("writing CSV row")?;
    }
    writer.flush().context("flushing CSV file")?;
    Ok(())
}

fn write_parquet(path: &Path, rows: &[Transaction]) -> Result<()> {
    let text = |f: fn(&Transaction) -> &str| -> ArrayRef {
        Arc::new(StringArray::from(rows.iter().map(f).collect::<Vec<_>>()))
    };

    let arrays: Vec<ArrayRef> = vec![
        text(|r| r.customer_id.as_str()),
        Arc::new(UInt32Array::from(rows.iter().map(|r| r.customer_age).collect::<Vec<_>>())),
        text(|r| r.gender.as_str()),
        text(|r| r.location.as_str()),
        text(|r| r.income_level.as_str()),
        text(|r| r.loyalty_member.as_str()),
        text(|r| r.product_category.as_str()),
        Arc::new(Float64Array::from(rows.iter().map(|r| r.sales_amount).collect::<Vec<_>>())),
        Arc::new(UInt64Array::from(rows.iter().map(|r| r.num_transactions).collect::<Vec<_>>())),
        Arc::new(UInt64Array::from(
            rows.iter().map(|r| r.loyalty_points_redeemed).collect::<Vec<_>>(),
        )),
    ];

    let fields: Vec<Field> = REQUIRED_COLUMNS
        .iter()
        .zip(&arrays)
        .map(|(name, array)| Field::new(*name, array.data_type().clone(), false))
        .collect();
    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays).context("building record batch")?;

    let file = std::fs::File::create(path).context("creating output file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    if args.customers == 0 {
        bail!("--customers must be at least 1");
    }

    let rows = generate(&args);
    let is_csv = args
        .output
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));

    if is_csv {
        write_csv(&args.output, &rows)?;
    } else {
        write_parquet(&args.output, &rows)?;
    }

    info!("generated {} rows with seed {}", rows.len(), args.seed);
    println!("Wrote {} transactions to {}", rows.len(), args.output.display());
    Ok(())
}
