//! Bulk generation of fake company rows.

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate, Utc};
use lightning_core::config::EngineConfig;
use lightning_core::store::sqlite::quote_ident;
use rand::Rng;
use rusqlite::{params, Connection};
use std::io::Write;
use std::time::{Duration, Instant};
use tracing::info;

/// Upper bound on rows per transaction.
const MAX_BATCH: usize = 50_000;

const NAME_PARTS: &[&str] = &[
    "Acme", "Apex", "Blue", "Bright", "Cedar", "Crown", "Delta", "Eagle", "Granite", "Harbor",
    "Iron", "Lantern", "Maple", "Nova", "Oak", "Pioneer", "Quartz", "River", "Summit", "Vertex",
];
const NAME_SUFFIXES: &[&str] = &[
    "Holdings", "Group", "Ltd", "Partners", "Logistics", "Foods", "Systems", "Trading",
];
const STATUSES: &[&str] = &["active", "dissolved", "liquidation"];
const STREETS: &[&str] = &[
    "High Street", "Station Road", "Church Lane", "Victoria Road", "Mill Lane", "Park Avenue",
];
const CITIES: &[(&str, &str)] = &[
    ("London", "Greater London"),
    ("Manchester", "Greater Manchester"),
    ("Leeds", "West Yorkshire"),
    ("Bristol", "South West"),
    ("Glasgow", "Scotland"),
    ("Cardiff", "Wales"),
    ("Belfast", "Northern Ireland"),
];

/// Outcome of a seeding run.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedSummary {
    pub inserted: usize,
    pub elapsed: Duration,
}

impl SeedSummary {
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.inserted as f64 / secs
        } else {
            self.inserted as f64
        }
    }
}

/// Create the companies table if it is missing.
pub fn ensure_table(conn: &Connection, table: &str) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            company_id TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            status TEXT NOT NULL,
            address_line_1 TEXT,
            address_line_2 TEXT,
            city TEXT,
            region TEXT,
            postal_code TEXT,
            country TEXT,
            revenue REAL,
            employees INTEGER,
            incorporated_on TEXT,
            last_filed_on TEXT,
            created_at TEXT,
            updated_at TEXT
        )",
        quote_ident(table)
    ))
    .with_context(|| format!("creating table {}", table))
}

/// Insert `count` generated rows, writing progress lines to `out`.
///
/// Company numbers continue after the highest existing row so repeated
/// runs do not collide on `company_id`.
pub fn seed<W: Write>(
    conn: &mut Connection,
    table: &str,
    count: usize,
    out: &mut W,
) -> Result<SeedSummary> {
    let started = Instant::now();
    ensure_table(conn, table)?;

    let offset: i64 = conn.query_row(
        &format!("SELECT COALESCE(MAX(id), 0) FROM {}", quote_ident(table)),
        [],
        |row| row.get(0),
    )?;

    let batch = (count / 100).clamp(1, MAX_BATCH);
    let sql = format!(
        "INSERT INTO {} (company_id, name, status, address_line_1, address_line_2, city, region,
            postal_code, country, revenue, employees, incorporated_on, last_filed_on,
            created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
        quote_ident(table)
    );

    info!("Seeding {} rows into {} in batches of {}", count, table, batch);
    let mut rng = rand::rng();
    let mut done = 0usize;

    while done < count {
        let upto = (done + batch).min(count);
        let now = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(&sql)?;
            for n in done..upto {
                let company = generate(&mut rng, offset + n as i64 + 1);
                stmt.execute(params![
                    company.company_id,
                    company.name,
                    company.status,
                    company.address_line_1,
                    company.address_line_2,
                    company.city,
                    company.region,
                    company.postal_code,
                    "United Kingdom",
                    company.revenue,
                    company.employees,
                    company.incorporated_on,
                    company.last_filed_on,
                    now,
                ])?;
            }
        }
        tx.commit()?;
        done = upto;

        writeln!(
            out,
            "{} {}% ({}/{})",
            EngineConfig::PROGRESS_MARKER,
            done * 100 / count,
            done,
            count
        )?;
    }

    let summary = SeedSummary {
        inserted: done,
        elapsed: started.elapsed(),
    };
    writeln!(
        out,
        "Seeded {} companies in {} ({:.2} records/sec)",
        summary.inserted,
        format_duration(summary.elapsed),
        summary.rate()
    )?;
    Ok(summary)
}

struct Company {
    company_id: String,
    name: String,
    status: &'static str,
    address_line_1: String,
    address_line_2: String,
    city: &'static str,
    region: &'static str,
    postal_code: String,
    revenue: f64,
    employees: i64,
    incorporated_on: String,
    last_filed_on: String,
}

fn pick<R: Rng, T: Copy>(rng: &mut R, items: &[T]) -> T {
    items[rng.random_range(0..items.len())]
}

fn generate<R: Rng>(rng: &mut R, number: i64) -> Company {
    let (city, region) = pick(rng, CITIES);
    let postal_code = format!(
        "{}{}{} {}{}{}",
        letter(rng),
        letter(rng),
        rng.random_range(1..=20),
        rng.random_range(0..=9),
        letter(rng),
        letter(rng),
    );

    Company {
        company_id: format!("GB{:012}", number),
        name: format!(
            "{} {} {}",
            pick(rng, NAME_PARTS),
            pick(rng, NAME_PARTS),
            pick(rng, NAME_SUFFIXES)
        ),
        status: pick(rng, STATUSES),
        address_line_1: format!("{} {}", rng.random_range(1..=300), pick(rng, STREETS)),
        address_line_2: format!("{} Apt {}", pick(rng, STREETS), rng.random_range(1..=99)),
        city,
        region,
        postal_code,
        revenue: (rng.random_range(100_000.0..50_000_000.0_f64) * 100.0).round() / 100.0,
        employees: rng.random_range(1..=5000),
        incorporated_on: random_date(rng),
        last_filed_on: random_date(rng),
    }
}

fn letter<R: Rng>(rng: &mut R) -> char {
    char::from(b'A' + rng.random_range(0..26u8))
}

fn random_date<R: Rng>(rng: &mut R) -> String {
    let epoch = NaiveDate::from_ymd_opt(1950, 1, 1).unwrap_or_default();
    let date = epoch + Days::new(rng.random_range(0..27_000));
    date.format("%Y-%m-%d").to_string()
}

/// Format as `1h 2m 3s`, `2m 3s` or `3s`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64().round() as u64;
    let (h, m, s) = (secs / 3600, secs % 3600 / 60, secs % 60);
    if h > 0 {
        format!("{}h {}m {}s", h, m, s)
    } else if m > 0 {
        format!("{}m {}s", m, s)
    } else {
        format!("{}s", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_writes_rows_and_progress() {
        let mut conn = Connection::open_in_memory().unwrap();
        let mut out = Vec::new();

        let summary = seed(&mut conn, "companies", 250, &mut out).unwrap();
        assert_eq!(summary.inserted, 250);

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM companies", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 250);

        let first: String = conn
            .query_row("SELECT company_id FROM companies ORDER BY id LIMIT 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(first, "GB000000000001");

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Progress: 0% (2/250)");
        assert!(lines.contains(&"Progress: 100% (250/250)"));
        assert!(lines.last().unwrap().starts_with("Seeded 250 companies in "));
    }

    #[test]
    fn test_reseeding_continues_numbering() {
        let mut conn = Connection::open_in_memory().unwrap();
        seed(&mut conn, "companies", 3, &mut std::io::sink()).unwrap();
        seed(&mut conn, "companies", 2, &mut std::io::sink()).unwrap();

        let last: String = conn
            .query_row("SELECT company_id FROM companies ORDER BY id DESC LIMIT 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(last, "GB000000000005");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(5)), "5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1h 2m 3s");
    }
}
