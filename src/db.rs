use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use rusqlite::{params, Connection};
use serde::Serialize;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS prices (
            id         INTEGER PRIMARY KEY,
            date       TEXT NOT NULL,
            source     TEXT NOT NULL,
            product    TEXT NOT NULL,
            raw_name   TEXT NOT NULL,
            price      INTEGER NOT NULL,
            unit       TEXT NOT NULL DEFAULT 'kg',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(date, source, product, raw_name)
        );
        CREATE INDEX IF NOT EXISTS idx_prices_date ON prices(date);
        CREATE INDEX IF NOT EXISTS idx_prices_product ON prices(product);
        ",
    )?;
    Ok(())
}

// ── Facts ──

/// One dated, source-attributed price for a configured product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceFact {
    pub date: NaiveDate,
    pub source: String,
    pub product: String,
    pub raw_name: String,
    pub price: i64,
    pub unit: String,
}

/// Insert one fact. A repeat of `(date, source, product, raw_name)` is ignored;
/// returns whether a row was written.
pub fn save_price(conn: &Connection, fact: &PriceFact) -> Result<bool> {
    let n = conn
        .prepare_cached(
            "INSERT OR IGNORE INTO prices (date, source, product, raw_name, price, unit)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?
        .execute(params![fact.date, fact.source, fact.product, fact.raw_name, fact.price, fact.unit])?;
    Ok(n > 0)
}

pub fn save_prices(conn: &Connection, facts: &[PriceFact]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    for f in facts {
        if save_price(&tx, f)? {
            count += 1;
        }
    }
    tx.commit()?;
    Ok(count)
}

/// Facts for one day, ordered by product then ascending price.
pub fn prices_for_date(
    conn: &Connection,
    date: NaiveDate,
    product: Option<&str>,
) -> Result<Vec<PriceFact>> {
    let mut stmt = conn.prepare(
        "SELECT date, source, product, raw_name, price, unit
         FROM prices
         WHERE date = ?1 AND (?2 IS NULL OR product = ?2)
         ORDER BY product, price ASC, source",
    )?;
    let rows = stmt
        .query_map(params![date, product], |row| {
            Ok(PriceFact {
                date: row.get(0)?,
                source: row.get(1)?,
                product: row.get(2)?,
                raw_name: row.get(3)?,
                price: row.get(4)?,
                unit: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Most recent price strictly before `today` for a (source, product) pair.
/// Several listings on that day resolve to the lowest, like the report does.
pub fn previous_price(
    conn: &Connection,
    source: &str,
    product: &str,
    today: NaiveDate,
) -> Result<Option<i64>> {
    let price = conn.query_row(
        "SELECT MIN(price) FROM prices
         WHERE source = ?1 AND product = ?2
           AND date = (SELECT MAX(date) FROM prices
                       WHERE source = ?1 AND product = ?2 AND date < ?3)",
        params![source, product, today],
        |r| r.get::<_, Option<i64>>(0),
    )?;
    Ok(price)
}

// ── Trend ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    InsufficientData,
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSummary {
    pub classification: TrendDirection,
    pub change_percent: f64,
    pub first_price: Option<i64>,
    pub last_price: Option<i64>,
}

const STABLE_BAND_PERCENT: f64 = 2.0;

impl TrendSummary {
    fn insufficient() -> Self {
        TrendSummary {
            classification: TrendDirection::InsufficientData,
            change_percent: 0.0,
            first_price: None,
            last_price: None,
        }
    }

    /// Classify a series of per-day averages, oldest first.
    pub fn from_daily_averages(averages: &[f64]) -> Self {
        let (Some(&first), Some(&last)) = (averages.first(), averages.last()) else {
            return Self::insufficient();
        };
        if averages.len() < 2 || first == 0.0 {
            return Self::insufficient();
        }

        let change = (last - first) / first * 100.0;
        let classification = if change > STABLE_BAND_PERCENT {
            TrendDirection::Up
        } else if change < -STABLE_BAND_PERCENT {
            TrendDirection::Down
        } else {
            TrendDirection::Stable
        };

        TrendSummary {
            classification,
            change_percent: round1(change),
            first_price: Some(first as i64),
            last_price: Some(last as i64),
        }
    }
}

pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// `today - days`, clamped to the earliest representable date.
pub fn days_before(today: NaiveDate, days: u32) -> NaiveDate {
    today
        .checked_sub_signed(Duration::days(i64::from(days)))
        .unwrap_or(NaiveDate::MIN)
}

/// Average price per day over `[today - window_days, today]`, then compare the
/// earliest day with the latest.
pub fn trend(
    conn: &Connection,
    product: &str,
    window_days: u32,
    today: NaiveDate,
) -> Result<TrendSummary> {
    let start = days_before(today, window_days);
    let mut stmt = conn.prepare(
        "SELECT AVG(price) FROM prices
         WHERE product = ?1 AND date BETWEEN ?2 AND ?3
         GROUP BY date
         ORDER BY date ASC",
    )?;
    let averages = stmt
        .query_map(params![product, start, today], |r| r.get::<_, f64>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(TrendSummary::from_daily_averages(&averages))
}

// ── Analytics feed ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedScope {
    Today,
    LastDays(u32),
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedRow {
    pub date: NaiveDate,
    pub source: String,
    pub product: String,
    pub raw_name: String,
    pub price: i64,
    pub unit: String,
}

pub fn fetch_feed(conn: &Connection, scope: FeedScope, today: NaiveDate) -> Result<Vec<FeedRow>> {
    let (since, until) = match scope {
        FeedScope::Today => (Some(today), Some(today)),
        FeedScope::LastDays(n) => (Some(days_before(today, n)), None),
        FeedScope::All => (None, None),
    };

    let mut stmt = conn.prepare(
        "SELECT date, source, product,
                COALESCE(NULLIF(raw_name, ''), product),
                price,
                COALESCE(NULLIF(unit, ''), 'kg')
         FROM prices
         WHERE (?1 IS NULL OR date >= ?1) AND (?2 IS NULL OR date <= ?2)
         ORDER BY date DESC, source, product",
    )?;
    let rows = stmt
        .query_map(params![since, until], |row| {
            Ok(FeedRow {
                date: row.get(0)?,
                source: row.get(1)?,
                product: row.get(2)?,
                raw_name: row.get(3)?,
                price: row.get(4)?,
                unit: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub rows: usize,
    pub days: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub per_source: Vec<(String, usize)>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let rows: usize = conn.query_row("SELECT COUNT(*) FROM prices", [], |r| r.get(0))?;
    let days: usize = conn.query_row("SELECT COUNT(DISTINCT date) FROM prices", [], |r| r.get(0))?;
    let (first_date, last_date): (Option<NaiveDate>, Option<NaiveDate>) = conn.query_row(
        "SELECT MIN(date), MAX(date) FROM prices",
        [],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    let mut stmt =
        conn.prepare("SELECT source, COUNT(*) FROM prices GROUP BY source ORDER BY source")?;
    let per_source: Vec<(String, usize)> = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Stats {
        rows,
        days,
        first_date,
        last_date,
        per_source,
    })
}
