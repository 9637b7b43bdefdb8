use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;

use crate::config::ProductConfig;
use crate::db::{self, round1, PriceFact, TrendSummary};

/// Everything the renderer needs for one day.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub date: NaiveDate,
    pub products: Vec<ProductSummary>,
    pub alerts: Vec<AlertEvent>,
    pub trends: BTreeMap<String, TrendSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductSummary {
    pub name: String,
    pub median: i64,
    /// One price per source, ascending.
    pub prices: Vec<SourcePrice>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourcePrice {
    pub source: String,
    pub price: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    pub product: String,
    pub source: String,
    pub change_percent: f64,
    pub previous_price: i64,
    pub current_price: i64,
}

impl Report {
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

/// Build the day's report. Products without prices on `today` are left out.
pub fn build_report(
    conn: &Connection,
    products: &[ProductConfig],
    threshold_percent: f64,
    window_days: u32,
    today: NaiveDate,
) -> Result<Report> {
    let mut summaries = Vec::new();
    let mut alerts = Vec::new();
    let mut trends = BTreeMap::new();

    for product in products {
        let facts = db::prices_for_date(conn, today, Some(&product.name))?;
        if facts.is_empty() {
            continue;
        }

        let prices = lowest_per_source(&facts);
        let values: Vec<i64> = prices.iter().map(|p| p.price).collect();
        let Some(median) = median(&values) else {
            continue;
        };

        for p in &prices {
            let Some(previous) = db::previous_price(conn, &p.source, &product.name, today)? else {
                continue;
            };
            if let Some(alert) = check_alert(&product.name, p, previous, threshold_percent) {
                alerts.push(alert);
            }
        }

        trends.insert(
            product.name.clone(),
            db::trend(conn, &product.name, window_days, today)?,
        );
        summaries.push(ProductSummary {
            name: product.name.clone(),
            median,
            prices,
        });
    }

    Ok(Report {
        date: today,
        products: summaries,
        alerts,
        trends,
    })
}

/// Keep the cheapest listing per source (e.g. a plain item and a premium grade
/// both matching the same term), sorted by price then source.
pub fn lowest_per_source(facts: &[PriceFact]) -> Vec<SourcePrice> {
    let mut lowest: HashMap<&str, i64> = HashMap::new();
    for f in facts {
        lowest
            .entry(f.source.as_str())
            .and_modify(|p| *p = (*p).min(f.price))
            .or_insert(f.price);
    }
    let mut prices: Vec<SourcePrice> = lowest
        .into_iter()
        .map(|(source, price)| SourcePrice {
            source: source.to_string(),
            price,
        })
        .collect();
    prices.sort_by(|a, b| a.price.cmp(&b.price).then_with(|| a.source.cmp(&b.source)));
    prices
}

/// Integer median; an even count averages the middle pair, truncating.
pub fn median(values: &[i64]) -> Option<i64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2)
    }
}

pub fn change_percent(previous: i64, current: i64) -> Option<f64> {
    if previous == 0 {
        return None;
    }
    Some((current - previous) as f64 / previous as f64 * 100.0)
}

/// Alert when the swing against the previous stored price reaches the threshold.
pub fn check_alert(
    product: &str,
    current: &SourcePrice,
    previous: i64,
    threshold_percent: f64,
) -> Option<AlertEvent> {
    let change = change_percent(previous, current.price)?;
    if change.abs() < threshold_percent {
        return None;
    }
    Some(AlertEvent {
        product: product.to_string(),
        source: current.source.clone(),
        change_percent: round1(change),
        previous_price: previous,
        current_price: current.price,
    })
}

/// Write the report as `report-<date>.json` under `dir`.
pub fn write_report(dir: &Path, report: &Report) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(format!("report-{}.json", report.date));
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Median of one product's deduplicated prices on `date`.
pub fn median_for_date(conn: &Connection, product: &str, date: NaiveDate) -> Result<Option<i64>> {
    let facts = db::prices_for_date(conn, date, Some(product))?;
    let values: Vec<i64> = lowest_per_source(&facts).iter().map(|p| p.price).collect();
    Ok(median(&values))
}

pub fn week_ago_median(conn: &Connection, product: &str, today: NaiveDate) -> Result<Option<i64>> {
    median_for_date(conn, product, db::days_before(today, 7))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{day, fact, memory_db};
    use crate::db::{save_prices, TrendDirection};

    fn product(name: &str) -> ProductConfig {
        ProductConfig {
            name: name.to_string(),
            search_terms: Vec::new(),
            unit: "kg".to_string(),
        }
    }

    #[test]
    fn dedup_keeps_lowest_per_source() {
        let d = day("2026-01-20");
        let facts = vec![
            fact(d, "A", "Tomate Lisa", "Tomate Lisa Extra", 16800),
            fact(d, "A", "Tomate Lisa", "Tomate Lisa", 16500),
            fact(d, "B", "Tomate Lisa", "Tomate", 17950),
        ];
        let prices = lowest_per_source(&facts);
        assert_eq!(
            prices,
            vec![
                SourcePrice { source: "A".into(), price: 16500 },
                SourcePrice { source: "B".into(), price: 17950 },
            ]
        );
    }

    #[test]
    fn medians() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[16500]), Some(16500));
        assert_eq!(median(&[17950, 16500, 17950]), Some(17950));
        assert_eq!(median(&[16500, 17950]), Some(17225));
    }

    #[test]
    fn alert_threshold() {
        let current = SourcePrice { source: "Biggie".into(), price: 16500 };
        let alert = check_alert("Tomate Lisa", &current, 20250, 15.0).unwrap();
        assert_eq!(alert.change_percent, -18.5);
        assert_eq!(alert.previous_price, 20250);
        assert_eq!(alert.current_price, 16500);
        assert!(check_alert("Tomate Lisa", &current, 20250, 20.0).is_none());
    }

    #[test]
    fn alert_at_exact_threshold() {
        let current = SourcePrice { source: "Stock".into(), price: 11500 };
        assert!(check_alert("Tomate Lisa", &current, 10000, 15.0).is_some());
    }

    #[test]
    fn report_with_history() {
        let conn = memory_db();
        let today = day("2026-01-20");
        let yesterday = day("2026-01-19");
        save_prices(
            &conn,
            &[
                fact(yesterday, "Biggie", "Tomate Lisa", "Tomate Lisa", 20250),
                fact(yesterday, "Stock", "Tomate Lisa", "TOMATE LISA X KG", 17500),
                fact(today, "Biggie", "Tomate Lisa", "Tomate Lisa", 16500),
                fact(today, "Stock", "Tomate Lisa", "TOMATE LISA X KG", 17950),
                fact(today, "Stock", "Tomate Lisa", "TOMATE LISA EXTRA X KG", 19900),
                fact(today, "Superseis", "Tomate Lisa", "Tomate Lisa por kg", 17950),
            ],
        )
        .unwrap();

        let products = vec![product("Tomate Lisa"), product("Locote Rojo")];
        let report = build_report(&conn, &products, 15.0, 7, today).unwrap();

        // Locote Rojo has nothing today and is omitted.
        assert_eq!(report.products.len(), 1);
        let tomato = &report.products[0];
        assert_eq!(tomato.median, 17950);
        let sources: Vec<&str> = tomato.prices.iter().map(|p| p.source.as_str()).collect();
        assert_eq!(sources, vec!["Biggie", "Stock", "Superseis"]);

        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.alerts[0].source, "Biggie");
        assert_eq!(report.alerts[0].change_percent, -18.5);

        let trend = &report.trends["Tomate Lisa"];
        assert_eq!(trend.classification, TrendDirection::Down);
        assert!(!report.trends.contains_key("Locote Rojo"));
    }

    #[test]
    fn empty_day_gives_empty_report() {
        let conn = memory_db();
        let report = build_report(&conn, &[product("Tomate Lisa")], 15.0, 7, day("2026-01-20")).unwrap();
        assert!(report.is_empty());
        assert!(report.alerts.is_empty());
    }

    #[test]
    fn report_file_shape() {
        let conn = memory_db();
        let today = day("2026-01-20");
        save_prices(&conn, &[fact(today, "Stock", "Tomate Lisa", "TOMATE LISA X KG", 17950)]).unwrap();
        let report = build_report(&conn, &[product("Tomate Lisa")], 15.0, 7, today).unwrap();

        let dir = std::env::temp_dir().join(format!("produce-prices-report-{}", std::process::id()));
        let path = write_report(&dir, &report).unwrap();
        assert!(path.ends_with("report-2026-01-20.json"));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["date"], "2026-01-20");
        assert_eq!(json["products"][0]["name"], "Tomate Lisa");
        assert_eq!(json["products"][0]["median"], 17950);
        assert_eq!(json["products"][0]["prices"][0]["source"], "Stock");
        assert_eq!(json["trends"]["Tomate Lisa"]["classification"], "insufficient_data");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn week_ago() {
        let conn = memory_db();
        let today = day("2026-01-20");
        save_prices(
            &conn,
            &[
                fact(day("2026-01-13"), "A", "Tomate Lisa", "x", 15000),
                fact(day("2026-01-13"), "B", "Tomate Lisa", "x", 16000),
            ],
        )
        .unwrap();
        assert_eq!(week_ago_median(&conn, "Tomate Lisa", today).unwrap(), Some(15500));
        assert_eq!(median_for_date(&conn, "Tomate Lisa", today).unwrap(), None);
    }
}
