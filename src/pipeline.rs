use anyhow::Result;
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::config::{ProductConfig, SourceConfig};
use crate::db::{self, PriceFact};
use crate::extract::CandidateListing;
use crate::matcher::matches_product;
use crate::source::{Fetch, SourceAdapter};

/// A matched listing seen during one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub source: String,
    pub product: String,
    pub raw_name: String,
    pub price: i64,
    pub unit: String,
}

impl Observation {
    pub fn into_fact(self, date: NaiveDate) -> PriceFact {
        PriceFact {
            date,
            source: self.source,
            product: self.product,
            raw_name: self.raw_name,
            price: self.price,
            unit: self.unit,
        }
    }
}

pub struct CollectStats {
    pub sources: usize,
    pub skipped_sources: usize,
    pub queries: usize,
    pub observations: usize,
}

/// Query every enabled source for every search term of every product, one call
/// at a time, keeping each listing that matches the product it was searched for.
/// Configured categories are browsed afterwards and matched against every
/// product. Duplicates across terms are kept; the store and report reconcile them.
pub async fn collect<F: Fetch>(
    sources: &[SourceConfig],
    products: &[ProductConfig],
    fetcher: &F,
) -> (Vec<Observation>, CollectStats) {
    let enabled: Vec<&SourceConfig> = sources.iter().filter(|s| s.enabled).collect();
    let calls: usize = products.iter().map(|p| p.terms().len()).sum::<usize>() * enabled.len();

    let pb = ProgressBar::new(calls as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let mut observations = Vec::new();
    let mut stats = CollectStats {
        sources: enabled.len(),
        skipped_sources: 0,
        queries: 0,
        observations: 0,
    };

    for source in enabled {
        let adapter = match SourceAdapter::new(source.clone(), fetcher) {
            Ok(a) => a,
            Err(e) => {
                warn!("Skipping source {}: {}", source.name, e);
                stats.skipped_sources += 1;
                pb.inc(products.iter().map(|p| p.terms().len() as u64).sum());
                continue;
            }
        };
        info!("Scraping {}...", adapter.name());
        pb.set_message(adapter.name().to_string());

        for product in products {
            for term in product.terms() {
                let listings = adapter.search(&term).await;
                stats.queries += 1;
                observations.extend(match_listings(adapter.name(), product, &listings));
                pb.inc(1);
            }
        }

        for category in &source.categories {
            match adapter.search_category(category).await {
                Ok(listings) => {
                    stats.queries += 1;
                    for product in products {
                        observations.extend(match_listings(adapter.name(), product, &listings));
                    }
                }
                Err(e) => warn!("{}", e),
            }
        }
    }

    pb.finish_and_clear();
    stats.observations = observations.len();
    info!("Total prices collected: {}", observations.len());
    (observations, stats)
}

pub fn match_listings(
    source: &str,
    product: &ProductConfig,
    listings: &[CandidateListing],
) -> Vec<Observation> {
    listings
        .iter()
        .filter(|l| matches_product(&l.raw_name, product))
        .map(|l| Observation {
            source: source.to_string(),
            product: product.name.clone(),
            raw_name: l.raw_name.clone(),
            price: l.price,
            unit: product.unit.clone(),
        })
        .collect()
}

/// Store a run's observations under `date`. Returns how many rows were new.
pub fn persist(conn: &Connection, date: NaiveDate, observations: Vec<Observation>) -> Result<usize> {
    let facts: Vec<PriceFact> = observations.into_iter().map(|o| o.into_fact(date)).collect();
    let inserted = db::save_prices(conn, &facts)?;
    info!(
        "Saved {} prices to database ({} already stored)",
        inserted,
        facts.len() - inserted
    );
    Ok(inserted)
}
