mod classify;
mod config;
mod db;
mod export;
mod extract;
mod matcher;
mod normalize;
mod pipeline;
mod report;
mod schedule;
mod source;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::db::FeedScope;
use crate::report::Report;
use crate::source::{HttpFetcher, SourceAdapter};

#[derive(Parser)]
#[command(name = "produce_prices", about = "Daily produce price tracker for supermarket websites")]
struct Cli {
    /// Config file (default: ./config.yaml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape all enabled sources, store today's prices and write the report
    Run {
        /// Also push today's feed to the analytics endpoint
        #[arg(long)]
        push: bool,
    },
    /// Run now, then every day at the configured time
    Schedule {
        #[arg(long)]
        push: bool,
    },
    /// Rebuild a report from stored prices
    Report {
        /// Day to report on (default: today)
        #[arg(short, long)]
        date: Option<NaiveDate>,
        /// Print the renderer JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print the analytics feed as JSON
    Export {
        /// Rows from the last N days (default: today only)
        #[arg(short, long, conflicts_with = "all")]
        days: Option<u32>,
        /// Every stored row
        #[arg(long)]
        all: bool,
        /// POST the feed to the analytics endpoint instead of printing it
        #[arg(long)]
        push: bool,
    },
    /// Walk a source's category listing page by page
    Browse {
        source: String,
        category: String,
        /// Store listings that match a configured product
        #[arg(long)]
        save: bool,
    },
    /// Show database statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Run { push } => run_once(&settings, push).await,
        Commands::Schedule { push } => run_scheduled(&settings, push).await,
        Commands::Report { date, json } => {
            let conn = open_db(&settings)?;
            let date = date.unwrap_or_else(today);
            let report = report::build_report(
                &conn,
                &settings.products,
                settings.alerts.threshold_percent,
                settings.alerts.trend_window_days,
                date,
            )?;
            if report.is_empty() {
                println!("No prices stored for {}.", date);
                return Ok(());
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&conn, &report)?;
            }
            Ok(())
        }
        Commands::Export { days, all, push } => {
            let conn = open_db(&settings)?;
            let scope = match (all, days) {
                (true, _) => FeedScope::All,
                (false, Some(n)) => FeedScope::LastDays(n),
                (false, None) => FeedScope::Today,
            };
            let rows = db::fetch_feed(&conn, scope, today())?;
            if push {
                match export::push_if_configured(&settings.analytics, &rows).await {
                    Some(n) => println!("Pushed {} rows.", n),
                    None => println!("Nothing pushed."),
                }
            } else {
                println!("{}", export::feed_json(&rows)?);
            }
            Ok(())
        }
        Commands::Browse { source, category, save } => {
            browse(&settings, &source, &category, save).await
        }
        Commands::Stats => {
            let conn = open_db(&settings)?;
            let s = db::get_stats(&conn)?;
            println!("Rows:  {}", s.rows);
            println!("Days:  {}", s.days);
            match (s.first_date, s.last_date) {
                (Some(first), Some(last)) => println!("Range: {} .. {}", first, last),
                _ => println!("Range: -"),
            }
            if !s.per_source.is_empty() {
                println!("\n--- Per source ---");
                for (source, count) in &s.per_source {
                    println!("  {:<20} {:>6}", truncate(source, 20), count);
                }
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn open_db(settings: &Settings) -> anyhow::Result<Connection> {
    let conn = db::connect(&settings.db_path)?;
    db::init_schema(&conn)?;
    Ok(conn)
}

/// One full pass: collect, store, optionally push, then report.
async fn run_once(settings: &Settings, push: bool) -> anyhow::Result<()> {
    let date = today();
    if settings.products.is_empty() {
        warn!("No products configured");
    }
    if settings.enabled_sources().next().is_none() {
        warn!("No enabled sources configured");
    }
    let conn = open_db(settings)?;
    let fetcher = HttpFetcher::new(&settings.http)?;

    let t_scrape = Instant::now();
    let (observations, stats) =
        pipeline::collect(&settings.sources, &settings.products, &fetcher).await;
    println!(
        "Collected {} prices from {} sources ({} skipped, {} queries) in {:.1}s",
        stats.observations,
        stats.sources,
        stats.skipped_sources,
        stats.queries,
        t_scrape.elapsed().as_secs_f64()
    );

    let inserted = pipeline::persist(&conn, date, observations)?;
    println!("Stored {} new rows for {}", inserted, date);

    if push {
        let rows = db::fetch_feed(&conn, FeedScope::Today, date)?;
        export::push_if_configured(&settings.analytics, &rows).await;
    }

    let report = report::build_report(
        &conn,
        &settings.products,
        settings.alerts.threshold_percent,
        settings.alerts.trend_window_days,
        date,
    )?;
    if report.is_empty() {
        warn!("No prices found for any product today, skipping report delivery");
        return Ok(());
    }

    let path = report::write_report(&settings.report_dir, &report)?;
    info!("Report written to {}", path.display());
    print_report(&conn, &report)?;
    Ok(())
}

async fn run_scheduled(settings: &Settings, push: bool) -> anyhow::Result<()> {
    let at = schedule::parse_time(&settings.schedule.time)?;
    loop {
        if let Err(e) = run_once(settings, push).await {
            error!("Run failed: {:#}", e);
        }
        let (next, wait) = schedule::until_next(at);
        info!("Next run at {} (in {})", next, format_duration(wait));
        tokio::time::sleep(wait).await;
    }
}

async fn browse(settings: &Settings, name: &str, category: &str, save: bool) -> anyhow::Result<()> {
    let config = settings
        .source(name)
        .with_context(|| format!("Unknown source '{}'", name))?
        .clone();
    let fetcher = HttpFetcher::new(&settings.http)?;
    let adapter = SourceAdapter::new(config, &fetcher)?;
    let listings = adapter.search_category(category).await?;

    if listings.is_empty() {
        println!("No listings found.");
        return Ok(());
    }

    println!("{:>3} | {:<40} | {:>9} | {:<4}", "#", "Listing", "Price", "Unit");
    println!("{}", "-".repeat(66));
    for (i, l) in listings.iter().enumerate() {
        println!(
            "{:>3} | {:<40} | {:>9} | {:<4}",
            i + 1,
            truncate(&l.raw_name, 40),
            l.price,
            l.unit
        );
    }
    println!("\n{} listings", listings.len());

    if save {
        let observations: Vec<_> = settings
            .products
            .iter()
            .flat_map(|p| pipeline::match_listings(adapter.name(), p, &listings))
            .collect();
        if observations.is_empty() {
            println!("No listing matched a configured product.");
            return Ok(());
        }
        let conn = open_db(settings)?;
        let inserted = pipeline::persist(&conn, today(), observations)?;
        println!("Stored {} new rows.", inserted);
    }
    Ok(())
}

fn print_report(conn: &Connection, report: &Report) -> anyhow::Result<()> {
    println!("\nPrices for {}", report.date);
    println!(
        "{:<20} | {:>9} | {:>9} | {:<17} | {:<24}",
        "Product", "Median", "Week ago", "Trend", "Cheapest"
    );
    println!("{}", "-".repeat(90));

    for p in &report.products {
        let week_ago = report::week_ago_median(conn, &p.name, report.date)?
            .map(|m| m.to_string())
            .unwrap_or_else(|| "-".into());
        let trend = report
            .trends
            .get(&p.name)
            .map(|t| format!("{:?} {:+.1}%", t.classification, t.change_percent))
            .unwrap_or_else(|| "-".into());
        let cheapest = p
            .prices
            .first()
            .map(|c| format!("{} ({})", c.source, c.price))
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<20} | {:>9} | {:>9} | {:<17} | {:<24}",
            truncate(&p.name, 20),
            p.median,
            week_ago,
            trend,
            truncate(&cheapest, 24)
        );
    }

    if !report.alerts.is_empty() {
        println!("\n--- Alerts ---");
        for a in &report.alerts {
            println!(
                "  {} @ {}: {} -> {} ({:+.1}%)",
                a.product, a.source, a.previous_price, a.current_price, a.change_percent
            );
        }
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
