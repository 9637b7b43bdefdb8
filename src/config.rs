use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_CONFIG_FILE: &str = "config.yaml";
const ENV_PREFIX: &str = "PRICES";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
    #[serde(default)]
    pub products: Vec<ProductConfig>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub alerts: AlertSettings,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub schedule: ScheduleSettings,
    #[serde(default)]
    pub analytics: AnalyticsSettings,
}

/// A target product and the search terms used to find it.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductConfig {
    pub name: String,
    #[serde(default)]
    pub search_terms: Vec<String>,
    #[serde(default = "default_unit")]
    pub unit: String,
}

impl ProductConfig {
    /// Configured terms, or the lowercased product name when none are given.
    pub fn terms(&self) -> Vec<String> {
        if self.search_terms.is_empty() {
            vec![self.name.to_lowercase()]
        } else {
            self.search_terms.clone()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub base_url: String,
    /// Search URL with a `{query}` placeholder.
    #[serde(alias = "search_url_template")]
    pub search_url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertSettings {
    #[serde(default = "default_threshold")]
    pub threshold_percent: f64,
    #[serde(default = "default_window")]
    pub trend_window_days: u32,
}

impl Default for AlertSettings {
    fn default() -> Self {
        AlertSettings {
            threshold_percent: default_threshold(),
            trend_window_days: default_window(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        HttpSettings {
            timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleSettings {
    #[serde(default = "default_schedule_time")]
    pub time: String,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        ScheduleSettings {
            time: default_schedule_time(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyticsSettings {
    pub endpoint: Option<String>,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/prices.sqlite")
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("data/reports")
}

fn default_unit() -> String {
    "kg".to_string()
}

fn default_true() -> bool {
    true
}

fn default_threshold() -> f64 {
    15.0
}

fn default_window() -> u32 {
    7
}

fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
        .to_string()
}

fn default_schedule_time() -> String {
    "08:00".to_string()
}

impl Settings {
    /// Layer the YAML file (optional unless a path is given) under
    /// `PRICES_*` environment variables, e.g. `PRICES_ALERTS__THRESHOLD_PERCENT=20`.
    pub fn load(path: Option<&Path>) -> Result<Settings> {
        let file = match path {
            Some(p) => config::File::from(p).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }

    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_yaml(yaml: &str) -> Settings {
        config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let s = from_yaml("products:\n  - name: Tomate Lisa\n");
        assert_eq!(s.alerts.threshold_percent, 15.0);
        assert_eq!(s.alerts.trend_window_days, 7);
        assert_eq!(s.http.timeout_secs, 30);
        assert_eq!(s.schedule.time, "08:00");
        assert_eq!(s.products[0].unit, "kg");
        assert_eq!(s.products[0].terms(), vec!["tomate lisa".to_string()]);
        assert!(s.analytics.endpoint.is_none());
    }

    #[test]
    fn sources_default_enabled() {
        let s = from_yaml(
            "sources:\n  - name: Stock\n    base_url: https://www.stock.com.py\n    search_url: https://www.stock.com.py/search.aspx?searchterms={query}\n  - name: Biggie\n    base_url: https://www.biggie.com.py\n    search_url_template: https://www.biggie.com.py/search?q={query}\n    enabled: false\n",
        );
        assert_eq!(s.sources.len(), 2);
        assert_eq!(s.enabled_sources().count(), 1);
        assert!(s.source("stock").is_some());
        assert!(s.sources[1].search_url.contains("{query}"));
    }
}
