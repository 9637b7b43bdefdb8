use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::AnalyticsSettings;
use crate::db::FeedRow;

pub const TOKEN_ENV: &str = "PRICES_ANALYTICS_TOKEN";
const PUSH_TIMEOUT_SECS: u64 = 60;

pub fn feed_json(rows: &[FeedRow]) -> Result<String> {
    serde_json::to_string_pretty(rows).context("Failed to serialize feed")
}

/// Endpoint and bearer token, when both are configured.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsTarget {
    pub endpoint: String,
    pub token: String,
}

impl AnalyticsTarget {
    pub fn resolve(settings: &AnalyticsSettings, token: Option<String>) -> Option<Self> {
        let endpoint = settings.endpoint.as_deref().map(str::trim).filter(|e| !e.is_empty());
        let token = token.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
        match (endpoint, token) {
            (Some(endpoint), Some(token)) => Some(AnalyticsTarget {
                endpoint: endpoint.to_string(),
                token,
            }),
            (None, _) => {
                warn!("No analytics endpoint configured, skipping push");
                None
            }
            (Some(_), None) => {
                warn!("{} not set, skipping push", TOKEN_ENV);
                None
            }
        }
    }

    pub fn from_env(settings: &AnalyticsSettings) -> Option<Self> {
        Self::resolve(settings, std::env::var(TOKEN_ENV).ok())
    }
}

/// POST the rows as a JSON array. Returns how many rows were sent.
pub async fn push(target: &AnalyticsTarget, rows: &[FeedRow]) -> Result<usize> {
    if rows.is_empty() {
        info!("No rows to push");
        return Ok(0);
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(PUSH_TIMEOUT_SECS))
        .build()?;
    let response = client
        .post(&target.endpoint)
        .bearer_auth(&target.token)
        .json(rows)
        .send()
        .await
        .context("Analytics push failed")?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("Analytics endpoint returned {}: {}", status, body);
    }

    info!("Pushed {} rows to analytics", rows.len());
    Ok(rows.len())
}

/// Push when credentials are present; failures are logged, never propagated.
pub async fn push_if_configured(settings: &AnalyticsSettings, rows: &[FeedRow]) -> Option<usize> {
    let target = AnalyticsTarget::from_env(settings)?;
    match push(&target, rows).await {
        Ok(n) => Some(n),
        Err(e) => {
            warn!("{:#}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::day;

    fn settings(endpoint: Option<&str>) -> AnalyticsSettings {
        AnalyticsSettings {
            endpoint: endpoint.map(str::to_string),
        }
    }

    #[test]
    fn target_needs_endpoint_and_token() {
        let url = Some("https://analytics.example.com/import");
        assert_eq!(
            AnalyticsTarget::resolve(&settings(url), Some("secret".into())),
            Some(AnalyticsTarget {
                endpoint: "https://analytics.example.com/import".into(),
                token: "secret".into(),
            })
        );
        assert!(AnalyticsTarget::resolve(&settings(url), None).is_none());
        assert!(AnalyticsTarget::resolve(&settings(url), Some("  ".into())).is_none());
        assert!(AnalyticsTarget::resolve(&settings(None), Some("secret".into())).is_none());
        assert!(AnalyticsTarget::resolve(&settings(Some("")), Some("secret".into())).is_none());
    }

    #[test]
    fn feed_serializes_plain_records() {
        let rows = vec![FeedRow {
            date: day("2026-01-20"),
            source: "Stock".into(),
            product: "Tomate Lisa".into(),
            raw_name: "TOMATE LISA X KG".into(),
            price: 17950,
            unit: "kg".into(),
        }];
        let json: serde_json::Value = serde_json::from_str(&feed_json(&rows).unwrap()).unwrap();
        assert_eq!(json[0]["date"], "2026-01-20");
        assert_eq!(json[0]["raw_name"], "TOMATE LISA X KG");
        assert_eq!(json[0]["price"], 17950);
        assert_eq!(json[0]["unit"], "kg");
    }

    #[tokio::test]
    async fn empty_push_is_a_no_op() {
        let target = AnalyticsTarget {
            endpoint: "http://127.0.0.1:9/unreachable".into(),
            token: "t".into(),
        };
        assert_eq!(push(&target, &[]).await.unwrap(), 0);
    }
}
