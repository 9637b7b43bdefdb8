use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use scraper::Html;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::config::{HttpSettings, SourceConfig};
use crate::extract::{CandidateListing, Extractor};

const QUERY_PLACEHOLDER: &str = "{query}";
const MAX_CATEGORY_PAGES: u32 = 5;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("search URL for {0} has no {{query}} placeholder")]
    MissingQueryPlaceholder(String),
    #[error("invalid base URL for {name}: {reason}")]
    InvalidBaseUrl { name: String, reason: String },
    #[error("{0} has no category browsing")]
    NoCategories(String),
    #[error("unknown category {category} for {name}")]
    UnknownCategory { name: String, category: String },
}

/// Fetches a document body. The HTTP implementation is [`HttpFetcher`].
pub trait Fetch {
    fn get(&self, url: &str) -> impl Future<Output = Result<String, FetchError>>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(http: &HttpSettings) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("es-PY,es;q=0.9,en;q=0.8"));

        let client = reqwest::Client::builder()
            .user_agent(http.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_secs(http.timeout_secs))
            .build()?;
        Ok(HttpFetcher { client })
    }
}

impl Fetch for HttpFetcher {
    async fn get(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        response.text().await.map_err(transport_error)
    }
}

fn transport_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(e.to_string())
    }
}

/// One supermarket: builds query URLs, fetches, and hands the document to
/// that source's extractor. Failures end here as an empty result.
pub struct SourceAdapter<'f, F: Fetch> {
    config: SourceConfig,
    extractor: Extractor,
    fetcher: &'f F,
}

impl<'f, F: Fetch> SourceAdapter<'f, F> {
    pub fn new(config: SourceConfig, fetcher: &'f F) -> Result<Self, SourceError> {
        if !config.search_url.contains(QUERY_PLACEHOLDER) {
            return Err(SourceError::MissingQueryPlaceholder(config.name.clone()));
        }
        if let Err(e) = Url::parse(&config.base_url) {
            return Err(SourceError::InvalidBaseUrl {
                name: config.name.clone(),
                reason: e.to_string(),
            });
        }
        let extractor = Extractor::for_source(&config.name);
        Ok(SourceAdapter { config, extractor, fetcher })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn search_url(&self, query: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        self.config.search_url.replace(QUERY_PLACEHOLDER, &encoded)
    }

    pub async fn search(&self, query: &str) -> Vec<CandidateListing> {
        if !self.config.enabled {
            info!("{}: disabled, skipping", self.config.name);
            return Vec::new();
        }

        let url = self.search_url(query);
        info!("{}: searching for '{}' at {}", self.config.name, query, url);

        match self.fetcher.get(&url).await {
            Ok(body) => {
                let listings = self.parse(&body);
                info!("{}: found {} listings for '{}'", self.config.name, listings.len(), query);
                listings
            }
            Err(e) => {
                warn!("{}: request failed for '{}': {}", self.config.name, query, e);
                Vec::new()
            }
        }
    }

    /// Walk `?page=1..=5` of a category listing, stopping at the first page
    /// that yields nothing or fails.
    pub async fn search_category(&self, category: &str) -> Result<Vec<CandidateListing>, SourceError> {
        let path = self.category_path(category)?;
        if !self.config.enabled {
            info!("{}: disabled, skipping", self.config.name);
            return Ok(Vec::new());
        }

        let base = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let mut all = Vec::new();

        for page in 1..=MAX_CATEGORY_PAGES {
            let url = format!("{}?page={}", base, page);
            let listings = match self.fetcher.get(&url).await {
                Ok(body) => self.parse(&body),
                Err(e) => {
                    warn!("{}: category page {} failed: {}", self.config.name, page, e);
                    break;
                }
            };
            if listings.is_empty() {
                break;
            }
            all.extend(listings);
        }

        info!("{}: {} listings in category '{}'", self.config.name, all.len(), category);
        Ok(all)
    }

    fn category_path(&self, category: &str) -> Result<&'static str, SourceError> {
        if self.extractor != Extractor::CasaRica {
            return Err(SourceError::NoCategories(self.config.name.clone()));
        }
        self.extractor
            .category_path(category)
            .ok_or_else(|| SourceError::UnknownCategory {
                name: self.config.name.clone(),
                category: category.to_string(),
            })
    }

    fn parse(&self, body: &str) -> Vec<CandidateListing> {
        let doc = Html::parse_document(body);
        self.extractor.parse_listings(&doc, &self.config.base_url)
    }
}
