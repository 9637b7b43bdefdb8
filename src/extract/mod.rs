pub mod casarica;
pub mod generic;
pub mod stock;
pub mod superseis;

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use url::Url;

use crate::normalize::parse_price;

static NAME_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)name|title").unwrap());
static PRICE_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)price|valor|costo").unwrap());
static CURRENCY_PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:Gs\.?|₲\.?|G\$)\s*\d[\d.,]*").unwrap());
static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static TITLED_ANCHOR_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[title]").unwrap());

pub(crate) const MIN_NAME_LEN: usize = 3;
const UNIT_TOKENS: &[&str] = &["unidad", "x un", "c/u", "por un"];

/// One scraped product entry, before it is matched to a configured product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateListing {
    pub raw_name: String,
    pub price: i64,
    pub unit: String,
    pub source_url: String,
}

impl CandidateListing {
    pub fn new(raw_name: String, price: i64, source_url: String) -> Self {
        let unit = listing_unit(&raw_name).to_string();
        CandidateListing { raw_name, price, unit, source_url }
    }
}

/// Closed set of listing extractors, picked by source name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extractor {
    Generic,
    Stock,
    Superseis,
    CasaRica,
}

impl Extractor {
    pub fn for_source(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "stock" => Extractor::Stock,
            "superseis" => Extractor::Superseis,
            "casa rica" | "casarica" => Extractor::CasaRica,
            _ => Extractor::Generic,
        }
    }

    pub fn parse_listings(&self, doc: &Html, base_url: &str) -> Vec<CandidateListing> {
        match self {
            Extractor::Generic => generic::parse(doc, base_url),
            Extractor::Stock => stock::parse(doc, base_url),
            Extractor::Superseis => superseis::parse(doc, base_url),
            Extractor::CasaRica => casarica::parse(doc, base_url),
        }
    }

    /// Relative path of a browsable category listing, for sources that have them.
    pub fn category_path(&self, category: &str) -> Option<&'static str> {
        match self {
            Extractor::CasaRica => casarica::category_path(category),
            _ => None,
        }
    }
}

// ── Shared helpers ──

/// Text content with whitespace collapsed to single spaces.
pub(crate) fn squash_text(el: ElementRef) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Descendant elements in document order, excluding `el` itself.
pub(crate) fn descendants<'a>(el: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    el.descendants().skip(1).filter_map(ElementRef::wrap)
}

pub(crate) fn has_class(el: ElementRef, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

pub(crate) fn class_matches(el: ElementRef, re: &Regex) -> bool {
    el.value().attr("class").is_some_and(|c| re.is_match(c))
}

pub(crate) fn first_with_tag<'a>(el: ElementRef<'a>, tag: &str) -> Option<ElementRef<'a>> {
    descendants(el).find(|e| e.value().name() == tag)
}

pub(crate) fn first_with_class<'a>(
    el: ElementRef<'a>,
    tag: Option<&str>,
    class: &str,
) -> Option<ElementRef<'a>> {
    descendants(el).find(|e| tag.map_or(true, |t| e.value().name() == t) && has_class(*e, class))
}

pub(crate) fn select_all<'a>(doc: &'a Html, selector: &Selector) -> Vec<ElementRef<'a>> {
    doc.select(selector).collect()
}

/// Name discovery: headings first, then tags whose class looks like a name or
/// title, then a `title` attribute on a link.
pub(crate) fn find_name(el: ElementRef) -> Option<String> {
    const HEADINGS: &[&str] = &["h1", "h2", "h3", "h4"];
    const NAMED_TAGS: &[&str] = &["a", "span", "p", "div"];

    for tag in HEADINGS {
        if let Some(h) = first_with_tag(el, tag) {
            let text = squash_text(h);
            if text.chars().count() >= MIN_NAME_LEN {
                return Some(text);
            }
        }
    }

    for tag in NAMED_TAGS {
        let found = descendants(el)
            .find(|e| e.value().name() == *tag && class_matches(*e, &NAME_CLASS_RE));
        if let Some(found) = found {
            let text = squash_text(found);
            if text.chars().count() >= MIN_NAME_LEN {
                return Some(text);
            }
        }
    }

    el.select(&TITLED_ANCHOR_SEL)
        .next()
        .and_then(|a| a.value().attr("title"))
        .map(|t| t.trim().to_string())
        .filter(|t| t.chars().count() >= MIN_NAME_LEN)
}

/// Price discovery over fields whose class looks like a price, then over the
/// container's raw text as a last resort.
pub(crate) fn find_price(el: ElementRef) -> Option<i64> {
    const PRICE_TAGS: &[&str] = &["span", "div", "p", "strong"];

    let structured = descendants(el)
        .filter(|e| PRICE_TAGS.contains(&e.value().name()))
        .filter(|e| class_matches(*e, &PRICE_CLASS_RE) || e.value().attr("itemprop") == Some("price"))
        .find_map(|e| {
            e.value()
                .attr("content")
                .and_then(parse_price)
                .or_else(|| parse_price(&squash_text(e)))
                .filter(|p| *p > 0)
        });

    structured.or_else(|| scan_text_price(&el.text().collect::<String>()))
}

/// First currency-marker-adjacent amount in free text.
pub(crate) fn scan_text_price(text: &str) -> Option<i64> {
    CURRENCY_PRICE_RE
        .find_iter(text)
        .find_map(|m| parse_price(m.as_str()).filter(|p| *p > 0))
}

pub(crate) fn first_link(el: ElementRef) -> Option<&str> {
    el.select(&ANCHOR_SEL).next().and_then(|a| a.value().attr("href"))
}

/// Resolve a listing href against the source's base URL. Absolute links pass
/// through; anything unparsable falls back to plain concatenation.
pub fn resolve_url(base_url: &str, href: &str) -> String {
    let href = href.trim();
    if href.is_empty() || href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    match Url::parse(base_url).and_then(|base| base.join(href)) {
        Ok(u) => u.to_string(),
        Err(_) => format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            href.trim_start_matches('/')
        ),
    }
}

pub fn listing_unit(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    if UNIT_TOKENS.iter().any(|t| lower.contains(t)) {
        "unit"
    } else {
        "kg"
    }
}
