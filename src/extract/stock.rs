use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::{
    first_link, first_with_class, generic, resolve_url, select_all, squash_text, CandidateListing,
    MIN_NAME_LEN,
};
use crate::classify::is_fresh_produce;
use crate::normalize::parse_price;

static GS_PRICE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Gs\s*[\d.,]+").unwrap());

/// Containers in the order the storefront has used them.
static CONTAINER_SELS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    ["div.item-box", "div.product-item", "div[data-productid]"]
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect()
});

static TITLED_LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[title]").unwrap());
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());

const PRICE_CLASSES: &[&str] = &["prices", "actual-price", "price", "product-price"];

/// Line-scan keywords for pages served without product markup.
const TEXT_KEYWORDS: &[&str] = &["tomate", "locote", "pimiento", "lechuga", "morron", "morrón"];
const MIN_TEXT_NAME_LEN: usize = 5;

pub fn parse(doc: &Html, base_url: &str) -> Vec<CandidateListing> {
    let containers = CONTAINER_SELS
        .iter()
        .map(|sel| select_all(doc, sel))
        .find(|found| !found.is_empty());

    let Some(containers) = containers else {
        let listings = generic::parse(doc, base_url);
        if !listings.is_empty() {
            return listings;
        }
        debug!("stock: no product containers, falling back to text scan");
        return parse_from_text(doc);
    };

    containers
        .into_iter()
        .filter_map(|el| listing_from(el, base_url))
        .collect()
}

fn listing_from(el: ElementRef, base_url: &str) -> Option<CandidateListing> {
    let name_el = first_with_class(el, None, "product-title")
        .or_else(|| first_with_class(el, Some("h2"), "product-name"))
        .or_else(|| el.select(&TITLED_LINK_SEL).next())
        .or_else(|| el.select(&LINK_SEL).next())?;

    let name = name_el
        .value()
        .attr("title")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| squash_text(name_el));
    if name.chars().count() < MIN_NAME_LEN || !is_fresh_produce(&name) {
        return None;
    }

    let price = PRICE_CLASSES
        .iter()
        .find_map(|class| first_with_class(el, None, class))
        .and_then(|p| parse_price(&squash_text(p)))
        .filter(|p| *p > 0)
        .or_else(|| {
            el.text()
                .filter_map(|t| GS_PRICE_RE.find(t))
                .find_map(|m| parse_price(m.as_str()).filter(|p| *p > 0))
        })?;

    let url = first_link(el).map(|h| resolve_url(base_url, h)).unwrap_or_default();
    Some(CandidateListing::new(name, price, url))
}

/// Line-oriented scan: a line counts when it carries a `Gs` amount and one of
/// the produce keywords; the name is whatever precedes the amount.
fn parse_from_text(doc: &Html) -> Vec<CandidateListing> {
    let text: String = doc.root_element().text().collect();
    let mut listings = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some(m) = GS_PRICE_RE.find(line) else {
            continue;
        };
        let lower = line.to_lowercase();
        if !TEXT_KEYWORDS.iter().any(|k| lower.contains(k)) {
            continue;
        }
        let Some(price) = parse_price(m.as_str()).filter(|p| *p > 0) else {
            continue;
        };
        let name = line[..m.start()].trim();
        if name.chars().count() > MIN_TEXT_NAME_LEN && is_fresh_produce(name) {
            listings.push(CandidateListing::new(name.to_string(), price, String::new()));
        }
    }

    listings
}
