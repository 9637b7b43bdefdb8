use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::{
    class_matches, find_name, find_price, first_link, resolve_url, select_all, CandidateListing,
};
use crate::classify::is_fresh_produce;

static DIV_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div").unwrap());
static ARTICLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("article").unwrap());

static CONTAINER_CLASSES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"(?i)product", r"(?i)item", r"(?i)card"]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
});

static CONTAINER_ATTRS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        "div[data-product]",
        "div[data-item]",
        r#"div[itemtype="http://schema.org/Product"]"#,
    ]
    .iter()
    .map(|s| Selector::parse(s).unwrap())
    .collect()
});

/// Heuristic extraction for sources without a dedicated layout.
/// Layout extractors fall back to this when their own selectors find nothing.
pub fn parse(doc: &Html, base_url: &str) -> Vec<CandidateListing> {
    let containers = find_containers(doc);
    let mut listings: Vec<CandidateListing> = Vec::new();
    let mut skipped = 0usize;

    for el in containers {
        match listing_from(el, base_url) {
            Some(l) if !listings.contains(&l) => listings.push(l),
            Some(_) => {}
            None => skipped += 1,
        }
    }

    debug!("generic: {} listings, {} containers skipped", listings.len(), skipped);
    listings
}

/// Containers by class pattern, then by data attribute, then `<article>`.
pub(crate) fn find_containers(doc: &Html) -> Vec<ElementRef<'_>> {
    let divs = select_all(doc, &DIV_SEL);
    for re in CONTAINER_CLASSES.iter() {
        let found: Vec<_> = divs.iter().copied().filter(|d| class_matches(*d, re)).collect();
        if !found.is_empty() {
            return found;
        }
    }

    for sel in CONTAINER_ATTRS.iter() {
        let found = select_all(doc, sel);
        if !found.is_empty() {
            return found;
        }
    }

    select_all(doc, &ARTICLE_SEL)
}

fn listing_from(el: ElementRef, base_url: &str) -> Option<CandidateListing> {
    let name = find_name(el)?;
    if !is_fresh_produce(&name) {
        return None;
    }
    let price = find_price(el)?;
    let url = first_link(el).map(|h| resolve_url(base_url, h)).unwrap_or_default();
    Some(CandidateListing::new(name, price, url))
}
