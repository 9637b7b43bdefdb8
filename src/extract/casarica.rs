use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::{
    first_link, generic, first_with_class, first_with_tag, resolve_url, select_all, squash_text,
    CandidateListing,
};
use crate::classify::is_fresh_produce;
use crate::normalize::parse_price;

static CONTAINER_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.product").unwrap());

const TITLE_CLASS: &str = "ecommercepro-loop-product__title";
const CURRENCY: char = '₲';

/// Produce categories browsable page by page.
const CATEGORIES: &[(&str, &str)] = &[
    ("verduras", "/catalogo/verduras-c287"),
    ("frutas", "/catalogo/frutas-c282"),
];

pub fn category_path(category: &str) -> Option<&'static str> {
    let wanted = category.trim().to_lowercase();
    CATEGORIES
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, path)| *path)
}

pub fn parse(doc: &Html, base_url: &str) -> Vec<CandidateListing> {
    let containers = select_all(doc, &CONTAINER_SEL);
    if containers.is_empty() {
        debug!("casarica: no product containers, using generic heuristics");
        return generic::parse(doc, base_url);
    }
    containers
        .into_iter()
        .filter_map(|el| listing_from(el, base_url))
        .collect()
}

fn listing_from(el: ElementRef, base_url: &str) -> Option<CandidateListing> {
    let name_el = first_with_class(el, Some("h2"), TITLE_CLASS)
        .or_else(|| first_with_tag(el, "h2"))
        .or_else(|| first_with_tag(el, "h3"))?;
    let name = squash_text(name_el);
    if name.is_empty() || !is_fresh_produce(&name) {
        return None;
    }

    let price = first_with_class(el, Some("span"), "price")
        .or_else(|| first_with_class(el, Some("span"), "amount"))
        .and_then(|p| parse_price(&squash_text(p)))
        .filter(|p| *p > 0)
        .or_else(|| {
            el.text()
                .map(str::trim)
                .filter(|t| t.contains(CURRENCY))
                .find_map(|t| parse_price(t).filter(|p| *p > 0))
        })?;

    let url = first_link(el).map(|h| resolve_url(base_url, h)).unwrap_or_default();
    Some(CandidateListing::new(name, price, url))
}
