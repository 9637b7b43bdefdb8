use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::{
    descendants, generic, first_link, first_with_class, resolve_url, select_all, squash_text,
    CandidateListing,
};
use crate::classify::is_fresh_produce;
use crate::normalize::parse_price;

static CONTAINER_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[data-product-id]").unwrap());

const NAME_TAGS: &[&str] = &["a", "span", "h2", "h3", "div"];
const PRICE_ATTR: &str = "data-product-price";
const PRICE_CLASSES: &[&str] = &["price", "price-special-suggest", "price-normal-suggest"];

/// Upsell copy rendered in the same text node as the product name.
const PROMO_MARKERS: &[&str] = &["Añadí", "Preparate"];
/// "Te ahorrás Gs. X" discount banners.
const SAVINGS_MARKERS: &[&str] = &["ahorras", "ahorrás"];

const MIN_NAME_LEN: usize = 5;
const MAX_NAME_LEN: usize = 80;

pub fn parse(doc: &Html, base_url: &str) -> Vec<CandidateListing> {
    let containers = select_all(doc, &CONTAINER_SEL);
    if containers.is_empty() {
        debug!("superseis: no product containers, using generic heuristics");
        return generic::parse(doc, base_url);
    }
    let total = containers.len();
    let listings: Vec<_> = containers
        .into_iter()
        .filter_map(|el| listing_from(el, base_url))
        .collect();
    debug!("superseis: {} of {} containers parsed", listings.len(), total);
    listings
}

fn listing_from(el: ElementRef, base_url: &str) -> Option<CandidateListing> {
    let name = find_name(el)?;
    if !is_fresh_produce(&name) {
        return None;
    }

    let price = el
        .value()
        .attr(PRICE_ATTR)
        .and_then(parse_price)
        .filter(|p| *p > 0)
        .or_else(|| {
            PRICE_CLASSES
                .iter()
                .find_map(|class| first_with_class(el, None, class))
                .and_then(|p| parse_price(&squash_text(p)))
                .filter(|p| *p > 0)
        })?;

    let url = first_link(el).map(|h| resolve_url(base_url, h)).unwrap_or_default();
    Some(CandidateListing::new(name, price, url))
}

/// First short text in the card that is neither a price nor a savings banner,
/// cut at any trailing promotional copy.
fn find_name(el: ElementRef) -> Option<String> {
    descendants(el)
        .filter(|e| NAME_TAGS.contains(&e.value().name()))
        .map(squash_text)
        .filter(|t| {
            let lower = t.to_lowercase();
            !SAVINGS_MARKERS.iter().any(|m| lower.contains(m))
        })
        .find(|t| {
            let len = t.chars().count();
            len > MIN_NAME_LEN && len < MAX_NAME_LEN && !t.starts_with('₲') && !t.starts_with("Gs")
        })
        .map(|t| strip_promo(&t))
        .filter(|t| !t.is_empty())
}

pub(crate) fn strip_promo(name: &str) -> String {
    let end = PROMO_MARKERS
        .iter()
        .filter_map(|m| name.find(m))
        .min()
        .unwrap_or(name.len());
    name[..end].trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> Html {
        let html = std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap();
        Html::parse_document(&html)
    }

    #[test]
    fn data_attribute_cards() {
        let listings = parse(&fixture("superseis"), "https://www.superseis.com.py");
        assert_eq!(listings.len(), 2);

        assert_eq!(listings[0].raw_name, "Tomate Lisa por kg");
        assert_eq!(listings[0].price, 16500);
        assert_eq!(
            listings[0].source_url,
            "https://www.superseis.com.py/productos/5501-tomate-lisa"
        );

        assert_eq!(listings[1].raw_name, "Locote Rojo");
        assert_eq!(listings[1].price, 27900);
    }

    #[test]
    fn unknown_layout_uses_generic_cards() {
        let doc = Html::parse_document(
            r#"<html><body>
              <div class="product-card"><h3>Tomate Lisa x kg</h3><span class="price">Gs 16.500</span></div>
            </body></html>"#,
        );
        let listings = parse(&doc, "https://www.superseis.com.py");
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].raw_name, "Tomate Lisa x kg");
        assert_eq!(listings[0].price, 16500);
    }

    #[test]
    fn promo_copy_is_cut() {
        assert_eq!(strip_promo("Tomate Lisa Añadí 2 y llevá 3"), "Tomate Lisa");
        assert_eq!(strip_promo("Locote Preparate algo Añadí"), "Locote");
        assert_eq!(strip_promo("Lechuga Crespa"), "Lechuga Crespa");
    }

    #[test]
    fn savings_banner_is_not_a_name() {
        let doc = Html::parse_document(
            r#"<div data-product-id="1" data-product-price="9.500">
                 <span>Te ahorras Gs. 1.000</span>
                 <span>Morrón verde x kg</span>
               </div>"#,
        );
        let listings = parse(&doc, "https://www.superseis.com.py");
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].raw_name, "Morrón verde x kg");
        assert_eq!(listings[0].price, 9500);
    }
}
