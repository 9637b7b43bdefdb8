use crate::config::ProductConfig;

/// True when any of the product's search terms appears in the listing name,
/// ignoring case. Plain substring containment, no fuzzy matching.
pub fn matches_product(raw_name: &str, product: &ProductConfig) -> bool {
    let raw_lower = raw_name.to_lowercase();
    product
        .terms()
        .iter()
        .any(|term| raw_lower.contains(&term.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(name: &str, terms: &[&str]) -> ProductConfig {
        ProductConfig {
            name: name.to_string(),
            search_terms: terms.iter().map(|t| t.to_string()).collect(),
            unit: "kg".to_string(),
        }
    }

    #[test]
    fn case_insensitive_substring() {
        let p = product("Tomate Lisa", &["tomate lisa", "tomate santa cruz"]);
        assert!(matches_product("TOMATE LISA x KG", &p));
        assert!(matches_product("Tomate Santa Cruz Extra", &p));
        assert!(!matches_product("Tomate Cherry bandeja", &p));
    }

    #[test]
    fn falls_back_to_product_name() {
        let p = product("Locote Rojo", &[]);
        assert!(matches_product("Locote rojo por kg", &p));
        assert!(!matches_product("Locote verde", &p));
    }
}
