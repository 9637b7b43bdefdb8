/// Processed or packaged goods. Any hit rejects the listing.
const EXCLUDE_TERMS: &[&str] = &[
    "extracto", "pure", "puré", "salsa", "pelado", "enlatado", "conserva", "lata",
    "botella", "tetra", "sachet", "sobre", "sardina", "atun", "atún", "ketchup",
    "pasta", "pulpa", "frito",
];

/// Phrasing that only shows up on loose, weighed or tray produce.
const INCLUDE_TERMS: &[&str] = &[
    "por kg", "por kilo", "x kg", "/kg", "kg x", "1 kg", "fresco", "fresca", "bandeja",
    "granel", "x 1",
];

const WEIGHT_TOKEN: &str = "kg";

/// Ordered rules, first hit wins. Anything unmatched is treated as produce.
const RULES: &[(&[&str], bool)] = &[
    (EXCLUDE_TERMS, false),
    (INCLUDE_TERMS, true),
    (&[WEIGHT_TOKEN], true),
];

/// Noise filter for scraped listing names. Biased towards inclusion: a false
/// negative silently drops a valid price before matching ever sees it.
pub fn is_fresh_produce(name: &str) -> bool {
    let lower = name.to_lowercase();
    RULES
        .iter()
        .find(|(terms, _)| terms.iter().any(|t| lower.contains(t)))
        .map(|(_, verdict)| *verdict)
        .unwrap_or(true)
}
