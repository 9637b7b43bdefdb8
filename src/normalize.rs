use std::sync::LazyLock;

use regex::Regex;

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d[\d.,]*").unwrap());

const CURRENCY_MARKERS: &[&str] = &["Gs", "₲", "G$"];
// "/un" must be stripped before "/u".
const UNIT_SUFFIXES: &[&str] = &["/kg", "/un", "/u"];

/// Turn a raw price string ("₲ 17.950", "Gs 1.234,56", "17950") into whole guaraníes.
///
/// Separator rules:
/// - both `.` and `,`: `.` groups thousands, `,` starts a fraction that is dropped
/// - only `.`: thousands separator when the last group has exactly 3 digits,
///   otherwise the text is read as a decimal (`17.95` -> 17)
/// - only `,`: thousands separator
///
/// Returns `None` when there are no digits or the remainder does not parse.
pub fn parse_price(text: &str) -> Option<i64> {
    let mut cleaned = text.to_string();
    for marker in CURRENCY_MARKERS.iter().chain(UNIT_SUFFIXES) {
        cleaned = cleaned.replace(marker, "");
    }

    let raw = NUMBER_RE.find(cleaned.trim())?.as_str();

    let has_dot = raw.contains('.');
    let has_comma = raw.contains(',');
    let number = if has_dot && has_comma {
        let no_dots = raw.replace('.', "");
        match no_dots.find(',') {
            Some(idx) => no_dots[..idx].to_string(),
            None => no_dots,
        }
    } else if has_dot {
        let last = raw.rsplit('.').next().unwrap_or("");
        if last.len() == 3 {
            raw.replace('.', "")
        } else {
            raw.to_string()
        }
    } else if has_comma {
        raw.replace(',', "")
    } else {
        raw.to_string()
    };

    number.parse::<f64>().ok().map(|v| v.trunc() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_thousands() {
        assert_eq!(parse_price("₲ 17.950"), Some(17950));
        assert_eq!(parse_price("Gs. 1.250.000"), Some(1_250_000));
    }

    #[test]
    fn dot_thousands_comma_decimal() {
        assert_eq!(parse_price("Gs 1.234,56"), Some(1234));
    }

    #[test]
    fn comma_thousands() {
        assert_eq!(parse_price("₲17,950"), Some(17950));
    }

    #[test]
    fn plain_digits_and_unit_suffix() {
        assert_eq!(parse_price("17950"), Some(17950));
        assert_eq!(parse_price("Gs 8.900/kg"), Some(8900));
        assert_eq!(parse_price("G$ 4.500/un"), Some(4500));
    }

    #[test]
    fn short_fraction_read_as_decimal() {
        // Ambiguous on purpose: two trailing digits are a fraction.
        assert_eq!(parse_price("17.95"), Some(17));
    }

    #[test]
    fn leading_separator_is_skipped() {
        assert_eq!(parse_price("₲. 48.300"), Some(48300));
    }

    #[test]
    fn no_digits() {
        assert_eq!(parse_price("no digits here"), None);
        assert_eq!(parse_price(""), None);
    }

    #[test]
    fn malformed_remainder() {
        assert_eq!(parse_price("1.23.4"), None);
    }
}
