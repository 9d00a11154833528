//! Numeric and text cleaning helpers for extracted fields.

use regex::Regex;
use std::sync::OnceLock;

/// Matches `Rs. 1,234` / `Rs 1234.50` style price strings.
fn price_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Rs\.?\s*([\d,]+(?:\.\d+)?)").unwrap())
}

/// Parse one price string into a value, rejecting junk outside the
/// plausible range for a retail listing.
pub fn parse_price(raw: &str) -> Option<f64> {
    let caps = price_regex().captures(raw)?;
    let digits: String = caps[1].chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
    let value: f64 = digits.parse().ok()?;
    if value > 0.0 && value < 1_000_000.0 {
        Some(value)
    } else {
        None
    }
}

/// All prices mentioned in a block of text, in order of appearance.
pub fn extract_prices(text: &str) -> Vec<f64> {
    price_regex()
        .captures_iter(text)
        .filter_map(|c| {
            let digits: String = c[1].chars().filter(|ch| ch.is_ascii_digit() || *ch == '.').collect();
            digits.parse::<f64>().ok()
        })
        .filter(|v| *v > 0.0 && *v < 1_000_000.0)
        .collect()
}

/// Resolve a product card's price mentions into (current, original).
///
/// When a card shows several distinct prices the lowest is the live one
/// and the highest the struck-through original. A single price means no
/// discount is on display.
pub fn price_pair(text: &str) -> (Option<f64>, Option<f64>) {
    let prices = extract_prices(text);
    if prices.is_empty() {
        return (None, None);
    }
    let min = prices.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = prices.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max > min {
        (Some(min), Some(max))
    } else {
        (Some(min), None)
    }
}

/// Remove price mentions from a label, e.g. a card title that embeds
/// `Rs. 80` next to the product name.
pub fn strip_prices(text: &str) -> String {
    price_regex().replace_all(text, " ").into_owned()
}

/// Ratings are only meaningful on the 0-5 scale.
pub fn parse_rating(raw: &str) -> Option<f64> {
    let value: f64 = raw.trim().parse().ok()?;
    if (0.0..=5.0).contains(&value) {
        Some(value)
    } else {
        None
    }
}

/// Review counts and stock quantities: first run of digits in the text.
pub fn parse_count(raw: &str) -> Option<u32> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(\d[\d,]*)").unwrap());
    let caps = re.captures(raw)?;
    let digits: String = caps[1].chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Collapse whitespace runs and trim. Returns `None` when nothing
/// printable remains.
pub fn sanitize_text(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}
