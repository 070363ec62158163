use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\d\s,.]+").unwrap());

/// Parse the first numeric run of a price label ("1 234,56 грн") into a decimal.
/// Comma is the decimal separator, whitespace is a thousands separator.
pub fn parse_price(text: &str) -> Option<Decimal> {
    let run = AMOUNT_RE.find(text)?.as_str();
    let raw: String = run
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if raw.is_empty() {
        return None;
    }

    Decimal::from_str(&raw)
        .ok()
        // Lossy: digits beyond Decimal's precision still yield a value.
        .or_else(|| raw.parse::<f64>().ok().and_then(Decimal::from_f64))
}
