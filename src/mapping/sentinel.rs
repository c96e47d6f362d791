//! Placeholder values the provider uses instead of leaving a field out.
//!
//! Every check for "does this string actually mean nothing" goes through
//! this module. New placeholders found in production data belong in
//! [`EMPTY_SENTINELS`].

use serde_json::Value;

/// Compared case-insensitively after trimming
pub const EMPTY_SENTINELS: &[&str] = &[
    "",
    "null",
    "undefined",
    "none",
    "-",
    "--",
    "—",
    "–",
    "n/a",
    "ei ilmoitettu",
    "ei tiedossa",
    "ej angivet",
    "ej angiven",
    "not specified",
    "not available",
];

/// Unit decorations stripped before parsing an amount
const AMOUNT_DECORATIONS: &[&str] = &["€/kk", "e/kk", "/kk", "€/mån", "/mån", "€/month", "eur", "€", "m²", "m2"];

pub fn is_empty_sentinel(text: &str) -> bool {
    let folded = text.trim().to_lowercase();
    EMPTY_SENTINELS.contains(&folded.as_str())
}

/// Parse an amount the way the provider writes them: `"1 200,50 €"`,
/// `"1200"`, `850.0`. Zero, sentinels and anything unparseable are `None`.
pub fn parse_amount(value: &Value) -> Option<f64> {
    parse_number(value).filter(|n| *n != 0.0)
}

/// Like [`parse_amount`] but zero is a real value (coordinates)
pub fn parse_number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_amount_str(s),
        _ => None,
    }?;

    parsed.is_finite().then_some(parsed)
}

fn parse_amount_str(text: &str) -> Option<f64> {
    if is_empty_sentinel(text) {
        return None;
    }

    let mut cleaned = text.to_lowercase();
    for decoration in AMOUNT_DECORATIONS {
        cleaned = cleaned.replace(decoration, "");
    }
    let cleaned: String = cleaned
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    cleaned.parse::<f64>().ok()
}

/// A string in a numeric field that is neither a number nor a known
/// placeholder. Callers report these as data-quality signals.
pub fn unknown_numeric_token(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) if !is_empty_sentinel(s) && parse_amount_str(s).is_none() => Some(s),
        _ => None,
    }
}
