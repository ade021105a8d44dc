//! Numeric extraction from free-text price and measurement fields
//!
//! The source reports prices as strings with mixed separator conventions
//! ("1,200.50", "1200,50", Persian digits) and sometimes embeds numbers in
//! descriptive text ("256 گیگ"). The parser extracts the first numeric token;
//! unparsable input yields `None` ("no price"), never zero and never an
//! error.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::infrastructure::parsing::digits::fold_digits;

static NUMERIC_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9][0-9.,]*").expect("numeric token pattern is valid"));

/// Parses the first numeric token of `raw` into a decimal value.
///
/// Separator handling:
/// - both `.` and `,` present: the later one is the decimal separator, the
///   other is a thousands separator ("1,200.50" and "1.200,50" both work);
/// - a single comma followed by one or two digits is a decimal comma
///   ("1200,50"); otherwise commas are thousands separators ("10,000");
/// - a single dot is a decimal point.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let folded = fold_digits(raw);
    let token = NUMERIC_TOKEN.find(&folded)?.as_str();
    let token = token.trim_matches(|c| c == '.' || c == ',');
    if token.is_empty() {
        return None;
    }

    let last_dot = token.rfind('.');
    let last_comma = token.rfind(',');

    let normalized = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) => {
            let decimal_at = if dot > comma { dot } else { comma };
            rebuild(token, Some(decimal_at))
        }
        (Some(_), None) => {
            if token.matches('.').count() == 1 {
                token.to_string()
            } else {
                rebuild(token, None)
            }
        }
        (None, Some(comma)) => {
            let trailing = token.len() - comma - 1;
            if token.matches(',').count() == 1 && (1..=2).contains(&trailing) {
                rebuild(token, Some(comma))
            } else {
                rebuild(token, None)
            }
        }
        (None, None) => token.to_string(),
    };

    normalized.parse::<f64>().ok()
}

/// Keeps digits only, replacing the separator at byte index `decimal_at`
/// (when given) with a dot; every other separator is dropped.
fn rebuild(token: &str, decimal_at: Option<usize>) -> String {
    let mut out = String::with_capacity(token.len());
    for (idx, ch) in token.char_indices() {
        if Some(idx) == decimal_at {
            out.push('.');
        } else if ch.is_ascii_digit() {
            out.push(ch);
        }
    }
    out
}

/// Price-resolution policy shared by simple offers and variants: prefer an
/// explicit sale price when present and lower than the regular price, else
/// the regular price, else the generic fallback field.
pub fn resolve_price(
    sale: Option<&str>,
    regular: Option<&str>,
    fallback: Option<&str>,
) -> Option<f64> {
    let sale = sale.and_then(parse_nonempty);
    let regular = regular.and_then(parse_nonempty);

    match (sale, regular) {
        (Some(s), Some(r)) if s < r => Some(s),
        (_, Some(r)) => Some(r),
        (Some(s), None) => Some(s),
        (None, None) => fallback.and_then(parse_nonempty),
    }
}

fn parse_nonempty(raw: &str) -> Option<f64> {
    if raw.trim().is_empty() { None } else { parse_decimal(raw) }
}
