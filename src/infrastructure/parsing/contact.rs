//! Email and phone normalization for vendor identity resolution
//!
//! Phone numbers arrive in many raw representations (with/without country
//! code, with separators, Persian digits); they are canonicalized to one
//! local digit-string form before comparison. Emails are lowercased and
//! syntactically validated; a deterministic synthetic address stands in when
//! a store exposes no real identity signal.

use crate::infrastructure::parsing::digits::fold_digits;

/// Country calling code of the source marketplace's locale.
const COUNTRY_CODE: &str = "98";

const MIN_PHONE_DIGITS: usize = 10;

/// Canonicalizes a raw phone number to the local leading-zero digit form,
/// e.g. `+98 912-345 6789`, `00989123456789` and `09123456789` all become
/// `09123456789`. Returns `None` when too few digits remain.
pub fn canonicalize_phone(raw: &str) -> Option<String> {
    let folded = fold_digits(raw);
    let digits: String = folded.chars().filter(char::is_ascii_digit).collect();

    let local = if let Some(rest) = digits.strip_prefix("00").map(|d| d.strip_prefix(COUNTRY_CODE)) {
        format!("0{}", rest?)
    } else if digits.len() > MIN_PHONE_DIGITS {
        match digits.strip_prefix(COUNTRY_CODE) {
            Some(rest) if !rest.starts_with('0') => format!("0{rest}"),
            _ => digits,
        }
    } else if digits.len() == MIN_PHONE_DIGITS && !digits.starts_with('0') {
        format!("0{digits}")
    } else {
        digits
    };

    if local.len() <= MIN_PHONE_DIGITS { None } else { Some(local) }
}

/// Lowercases and syntactically validates an email address. Returns `None`
/// for anything that does not look like `local@domain.tld`.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    let (local, domain) = email.split_once('@')?;
    if local.is_empty()
        || domain.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || email.chars().any(char::is_whitespace)
    {
        return None;
    }
    Some(email)
}

/// Deterministic fallback identity for a store with no real email or phone.
/// Repeated runs always resolve the same store to the same address.
pub fn synthetic_store_email(provider: &str, external_id: &str) -> String {
    format!("store-{external_id}@{provider}.invalid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_representations_share_one_canonical_form() {
        let expected = Some("09123456789".to_string());
        assert_eq!(canonicalize_phone("09123456789"), expected);
        assert_eq!(canonicalize_phone("+98 912 345 6789"), expected);
        assert_eq!(canonicalize_phone("0098-912-345-6789"), expected);
        assert_eq!(canonicalize_phone("98 9123456789"), expected);
        assert_eq!(canonicalize_phone("(0912) 345-6789"), expected);
        assert_eq!(canonicalize_phone("۰۹۱۲۳۴۵۶۷۸۹"), expected);
    }

    #[test]
    fn short_or_empty_phones_are_rejected() {
        assert_eq!(canonicalize_phone(""), None);
        assert_eq!(canonicalize_phone("12345"), None);
        assert_eq!(canonicalize_phone("no number here"), None);
    }

    #[test]
    fn emails_are_lowercased_and_validated() {
        assert_eq!(normalize_email(" Seller@Example.COM "), Some("seller@example.com".into()));
        assert_eq!(normalize_email("bad"), None);
        assert_eq!(normalize_email("a@b"), None);
        assert_eq!(normalize_email("@example.com"), None);
        assert_eq!(normalize_email("a@.com"), None);
        assert_eq!(normalize_email("a b@example.com"), None);
    }

    #[test]
    fn synthetic_email_is_deterministic() {
        let a = synthetic_store_email("dokan", "42");
        let b = synthetic_store_email("dokan", "42");
        assert_eq!(a, b);
        assert_eq!(a, "store-42@dokan.invalid");
        assert_ne!(a, synthetic_store_email("dokan", "43"));
    }
}
