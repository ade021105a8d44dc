//! Slug derivation for custom attribute keys
//!
//! Used when a source attribute carries no stable global identifier and the
//! external key has to be derived from its display name. Keeps non-ASCII
//! letters so Persian attribute names stay distinguishable.

/// Fallback slug when the input reduces to nothing.
const EMPTY_FALLBACK: &str = "attr";

const MAX_SLUG_CHARS: usize = 60;

/// Derives a stable slug: trim, locale-aware lowercase, whitespace runs to a
/// single hyphen, strip anything outside ASCII `[a-z0-9-]` plus non-ASCII
/// alphanumerics, collapse repeated hyphens, trim hyphens, truncate to 60
/// characters, fall back to `"attr"` when empty.
pub fn slugify(input: &str) -> String {
    let lowered = input.trim().to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut pending_hyphen = false;

    for ch in lowered.chars() {
        if ch.is_whitespace() || ch == '-' {
            pending_hyphen = !out.is_empty();
            continue;
        }
        let keep = ch.is_ascii_alphanumeric() || (!ch.is_ascii() && ch.is_alphanumeric());
        if keep {
            if pending_hyphen {
                out.push('-');
                pending_hyphen = false;
            }
            out.push(ch);
        }
    }

    if out.chars().count() > MAX_SLUG_CHARS {
        out = out.chars().take(MAX_SLUG_CHARS).collect();
    }
    let out = out.trim_matches('-');

    if out.is_empty() { EMPTY_FALLBACK.to_string() } else { out.to_string() }
}
