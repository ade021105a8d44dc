//! Text parsing helpers for loosely-typed source data
//!
//! The source platform reports prices, phone numbers, and attribute names as
//! free text, frequently in Persian script. These modules normalize that
//! input into typed values; every parser is total (bad input yields `None` or
//! a fallback, never an error).

pub mod contact;
pub mod digits;
pub mod price;
pub mod slug;

// Re-export public helpers
pub use contact::{canonicalize_phone, normalize_email, synthetic_store_email};
pub use digits::fold_digits;
pub use price::{parse_decimal, resolve_price};
pub use slug::slugify;
