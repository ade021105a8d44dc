//! Internal catalog entities owned by the reconciliation engine
//!
//! Every entity is keyed by the internal ID handed out by the identity map;
//! rows are mutated only by reconciliation logic so re-runs always touch the
//! same row. Enums are persisted as TEXT through their `as_str`/`parse`
//! helpers rather than derived codecs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Product lifecycle with respect to variants.
///
/// A product upgrades from `Simple` to `Variable` the first time the source
/// reports more than one purchasable configuration. The reverse transition is
/// never performed automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductKind {
    Simple,
    Variable,
}

impl ProductKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductKind::Simple => "simple",
            ProductKind::Variable => "variable",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "variable" => ProductKind::Variable,
            _ => ProductKind::Simple,
        }
    }
}

/// How an attribute carries its values.
///
/// Inferred per record from the number of distinct option values observed;
/// the stored kind follows the last-processed record (last-write-wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValueKind {
    Text,
    Option,
    MultiOption,
}

impl AttributeValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeValueKind::Text => "text",
            AttributeValueKind::Option => "option",
            AttributeValueKind::MultiOption => "multi_option",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "option" => AttributeValueKind::Option,
            "multi_option" => AttributeValueKind::MultiOption,
            _ => AttributeValueKind::Text,
        }
    }

    /// Kind implied by the number of distinct option values on one record.
    pub fn from_option_count(count: usize) -> Self {
        match count {
            0 => AttributeValueKind::Text,
            1 => AttributeValueKind::Option,
            _ => AttributeValueKind::MultiOption,
        }
    }
}

/// Availability of an offer variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockStatus {
    InStock,
    OutOfStock,
    OnBackorder,
}

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::InStock => "in_stock",
            StockStatus::OutOfStock => "out_of_stock",
            StockStatus::OnBackorder => "on_backorder",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "out_of_stock" => StockStatus::OutOfStock,
            "on_backorder" => StockStatus::OnBackorder,
            _ => StockStatus::InStock,
        }
    }

    /// Maps the source platform's stock strings. Unrecognized or absent
    /// values default to `InStock`.
    pub fn from_source(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("outofstock") => StockStatus::OutOfStock,
            Some("onbackorder") => StockStatus::OnBackorder,
            _ => StockStatus::InStock,
        }
    }
}

/// Role of a user inside a vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberRole {
    Owner,
    Staff,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Owner => "owner",
            MemberRole::Staff => "staff",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "owner" => MemberRole::Owner,
            _ => MemberRole::Staff,
        }
    }
}

/// Category in the internal catalog tree. Arena-style: a node stores its own
/// ID and an optional parent ID, no back-pointers. Cycle-creating parent
/// assignments are rejected at write time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogCategory {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub description: Option<String>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogTag {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Core catalog product. Carries an optimistic concurrency token (`version`)
/// checked on every update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub kind: ProductKind,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub vendor_id: Option<String>,
    pub is_deleted: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: String,
    pub url: String,
    pub alt_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Synthetic set grouping all imported attributes; created lazily on first
/// need and looked up by its fixed name afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeGroup {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribute {
    pub id: String,
    pub group_id: String,
    pub external_key: String,
    pub name: String,
    pub value_kind: AttributeValueKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Option identity is `(attribute_id, exact trimmed value)`. Case and
/// whitespace differences create distinct options; no fuzzy matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeOption {
    pub id: String,
    pub attribute_id: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: String,
    pub product_id: String,
    pub sku: Option<String>,
    pub position: i64,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantAttributeValue {
    pub id: String,
    pub variant_id: String,
    pub attribute_id: String,
    pub option_id: Option<String>,
    pub value: String,
    pub created_at: DateTime<Utc>,
}

/// Internal user resolved from external seller/customer records. Fields
/// already populated are never overwritten; only empty fields are back-filled
/// from newly observed source data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub phone: Option<String>,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vendor {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub commission_percent: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Membership row linking a user to a vendor. Exactly one Owner membership
/// is maintained per vendor; a user's membership is re-pointed rather than
/// duplicated when their store resolves to a different vendor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorMember {
    pub id: String,
    pub vendor_id: String,
    pub user_id: String,
    pub role: MemberRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorOffer {
    pub id: String,
    pub vendor_id: String,
    pub product_id: String,
    pub price: Option<f64>,
    pub is_deleted: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Purchasable configuration of an offer. `price: None` means "contact for
/// price", never free.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorOfferVariant {
    pub id: String,
    pub offer_id: String,
    pub variant_id: String,
    pub price: Option<f64>,
    pub stock_status: StockStatus,
    pub stock_quantity: Option<i64>,
    pub weight: Option<f64>,
    pub length: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogCategory {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogTag {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_status_maps_known_source_strings() {
        assert_eq!(StockStatus::from_source(Some("instock")), StockStatus::InStock);
        assert_eq!(StockStatus::from_source(Some("outofstock")), StockStatus::OutOfStock);
        assert_eq!(StockStatus::from_source(Some("onbackorder")), StockStatus::OnBackorder);
    }

    #[test]
    fn stock_status_defaults_to_in_stock() {
        assert_eq!(StockStatus::from_source(None), StockStatus::InStock);
        assert_eq!(StockStatus::from_source(Some("discontinued")), StockStatus::InStock);
        assert_eq!(StockStatus::from_source(Some("")), StockStatus::InStock);
        // Mixed case and padding still map
        assert_eq!(StockStatus::from_source(Some(" OutOfStock ")), StockStatus::OutOfStock);
    }

    #[test]
    fn value_kind_inference_from_option_count() {
        assert_eq!(AttributeValueKind::from_option_count(0), AttributeValueKind::Text);
        assert_eq!(AttributeValueKind::from_option_count(1), AttributeValueKind::Option);
        assert_eq!(AttributeValueKind::from_option_count(2), AttributeValueKind::MultiOption);
        assert_eq!(AttributeValueKind::from_option_count(7), AttributeValueKind::MultiOption);
    }

    #[test]
    fn enum_text_round_trips() {
        for kind in [ProductKind::Simple, ProductKind::Variable] {
            assert_eq!(ProductKind::parse(kind.as_str()), kind);
        }
        for kind in [
            AttributeValueKind::Text,
            AttributeValueKind::Option,
            AttributeValueKind::MultiOption,
        ] {
            assert_eq!(AttributeValueKind::parse(kind.as_str()), kind);
        }
        for status in [StockStatus::InStock, StockStatus::OutOfStock, StockStatus::OnBackorder] {
            assert_eq!(StockStatus::parse(status.as_str()), status);
        }
        for role in [MemberRole::Owner, MemberRole::Staff] {
            assert_eq!(MemberRole::parse(role.as_str()), role);
        }
    }
}
