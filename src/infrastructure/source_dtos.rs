//! Source platform record shapes
//!
//! Serde DTOs for the WordPress/WooCommerce/Dokan-style REST collections the
//! engine consumes. The source is loosely typed: prices are strings, most
//! fields may be absent, and attribute shapes differ between the product and
//! variation endpoints, so nearly everything is optional here and mapping to
//! internal entities happens in explicit, typed functions per DTO.

use serde::Deserialize;

/// Reference to a term (category/tag) embedded in a product record.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceTermRef {
    pub id: i64,
    pub name: Option<String>,
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceCategory {
    pub id: i64,
    pub name: Option<String>,
    pub slug: Option<String>,
    #[serde(default)]
    pub parent: i64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceTag {
    pub id: i64,
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceImage {
    pub id: Option<i64>,
    pub src: Option<String>,
    pub alt: Option<String>,
}

/// Attribute as reported on products (`options` list) and on variations
/// (single `option` value).
#[derive(Debug, Clone, Deserialize)]
pub struct SourceAttribute {
    pub id: Option<i64>,
    pub name: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
    pub option: Option<String>,
    #[serde(default)]
    pub variation: bool,
}

/// Store reference embedded in Dokan product records.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceStoreRef {
    pub id: i64,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceProduct {
    pub id: i64,
    pub name: Option<String>,
    pub slug: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub permalink: Option<String>,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub price: Option<String>,
    pub regular_price: Option<String>,
    pub sale_price: Option<String>,
    pub stock_status: Option<String>,
    pub stock_quantity: Option<i64>,
    #[serde(default)]
    pub categories: Vec<SourceTermRef>,
    #[serde(default)]
    pub tags: Vec<SourceTermRef>,
    #[serde(default)]
    pub images: Vec<SourceImage>,
    #[serde(default)]
    pub attributes: Vec<SourceAttribute>,
    #[serde(default)]
    pub variations: Vec<i64>,
    pub store: Option<SourceStoreRef>,
}

impl SourceProduct {
    /// Whether the source reports this record as a variable product: either
    /// typed as such with configurations, or carrying more than one
    /// purchasable configuration regardless of type.
    pub fn is_variable(&self) -> bool {
        (self.kind.as_deref() == Some("variable") && !self.variations.is_empty())
            || self.variations.len() > 1
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceDimensions {
    pub length: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceVariation {
    pub id: i64,
    pub sku: Option<String>,
    pub price: Option<String>,
    pub regular_price: Option<String>,
    pub sale_price: Option<String>,
    pub stock_status: Option<String>,
    pub stock_quantity: Option<i64>,
    pub weight: Option<String>,
    pub dimensions: Option<SourceDimensions>,
    #[serde(default)]
    pub attributes: Vec<SourceAttribute>,
    pub purchasable: Option<bool>,
}

/// Dokan store (seller) record.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceStore {
    pub id: i64,
    pub store_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub admin_commission: Option<String>,
    pub admin_commission_type: Option<String>,
}

impl SourceStore {
    pub fn display_name(&self) -> Option<String> {
        if let Some(name) = self.store_name.as_ref().filter(|n| !n.trim().is_empty()) {
            return Some(name.trim().to_string());
        }
        let full = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        let full = full.trim();
        if full.is_empty() { None } else { Some(full.to_string()) }
    }
}

/// WordPress user record; used to enrich store identity resolution.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceUser {
    pub id: i64,
    pub email: Option<String>,
    pub name: Option<String>,
    pub slug: Option<String>,
}

/// WordPress fields wrapped in a `rendered` object.
#[derive(Debug, Clone, Deserialize)]
pub struct RenderedField {
    pub rendered: Option<String>,
}

impl RenderedField {
    pub fn text(&self) -> Option<&str> {
        self.rendered.as_deref().filter(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcePost {
    pub id: i64,
    pub slug: Option<String>,
    pub title: Option<RenderedField>,
    pub content: Option<RenderedField>,
    pub excerpt: Option<RenderedField>,
    pub date_gmt: Option<String>,
    #[serde(default)]
    pub categories: Vec<i64>,
    #[serde(default)]
    pub tags: Vec<i64>,
}

/// Term record from `posts/categories` and `posts/tags`.
#[derive(Debug, Clone, Deserialize)]
pub struct SourcePostTerm {
    pub id: i64,
    pub name: Option<String>,
    pub slug: Option<String>,
}
