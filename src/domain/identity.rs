//! External identity model
//!
//! The identity map is the durable cross-run contract: the triple
//! `(provider, entity_kind, external_id)` is globally unique and resolves to
//! an internal ID that never changes once assigned. The table is append-only
//! for existing keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind discriminator for externally-mapped entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Category,
    Tag,
    Product,
    Attribute,
    AttributeOption,
    AttributeGroup,
    ProductVariant,
    Vendor,
    User,
    MediaAsset,
    VendorOffer,
    VendorOfferVariant,
    BlogPost,
    BlogCategory,
    BlogTag,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Category => "category",
            EntityKind::Tag => "tag",
            EntityKind::Product => "product",
            EntityKind::Attribute => "attribute",
            EntityKind::AttributeOption => "attribute_option",
            EntityKind::AttributeGroup => "attribute_group",
            EntityKind::ProductVariant => "product_variant",
            EntityKind::Vendor => "vendor",
            EntityKind::User => "user",
            EntityKind::MediaAsset => "media_asset",
            EntityKind::VendorOffer => "vendor_offer",
            EntityKind::VendorOfferVariant => "vendor_offer_variant",
            EntityKind::BlogPost => "blog_post",
            EntityKind::BlogCategory => "blog_category",
            EntityKind::BlogTag => "blog_tag",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let kind = match value {
            "category" => EntityKind::Category,
            "tag" => EntityKind::Tag,
            "product" => EntityKind::Product,
            "attribute" => EntityKind::Attribute,
            "attribute_option" => EntityKind::AttributeOption,
            "attribute_group" => EntityKind::AttributeGroup,
            "product_variant" => EntityKind::ProductVariant,
            "vendor" => EntityKind::Vendor,
            "user" => EntityKind::User,
            "media_asset" => EntityKind::MediaAsset,
            "vendor_offer" => EntityKind::VendorOffer,
            "vendor_offer_variant" => EntityKind::VendorOfferVariant,
            "blog_post" => EntityKind::BlogPost,
            "blog_category" => EntityKind::BlogCategory,
            "blog_tag" => EntityKind::BlogTag,
            _ => return None,
        };
        Some(kind)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the external identity map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityMapping {
    pub provider: String,
    pub entity_kind: EntityKind,
    pub external_id: String,
    pub internal_id: String,
    pub external_slug: Option<String>,
    pub last_synced_at: DateTime<Utc>,
}
