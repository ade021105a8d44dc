//! Sync pipeline stages
//!
//! One module per stage, hand-ordered by the orchestrator: category/tag sync
//! precedes product sync (products reference term IDs), product sync precedes
//! variant/offer sync, and vendor identity sync precedes vendor-link sync.
//! Every stage is independently idempotent; re-running one against unchanged
//! source data produces no net change beyond refreshed timestamps.

pub mod blog_sync;
pub mod category_tag_sync;
pub mod product_sync;
pub mod variant_offer_sync;
pub mod vendor_identity_sync;
pub mod vendor_link_sync;

pub use blog_sync::BlogStage;
pub use category_tag_sync::CategoryTagStage;
pub use product_sync::ProductStage;
pub use variant_offer_sync::VariantOfferStage;
pub use vendor_identity_sync::VendorIdentityStage;
pub use vendor_link_sync::VendorLinkStage;
