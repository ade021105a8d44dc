//! Vendor-link sync stage
//!
//! Attaches products (and their marketplace offers) to the vendors resolved
//! by the vendor identity stage. A record whose store has no mapping yet is
//! an unmapped reference: skipped and counted, never fatal.

use async_trait::async_trait;
use chrono::Utc;

use crate::application::batch::PendingWrite;
use crate::application::sync_orchestrator::{StageContext, SyncStage};
use crate::domain::entities::{Product, VendorOffer};
use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::events::{StageName, StageReport};
use crate::domain::identity::EntityKind;
use crate::infrastructure::source_dtos::SourceProduct;

pub struct VendorLinkStage;

#[async_trait]
impl SyncStage for VendorLinkStage {
    fn name(&self) -> StageName {
        StageName::VendorLink
    }

    async fn run(&self, ctx: &mut StageContext) -> SyncResult<StageReport> {
        let mut report = StageReport::default();
        let mut page = 1;
        loop {
            let records: Vec<SourceProduct> =
                ctx.source.get_page("products", &[], page, &ctx.cancel).await?;
            if records.is_empty() {
                break;
            }
            let fetched = records.len();
            self.link_products(ctx, &records, &mut report).await?;
            if fetched < ctx.source.page_size() as usize {
                break;
            }
            page += 1;
        }
        Ok(report)
    }
}

impl VendorLinkStage {
    pub async fn link_products(
        &self,
        ctx: &mut StageContext,
        records: &[SourceProduct],
        report: &mut StageReport,
    ) -> SyncResult<()> {
        for record in records {
            ctx.check_cancelled()?;
            match self.link_product(ctx, record).await {
                Ok(true) => report.updated += 1,
                Ok(false) => {}
                Err(e) if e.is_record_scoped() => {
                    tracing::warn!("Skipping vendor link for product {}: {}", record.id, e);
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
            ctx.flush_if_full().await?;
        }
        Ok(())
    }

    /// Returns whether anything was re-pointed. Products without store data
    /// stay on the marketplace default vendor.
    async fn link_product(&self, ctx: &mut StageContext, record: &SourceProduct) -> SyncResult<bool> {
        let Some(store) = &record.store else {
            return Ok(false);
        };

        let vendor_id = ctx
            .identity
            .find(EntityKind::Vendor, &store.id.to_string())
            .await?
            .ok_or_else(|| SyncError::UnmappedReference {
                kind: EntityKind::Vendor,
                external_id: store.id.to_string(),
            })?;
        let product_external = record.id.to_string();
        let product_id = ctx
            .identity
            .find(EntityKind::Product, &product_external)
            .await?
            .ok_or_else(|| SyncError::UnmappedReference {
                kind: EntityKind::Product,
                external_id: product_external.clone(),
            })?;
        let product = ctx.catalog.find_product(&product_id, false).await?.ok_or_else(|| {
            SyncError::UnmappedReference {
                kind: EntityKind::Product,
                external_id: product_external,
            }
        })?;

        let now = Utc::now();
        let mut changed = false;

        if product.vendor_id.as_deref() != Some(vendor_id.as_str()) {
            let entity = Product {
                vendor_id: Some(vendor_id.clone()),
                updated_at: now,
                ..product.clone()
            };
            ctx.batch
                .stage(PendingWrite::UpdateProduct { entity, expected_version: product.version });
            changed = true;
        }

        if let Some(offer) = ctx.catalog.find_offer_by_product(&product_id).await? {
            if offer.vendor_id != vendor_id {
                let entity = VendorOffer {
                    vendor_id: vendor_id.clone(),
                    updated_at: now,
                    ..offer.clone()
                };
                ctx.batch
                    .stage(PendingWrite::UpdateOffer { entity, expected_version: offer.version });
                changed = true;
            }
        }

        Ok(changed)
    }
}
