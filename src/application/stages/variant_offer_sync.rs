//! Variant & offer sync stage
//!
//! Walks the product collection again after product sync and hands each
//! record to the reconciler: simple products get their marketplace offer
//! ensured and re-priced, variable products additionally get their variant
//! set fully replaced from the current variation list. A record whose
//! product was never mapped is skipped and counted.

use async_trait::async_trait;

use crate::application::attribute_normalizer::AttributeNormalizer;
use crate::application::sync_orchestrator::{StageContext, SyncStage};
use crate::application::variant_reconciler::{ReconcileOutcome, VariantReconciler};
use crate::domain::entities::ProductKind;
use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::events::{StageName, StageReport};
use crate::domain::identity::EntityKind;
use crate::infrastructure::source_dtos::{SourceProduct, SourceVariation};

pub struct VariantOfferStage;

#[async_trait]
impl SyncStage for VariantOfferStage {
    fn name(&self) -> StageName {
        StageName::VariantOffer
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
            for record in &records {
                ctx.check_cancelled()?;
                let variations = if self.needs_variations(ctx, record).await? {
                    ctx.source
                        .get_all_paged::<SourceVariation>(
                            &format!("products/{}/variations", record.id),
                            &[],
                            &ctx.cancel,
                        )
                        .await?
                } else {
                    Vec::new()
                };
                self.reconcile_record(ctx, record, &variations, &mut report).await?;
                ctx.flush_if_full().await?;
            }
            if fetched < ctx.source.page_size() as usize {
                break;
            }
            page += 1;
        }
        Ok(report)
    }
}

impl VariantOfferStage {
    /// Variable-path products need their variation list fetched; that covers
    /// rows already flagged Variable (even when the source stopped reporting
    /// configurations) and records newly reporting them.
    async fn needs_variations(
        &self,
        ctx: &StageContext,
        record: &SourceProduct,
    ) -> SyncResult<bool> {
        if record.is_variable() {
            return Ok(true);
        }
        let Some(product_id) =
            ctx.identity.find(EntityKind::Product, &record.id.to_string()).await?
        else {
            return Ok(false);
        };
        Ok(ctx
            .catalog
            .find_product(&product_id, false)
            .await?
            .is_some_and(|p| p.kind == ProductKind::Variable))
    }

    /// Reconcile one product record. Public for tests, which feed fixture
    /// records instead of fetching pages.
    pub async fn reconcile_record(
        &self,
        ctx: &mut StageContext,
        record: &SourceProduct,
        variations: &[SourceVariation],
        report: &mut StageReport,
    ) -> SyncResult<()> {
        match self.reconcile_inner(ctx, record, variations).await {
            Ok(outcome) => {
                report.created += outcome.variants_written + u32::from(outcome.offer_created);
                report.updated += u32::from(outcome.offer_updated);
                report.deleted += outcome.variants_deleted;
                Ok(())
            }
            Err(e) if e.is_record_scoped() => {
                tracing::warn!("Skipping variant reconciliation for {}: {}", record.id, e);
                report.skipped += 1;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn reconcile_inner(
        &self,
        ctx: &mut StageContext,
        record: &SourceProduct,
        variations: &[SourceVariation],
    ) -> SyncResult<ReconcileOutcome> {
        let external_id = record.id.to_string();
        let product_id = ctx
            .identity
            .find(EntityKind::Product, &external_id)
            .await?
            .ok_or_else(|| SyncError::UnmappedReference {
                kind: EntityKind::Product,
                external_id: external_id.clone(),
            })?;
        let product = ctx.catalog.find_product(&product_id, false).await?.ok_or_else(|| {
            SyncError::UnmappedReference { kind: EntityKind::Product, external_id }
        })?;

        let reconciler = VariantReconciler::new(&ctx.identity, &ctx.catalog);
        if product.kind == ProductKind::Variable || record.is_variable() {
            let normalizer = AttributeNormalizer::new(&ctx.identity, &ctx.catalog);
            reconciler
                .reconcile_variable(
                    &product,
                    record,
                    variations,
                    &ctx.default_vendor_id,
                    &normalizer,
                    &mut ctx.caches,
                    &mut ctx.batch,
                )
                .await
        } else {
            reconciler
                .reconcile_simple(&product, record, &ctx.default_vendor_id, &mut ctx.batch)
                .await
        }
    }
}
