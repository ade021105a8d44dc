//! Sync orchestrator
//!
//! Runs the hand-ordered stage list sequentially with cooperative
//! cancellation checks between stages and between records (inside the
//! stages). A stage failure does not roll back prior stages; the retry
//! strategy is re-running the whole pipeline, relying on stage idempotency
//! rather than distributed transactions.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::application::batch::BatchCommitController;
use crate::application::caches::RunCaches;
use crate::application::identity_map::IdentityMap;
use crate::application::stages::{
    BlogStage, CategoryTagStage, ProductStage, VariantOfferStage, VendorIdentityStage,
    VendorLinkStage,
};
use crate::domain::entities::Vendor;
use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::events::{RunReport, RunStatus, StageName, StageOutcome, StageReport};
use crate::domain::identity::EntityKind;
use crate::infrastructure::blog_repository::BlogRepository;
use crate::infrastructure::catalog_repository::CatalogRepository;
use crate::infrastructure::parsing::slugify;
use crate::infrastructure::seo_scraper::SeoScraper;
use crate::infrastructure::source_api::SourceApiClient;
use crate::infrastructure::sync_run_repository::SyncRunRepository;
use crate::infrastructure::vendor_repository::VendorRepository;

/// External identity-map key of the reserved marketplace vendor that owns
/// offers until the vendor-link stage re-points them.
const DEFAULT_VENDOR_EXTERNAL_ID: &str = "0";

/// Everything a stage needs, owned by the orchestrator and handed down
/// mutably: clients, the identity map, repositories, the per-run caches, the
/// batch controller, and the cancellation token.
pub struct StageContext {
    pub source: Arc<SourceApiClient>,
    pub seo: Option<Arc<SeoScraper>>,
    pub identity: Arc<IdentityMap>,
    pub catalog: CatalogRepository,
    pub vendors: VendorRepository,
    pub blog: BlogRepository,
    pub batch: BatchCommitController,
    pub caches: RunCaches,
    pub cancel: CancellationToken,
    /// Internal ID of the reserved marketplace vendor; set during bootstrap.
    pub default_vendor_id: String,
}

impl StageContext {
    pub fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancel.is_cancelled() { Err(SyncError::Cancelled) } else { Ok(()) }
    }

    pub async fn flush_if_full(&mut self) -> SyncResult<()> {
        self.batch.flush_if_full(&mut self.caches, &self.identity).await
    }

    pub async fn flush(&mut self) -> SyncResult<()> {
        self.batch.flush(&mut self.caches, &self.identity).await
    }
}

/// One ordered phase of the sync pipeline.
#[async_trait]
pub trait SyncStage: Send + Sync {
    fn name(&self) -> StageName;
    async fn run(&self, ctx: &mut StageContext) -> SyncResult<StageReport>;
}

pub struct SyncOrchestrator {
    ctx: StageContext,
    stages: Vec<Box<dyn SyncStage>>,
    runs: SyncRunRepository,
    default_vendor_name: String,
}

impl SyncOrchestrator {
    pub fn new(
        ctx: StageContext,
        runs: SyncRunRepository,
        default_vendor_name: impl Into<String>,
    ) -> Self {
        Self {
            ctx,
            stages: Self::default_stages(),
            runs,
            default_vendor_name: default_vendor_name.into(),
        }
    }

    /// Dependency order: terms before products (products reference term
    /// IDs), products before variants/offers, vendor identities before
    /// vendor links. Blog sync is independent and runs last.
    fn default_stages() -> Vec<Box<dyn SyncStage>> {
        vec![
            Box::new(CategoryTagStage),
            Box::new(VendorIdentityStage),
            Box::new(ProductStage),
            Box::new(VariantOfferStage),
            Box::new(VendorLinkStage),
            Box::new(BlogStage),
        ]
    }

    #[cfg(test)]
    pub fn with_stages(mut self, stages: Vec<Box<dyn SyncStage>>) -> Self {
        self.stages = stages;
        self
    }

    /// Run one full pipeline pass. The returned report reflects the outcome;
    /// only a failure to persist the run record itself surfaces as `Err`.
    pub async fn run(&mut self) -> SyncResult<RunReport> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        tracing::info!("🚀 Starting sync run {}", run_id);

        let mut outcomes: Vec<StageOutcome> = Vec::new();
        let mut failure: Option<SyncError> = None;

        if let Err(e) = self.ensure_default_vendor().await {
            failure = Some(e);
        }

        if failure.is_none() {
            for stage in &self.stages {
                if self.ctx.cancel.is_cancelled() {
                    failure = Some(SyncError::Cancelled);
                    break;
                }
                let name = stage.name();
                tracing::info!("Stage {} starting", name);
                let result = match stage.run(&mut self.ctx).await {
                    // Commit whatever the stage left buffered before moving on
                    Ok(report) => self.ctx.flush().await.map(|()| report),
                    Err(e) => Err(e),
                };
                match result {
                    Ok(report) => {
                        tracing::info!(
                            stage = %name,
                            created = report.created,
                            updated = report.updated,
                            skipped = report.skipped,
                            deleted = report.deleted,
                            "Stage completed"
                        );
                        outcomes.push(StageOutcome { stage: name, report });
                    }
                    Err(e) => {
                        // Never leave a batch half-applied across entity types
                        self.ctx.batch.discard();
                        tracing::error!("Stage {} failed: {}", name, e);
                        failure = Some(e);
                        break;
                    }
                }
            }
        }

        let status = match &failure {
            None => RunStatus::Completed,
            Some(SyncError::Cancelled) => RunStatus::Cancelled,
            Some(_) => RunStatus::Failed,
        };
        let report = RunReport {
            run_id,
            status,
            started_at,
            finished_at: Utc::now(),
            stages: outcomes,
            error: failure.map(|e| e.to_string()),
        };
        self.runs.insert(&report).await?;
        tracing::info!("Sync run {} finished: {:?}", report.run_id, report.status);
        Ok(report)
    }

    /// Mint the reserved marketplace vendor once, outside any batch, so the
    /// very first offer can reference it.
    async fn ensure_default_vendor(&mut self) -> SyncResult<()> {
        let vendor_id = self
            .ctx
            .identity
            .get_or_create(EntityKind::Vendor, DEFAULT_VENDOR_EXTERNAL_ID, None)
            .await?;
        let now = Utc::now();
        self.ctx
            .vendors
            .insert_vendor_if_absent(&Vendor {
                id: vendor_id.clone(),
                slug: slugify(&self.default_vendor_name),
                name: self.default_vendor_name.clone(),
                commission_percent: None,
                created_at: now,
                updated_at: now,
            })
            .await?;
        self.ctx.default_vendor_id = vendor_id;
        Ok(())
    }
}
