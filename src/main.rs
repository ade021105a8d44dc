//! bazaar-sync - recurring marketplace catalog import
//!
//! Wires configuration, logging, the database, and the source API client
//! into one orchestrator and runs a single pipeline pass. Intended to be
//! invoked from cron or a scheduler; re-runs are safe by design.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use bazaar_sync::application::batch::BatchCommitController;
use bazaar_sync::application::caches::RunCaches;
use bazaar_sync::application::identity_map::IdentityMap;
use bazaar_sync::application::sync_orchestrator::{StageContext, SyncOrchestrator};
use bazaar_sync::domain::events::RunStatus;
use bazaar_sync::infrastructure::blog_repository::BlogRepository;
use bazaar_sync::infrastructure::catalog_repository::CatalogRepository;
use bazaar_sync::infrastructure::config::AppConfig;
use bazaar_sync::infrastructure::database_connection::DatabaseConnection;
use bazaar_sync::infrastructure::http_client::{HttpClient, HttpClientConfig};
use bazaar_sync::infrastructure::identity_map_repository::IdentityMapRepository;
use bazaar_sync::infrastructure::logging::init_logging;
use bazaar_sync::infrastructure::seo_scraper::SeoScraper;
use bazaar_sync::infrastructure::source_api::SourceApiClient;
use bazaar_sync::infrastructure::sync_run_repository::SyncRunRepository;
use bazaar_sync::infrastructure::vendor_repository::VendorRepository;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var("BAZAAR_SYNC_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("config/bazaar-sync.json"));
    let config = AppConfig::load(&config_path).await?;
    init_logging(&config.logging)?;

    tracing::info!("bazaar-sync starting (source: {})", config.source.base_url);

    let db = DatabaseConnection::new(&config.database.url).await?;
    db.migrate().await?;
    let pool = db.pool().clone();

    let source = Arc::new(SourceApiClient::new(&config.source)?);
    let seo = if config.source.scrape_seo_metadata {
        let http = HttpClient::new(HttpClientConfig::from(&config.source))?;
        Some(Arc::new(SeoScraper::new(http)))
    } else {
        None
    };
    let identity = Arc::new(IdentityMap::new(
        config.sync.provider.clone(),
        IdentityMapRepository::new(pool.clone()),
    ));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("🛑 Ctrl-C received; current batch will be discarded");
                cancel.cancel();
            }
        });
    }

    let ctx = StageContext {
        source,
        seo,
        identity,
        catalog: CatalogRepository::new(pool.clone()),
        vendors: VendorRepository::new(pool.clone()),
        blog: BlogRepository::new(pool.clone()),
        batch: BatchCommitController::new(pool.clone(), config.sync.batch_size),
        caches: RunCaches::new(),
        cancel,
        default_vendor_id: String::new(),
    };
    let runs = SyncRunRepository::new(pool);
    let mut orchestrator =
        SyncOrchestrator::new(ctx, runs, config.sync.default_vendor_name.clone());

    let report = orchestrator.run().await?;
    for outcome in &report.stages {
        tracing::info!(
            "  {}: {} created, {} updated, {} skipped, {} deleted",
            outcome.stage,
            outcome.report.created,
            outcome.report.updated,
            outcome.report.skipped,
            outcome.report.deleted
        );
    }

    match report.status {
        RunStatus::Completed => Ok(()),
        status => anyhow::bail!(
            "sync run {} ended with status {:?}: {}",
            report.run_id,
            status,
            report.error.unwrap_or_default()
        ),
    }
}
