//! Shared fixtures for crate tests

use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::application::batch::BatchCommitController;
use crate::application::caches::RunCaches;
use crate::application::identity_map::IdentityMap;
use crate::application::sync_orchestrator::StageContext;
use crate::domain::entities::{Product, ProductKind, User};
use crate::infrastructure::blog_repository::BlogRepository;
use crate::infrastructure::catalog_repository::CatalogRepository;
use crate::infrastructure::config::SourceApiConfig;
use crate::infrastructure::database_connection::DatabaseConnection;
use crate::infrastructure::identity_map_repository::IdentityMapRepository;
use crate::infrastructure::source_api::SourceApiClient;
use crate::infrastructure::source_dtos::SourceVariation;
use crate::infrastructure::vendor_repository::VendorRepository;

/// Fresh migrated SQLite database in a throwaway directory. Keep the
/// `TempDir` alive for the duration of the test.
pub async fn test_database() -> (TempDir, DatabaseConnection) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("test.db");
    let url = format!("sqlite:{}", path.display());
    let db = DatabaseConnection::new(&url).await.expect("connect test database");
    db.migrate().await.expect("migrate test database");
    (dir, db)
}

/// Stage context over the given database with a dummy source client (tests
/// feed fixture records directly, nothing is fetched).
pub fn test_context(db: &DatabaseConnection) -> StageContext {
    let pool = db.pool().clone();
    let source_config = SourceApiConfig {
        base_url: "http://localhost:9/wp-json/dokan/v1/".to_string(),
        ..Default::default()
    };
    StageContext {
        source: Arc::new(SourceApiClient::new(&source_config).expect("source client")),
        seo: None,
        identity: Arc::new(IdentityMap::new(
            "dokan",
            IdentityMapRepository::new(pool.clone()),
        )),
        catalog: CatalogRepository::new(pool.clone()),
        vendors: VendorRepository::new(pool.clone()),
        blog: BlogRepository::new(pool.clone()),
        batch: BatchCommitController::new(pool, 50),
        caches: RunCaches::new(),
        cancel: CancellationToken::new(),
        default_vendor_id: "v-default".to_string(),
    }
}

pub fn sample_product(id: &str, slug: &str) -> Product {
    let now = Utc::now();
    Product {
        id: id.to_string(),
        slug: slug.to_string(),
        name: slug.to_uppercase(),
        kind: ProductKind::Simple,
        description: None,
        short_description: None,
        seo_title: None,
        seo_description: None,
        vendor_id: None,
        is_deleted: false,
        version: 1,
        created_at: now,
        updated_at: now,
    }
}

pub fn sample_user(id: &str, email: &str) -> User {
    let now = Utc::now();
    User {
        id: id.to_string(),
        email: email.to_string(),
        phone: None,
        display_name: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn variation(id: i64, price: &str) -> SourceVariation {
    SourceVariation {
        id,
        sku: Some(format!("SKU-{id}")),
        price: Some(price.to_string()),
        regular_price: Some(price.to_string()),
        sale_price: None,
        stock_status: Some("instock".to_string()),
        stock_quantity: Some(5),
        weight: None,
        dimensions: None,
        attributes: Vec::new(),
        purchasable: Some(true),
    }
}
