//! Batch commit controller
//!
//! Stages push typed writes into a bounded buffer; once it reaches the
//! configured batch size the buffer is flushed inside one transaction and
//! the per-run caches are cleared to bound memory growth. When a
//! version-guarded update hits zero rows the whole batch is rolled back and
//! every conflicting entity is reported with its in-memory state plus the
//! token currently persisted, so the failure is diagnosable without
//! re-running the import under a debugger.

use sqlx::{SqliteConnection, SqlitePool};

use crate::application::caches::RunCaches;
use crate::application::identity_map::IdentityMap;
use crate::domain::entities::{
    BlogCategory, BlogPost, BlogTag, CatalogCategory, CatalogTag, MediaAsset, Product,
    ProductVariant, User, VariantAttributeValue, Vendor, VendorMember, VendorOffer,
    VendorOfferVariant,
};
use crate::domain::errors::{ConflictDiagnostic, SyncError, SyncResult};
use crate::domain::identity::EntityKind;
use crate::infrastructure::blog_repository::BlogRepository;
use crate::infrastructure::catalog_repository::CatalogRepository;
use crate::infrastructure::vendor_repository::VendorRepository;

/// One buffered mutation. Writes are applied in staging order inside the
/// flush transaction, so a record's dependent rows (offer before offer
/// variants, variant before its value rows) stay consistent as long as they
/// are staged together.
#[derive(Debug, Clone)]
pub enum PendingWrite {
    UpsertCategory { entity: CatalogCategory },
    UpsertTag { entity: CatalogTag },
    InsertProduct { entity: Product },
    UpdateProduct { entity: Product, expected_version: i64 },
    ReplaceProductCategories { product_id: String, category_ids: Vec<String> },
    ReplaceProductTags { product_id: String, tag_ids: Vec<String> },
    UpsertMedia { entity: MediaAsset },
    ReplaceProductMedia { product_id: String, media: Vec<(String, i64)> },
    DeleteVariantSet { product_id: String },
    InsertVariant { entity: ProductVariant },
    InsertVariantValue { entity: VariantAttributeValue },
    InsertOffer { entity: VendorOffer },
    UpdateOffer { entity: VendorOffer, expected_version: i64 },
    InsertOfferVariant { entity: VendorOfferVariant },
    InsertUser { entity: User },
    UpdateUser { entity: User },
    UpsertVendor { entity: Vendor },
    InsertVendorMember { entity: VendorMember },
    RepointVendorMember { member_id: String, vendor_id: String },
    UpsertBlogCategory { entity: BlogCategory },
    UpsertBlogTag { entity: BlogTag },
    UpsertBlogPost { entity: BlogPost },
    ReplacePostCategories { post_id: String, category_ids: Vec<String> },
    ReplacePostTags { post_id: String, tag_ids: Vec<String> },
}

pub struct BatchCommitController {
    pool: SqlitePool,
    catalog: CatalogRepository,
    pending: Vec<PendingWrite>,
    batch_size: usize,
}

impl BatchCommitController {
    pub fn new(pool: SqlitePool, batch_size: usize) -> Self {
        let catalog = CatalogRepository::new(pool.clone());
        Self { pool, catalog, pending: Vec::new(), batch_size: batch_size.max(1) }
    }

    pub fn stage(&mut self, write: PendingWrite) {
        self.pending.push(write);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.batch_size
    }

    /// Discard the buffer without committing; used on cancellation so a batch
    /// is never left half-applied across entity types.
    pub fn discard(&mut self) {
        if !self.pending.is_empty() {
            tracing::warn!("Discarding {} uncommitted writes", self.pending.len());
            self.pending.clear();
        }
    }

    /// Flush when the buffer reached the batch size. Called between records,
    /// never inside one record's write group.
    pub async fn flush_if_full(
        &mut self,
        caches: &mut RunCaches,
        identity: &IdentityMap,
    ) -> SyncResult<()> {
        if self.is_full() { self.flush(caches, identity).await } else { Ok(()) }
    }

    /// Apply every buffered write inside a single transaction. On success the
    /// run caches are cleared; on a concurrency conflict the transaction is
    /// rolled back and full diagnostics are gathered before the error is
    /// raised.
    pub async fn flush(
        &mut self,
        caches: &mut RunCaches,
        identity: &IdentityMap,
    ) -> SyncResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let writes = std::mem::take(&mut self.pending);

        let mut tx = self.pool.begin().await?;
        let mut conflicts: Vec<ConflictDiagnostic> = Vec::new();
        for write in &writes {
            if let Some(conflict) = Self::apply(&mut tx, write).await? {
                conflicts.push(conflict);
            }
        }

        if conflicts.is_empty() {
            tx.commit().await?;
            caches.clear();
            identity.clear_cache();
            tracing::debug!("Committed batch of {} writes", writes.len());
            return Ok(());
        }

        tx.rollback().await?;
        for conflict in &mut conflicts {
            conflict.persisted_version =
                self.catalog.persisted_version(conflict.kind, &conflict.entity_id).await?;
            tracing::error!(
                kind = %conflict.kind,
                id = %conflict.entity_id,
                in_memory_version = conflict.in_memory_version,
                persisted_version = ?conflict.persisted_version,
                state = %conflict.summary,
                "Concurrency conflict at batch commit; batch rolled back"
            );
        }
        Err(SyncError::ConcurrencyConflict { conflicts })
    }

    async fn apply(
        conn: &mut SqliteConnection,
        write: &PendingWrite,
    ) -> SyncResult<Option<ConflictDiagnostic>> {
        match write {
            PendingWrite::UpsertCategory { entity } => {
                CatalogRepository::upsert_category(conn, entity).await?;
            }
            PendingWrite::UpsertTag { entity } => {
                CatalogRepository::upsert_tag(conn, entity).await?;
            }
            PendingWrite::InsertProduct { entity } => {
                CatalogRepository::insert_product(conn, entity).await?;
            }
            PendingWrite::UpdateProduct { entity, expected_version } => {
                let affected =
                    CatalogRepository::update_product(conn, entity, *expected_version).await?;
                if affected == 0 {
                    return Ok(Some(ConflictDiagnostic {
                        kind: EntityKind::Product,
                        entity_id: entity.id.clone(),
                        summary: format!("product '{}' ({})", entity.name, entity.slug),
                        in_memory_version: *expected_version,
                        persisted_version: None,
                    }));
                }
            }
            PendingWrite::ReplaceProductCategories { product_id, category_ids } => {
                CatalogRepository::replace_product_categories(conn, product_id, category_ids)
                    .await?;
            }
            PendingWrite::ReplaceProductTags { product_id, tag_ids } => {
                CatalogRepository::replace_product_tags(conn, product_id, tag_ids).await?;
            }
            PendingWrite::UpsertMedia { entity } => {
                CatalogRepository::upsert_media(conn, entity).await?;
            }
            PendingWrite::ReplaceProductMedia { product_id, media } => {
                CatalogRepository::replace_product_media(conn, product_id, media).await?;
            }
            PendingWrite::DeleteVariantSet { product_id } => {
                CatalogRepository::delete_variant_set(conn, product_id).await?;
            }
            PendingWrite::InsertVariant { entity } => {
                CatalogRepository::insert_variant(conn, entity).await?;
            }
            PendingWrite::InsertVariantValue { entity } => {
                CatalogRepository::insert_variant_value(conn, entity).await?;
            }
            PendingWrite::InsertOffer { entity } => {
                CatalogRepository::insert_offer(conn, entity).await?;
            }
            PendingWrite::UpdateOffer { entity, expected_version } => {
                let affected =
                    CatalogRepository::update_offer(conn, entity, *expected_version).await?;
                if affected == 0 {
                    return Ok(Some(ConflictDiagnostic {
                        kind: EntityKind::VendorOffer,
                        entity_id: entity.id.clone(),
                        summary: format!(
                            "offer for product {} (vendor {}, price {:?})",
                            entity.product_id, entity.vendor_id, entity.price
                        ),
                        in_memory_version: *expected_version,
                        persisted_version: None,
                    }));
                }
            }
            PendingWrite::InsertOfferVariant { entity } => {
                CatalogRepository::insert_offer_variant(conn, entity).await?;
            }
            PendingWrite::InsertUser { entity } => {
                VendorRepository::insert_user(conn, entity).await?;
            }
            PendingWrite::UpdateUser { entity } => {
                VendorRepository::update_user(conn, entity).await?;
            }
            PendingWrite::UpsertVendor { entity } => {
                VendorRepository::upsert_vendor(conn, entity).await?;
            }
            PendingWrite::InsertVendorMember { entity } => {
                VendorRepository::insert_member(conn, entity).await?;
            }
            PendingWrite::RepointVendorMember { member_id, vendor_id } => {
                VendorRepository::repoint_member(conn, member_id, vendor_id, chrono::Utc::now())
                    .await?;
            }
            PendingWrite::UpsertBlogCategory { entity } => {
                BlogRepository::upsert_category(conn, entity).await?;
            }
            PendingWrite::UpsertBlogTag { entity } => {
                BlogRepository::upsert_tag(conn, entity).await?;
            }
            PendingWrite::UpsertBlogPost { entity } => {
                BlogRepository::upsert_post(conn, entity).await?;
            }
            PendingWrite::ReplacePostCategories { post_id, category_ids } => {
                BlogRepository::replace_post_categories(conn, post_id, category_ids).await?;
            }
            PendingWrite::ReplacePostTags { post_id, tag_ids } => {
                BlogRepository::replace_post_tags(conn, post_id, tag_ids).await?;
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::identity_map_repository::IdentityMapRepository;
    use crate::test_support::{sample_product, test_database};

    fn identity(db: &crate::infrastructure::DatabaseConnection) -> IdentityMap {
        IdentityMap::new("dokan", IdentityMapRepository::new(db.pool().clone()))
    }

    #[tokio::test]
    async fn flush_commits_buffered_writes_atomically() {
        let (_dir, db) = test_database().await;
        let mut batch = BatchCommitController::new(db.pool().clone(), 10);
        let mut caches = RunCaches::new();
        let identity = identity(&db);

        batch.stage(PendingWrite::InsertProduct { entity: sample_product("p-1", "phone") });
        batch.stage(PendingWrite::InsertProduct { entity: sample_product("p-2", "laptop") });
        assert_eq!(batch.pending_len(), 2);

        batch.flush(&mut caches, &identity).await.unwrap();
        assert_eq!(batch.pending_len(), 0);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn flush_if_full_respects_batch_size() {
        let (_dir, db) = test_database().await;
        let mut batch = BatchCommitController::new(db.pool().clone(), 2);
        let mut caches = RunCaches::new();
        let identity = identity(&db);

        batch.stage(PendingWrite::InsertProduct { entity: sample_product("p-1", "phone") });
        batch.flush_if_full(&mut caches, &identity).await.unwrap();
        assert_eq!(batch.pending_len(), 1, "below batch size, nothing flushed");

        batch.stage(PendingWrite::InsertProduct { entity: sample_product("p-2", "laptop") });
        batch.flush_if_full(&mut caches, &identity).await.unwrap();
        assert_eq!(batch.pending_len(), 0);
    }

    #[tokio::test]
    async fn conflict_rolls_back_batch_and_reports_tokens() {
        let (_dir, db) = test_database().await;
        let mut batch = BatchCommitController::new(db.pool().clone(), 10);
        let mut caches = RunCaches::new();
        let identity = identity(&db);

        let product = sample_product("p-1", "phone");
        batch.stage(PendingWrite::InsertProduct { entity: product.clone() });
        batch.flush(&mut caches, &identity).await.unwrap();

        // Someone else bumped the token in the meantime
        sqlx::query("UPDATE products SET version = 5 WHERE id = 'p-1'")
            .execute(db.pool())
            .await
            .unwrap();

        let mut stale = product.clone();
        stale.name = "Phone (renamed)".to_string();
        batch.stage(PendingWrite::InsertProduct { entity: sample_product("p-2", "laptop") });
        batch.stage(PendingWrite::UpdateProduct { entity: stale, expected_version: 1 });

        let err = batch.flush(&mut caches, &identity).await.unwrap_err();
        match err {
            SyncError::ConcurrencyConflict { conflicts } => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].kind, EntityKind::Product);
                assert_eq!(conflicts[0].entity_id, "p-1");
                assert_eq!(conflicts[0].in_memory_version, 1);
                assert_eq!(conflicts[0].persisted_version, Some(5));
                assert!(conflicts[0].summary.contains("Phone (renamed)"));
            }
            other => panic!("expected concurrency conflict, got {other:?}"),
        }

        // The whole batch rolled back: the unrelated insert is gone too
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE id = 'p-2'")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn discard_drops_uncommitted_writes() {
        let (_dir, db) = test_database().await;
        let mut batch = BatchCommitController::new(db.pool().clone(), 10);

        batch.stage(PendingWrite::InsertProduct { entity: sample_product("p-1", "phone") });
        batch.discard();
        assert_eq!(batch.pending_len(), 0);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
