//! Product sync stage
//!
//! Maps source product records onto internal products, reconciling category
//! and tag links (full replace), media assets, and optional SEO metadata
//! scraped from the rendered product page. Variant and offer reconciliation
//! happens in the later variant/offer stage.

use async_trait::async_trait;
use chrono::Utc;

use crate::application::batch::PendingWrite;
use crate::application::sync_orchestrator::{StageContext, SyncStage};
use crate::domain::entities::{MediaAsset, Product, ProductKind};
use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::events::{StageName, StageReport};
use crate::domain::identity::EntityKind;
use crate::infrastructure::source_dtos::SourceProduct;

pub struct ProductStage;

#[async_trait]
impl SyncStage for ProductStage {
    fn name(&self) -> StageName {
        StageName::Product
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
            self.sync_products(ctx, &records, &mut report).await?;
            if fetched < ctx.source.page_size() as usize {
                break;
            }
            page += 1;
        }
        Ok(report)
    }
}

impl ProductStage {
    pub async fn sync_products(
        &self,
        ctx: &mut StageContext,
        records: &[SourceProduct],
        report: &mut StageReport,
    ) -> SyncResult<()> {
        for record in records {
            ctx.check_cancelled()?;
            match self.sync_product(ctx, record).await {
                Ok(true) => report.created += 1,
                Ok(false) => report.updated += 1,
                Err(e) if e.is_record_scoped() => {
                    tracing::warn!("Skipping product {}: {}", record.id, e);
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
            ctx.flush_if_full().await?;
        }
        Ok(())
    }

    async fn sync_product(&self, ctx: &mut StageContext, record: &SourceProduct) -> SyncResult<bool> {
        let slug = record
            .slug
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SyncError::malformed("product without a slug"))?;
        let name = record
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| SyncError::malformed("product without a name"))?;

        let external_id = record.id.to_string();
        let id = ctx.identity.get_or_create(EntityKind::Product, &external_id, Some(slug)).await?;
        // Admin read: a soft-deleted product that reappears in the source is
        // resurrected (source wins).
        let existing = ctx.catalog.find_product(&id, true).await?;

        // Variable is sticky: once flagged, a product never silently reverts
        let kind = match &existing {
            Some(product) if product.kind == ProductKind::Variable => ProductKind::Variable,
            _ if record.is_variable() => ProductKind::Variable,
            _ => ProductKind::Simple,
        };

        let mut seo_title = existing.as_ref().and_then(|p| p.seo_title.clone());
        let mut seo_description = existing.as_ref().and_then(|p| p.seo_description.clone());
        if let (Some(scraper), Some(permalink)) = (ctx.seo.clone(), record.permalink.as_deref()) {
            if let Some(metadata) = scraper.fetch(permalink).await {
                seo_title = metadata.title.or(seo_title);
                seo_description = metadata.description.or(seo_description);
            }
        }

        let now = Utc::now();

        // Term links: unmapped references are dropped with a warning, the
        // record itself still syncs.
        let mut category_ids = Vec::new();
        for term in &record.categories {
            match ctx.identity.find(EntityKind::Category, &term.id.to_string()).await? {
                Some(category_id) => category_ids.push(category_id),
                None => tracing::warn!(
                    "Product {} references unmapped category {}",
                    record.id,
                    term.id
                ),
            }
        }
        let mut tag_ids = Vec::new();
        for term in &record.tags {
            match ctx.identity.find(EntityKind::Tag, &term.id.to_string()).await? {
                Some(tag_id) => tag_ids.push(tag_id),
                None => {
                    tracing::warn!("Product {} references unmapped tag {}", record.id, term.id);
                }
            }
        }

        let mut media_links = Vec::new();
        for (position, image) in record.images.iter().enumerate() {
            let Some(src) = image.src.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
                continue;
            };
            let media_external = image
                .id
                .filter(|id| *id > 0)
                .map(|id| id.to_string())
                .unwrap_or_else(|| src.to_string());
            let media_id =
                ctx.identity.get_or_create(EntityKind::MediaAsset, &media_external, None).await?;
            ctx.batch.stage(PendingWrite::UpsertMedia {
                entity: MediaAsset {
                    id: media_id.clone(),
                    url: src.to_string(),
                    alt_text: image.alt.clone().filter(|a| !a.trim().is_empty()),
                    created_at: now,
                },
            });
            media_links.push((media_id, position as i64));
        }

        let entity = Product {
            id: id.clone(),
            slug: slug.to_string(),
            name: name.to_string(),
            kind,
            description: record.description.clone().filter(|d| !d.trim().is_empty()),
            short_description: record.short_description.clone().filter(|d| !d.trim().is_empty()),
            seo_title,
            seo_description,
            // Vendor attachment belongs to the vendor-link stage; keep
            // whatever is there.
            vendor_id: existing.as_ref().and_then(|p| p.vendor_id.clone()),
            is_deleted: false,
            version: existing.as_ref().map(|p| p.version).unwrap_or(1),
            created_at: existing.as_ref().map(|p| p.created_at).unwrap_or(now),
            updated_at: now,
        };

        match &existing {
            Some(current) => ctx.batch.stage(PendingWrite::UpdateProduct {
                entity,
                expected_version: current.version,
            }),
            None => ctx.batch.stage(PendingWrite::InsertProduct { entity }),
        }
        ctx.batch.stage(PendingWrite::ReplaceProductCategories {
            product_id: id.clone(),
            category_ids,
        });
        ctx.batch.stage(PendingWrite::ReplaceProductTags { product_id: id.clone(), tag_ids });
        ctx.batch.stage(PendingWrite::ReplaceProductMedia { product_id: id, media: media_links });
        ctx.identity.touch(EntityKind::Product, &external_id).await?;

        Ok(existing.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::stages::category_tag_sync::CategoryTagStage;
    use crate::infrastructure::source_dtos::{SourceCategory, SourceImage, SourceTermRef};
    use crate::test_support::{test_context, test_database};

    fn product(id: i64, slug: &str) -> SourceProduct {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": slug.to_uppercase(),
            "slug": slug,
            "type": "simple",
            "price": "1000",
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn creates_then_updates_the_same_row() {
        let (_dir, db) = test_database().await;
        let mut ctx = test_context(&db);
        let stage = ProductStage;

        let records = vec![product(120, "phone"), product(121, "laptop")];
        let mut first = StageReport::default();
        stage.sync_products(&mut ctx, &records, &mut first).await.unwrap();
        ctx.flush().await.unwrap();
        assert_eq!(first.created, 2);

        let mut second = StageReport::default();
        stage.sync_products(&mut ctx, &records, &mut second).await.unwrap();
        ctx.flush().await.unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.updated, 2);

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM products").fetch_one(db.pool()).await.unwrap();
        assert_eq!(count, 2);

        // Version token advanced exactly once for the second pass
        let version: i64 = sqlx::query_scalar("SELECT version FROM products WHERE slug = 'phone'")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(version, 2);
    }

    #[tokio::test]
    async fn category_links_resolve_through_identity_map() {
        let (_dir, db) = test_database().await;
        let mut ctx = test_context(&db);

        // Seed one mapped category through the category stage
        let category_stage = CategoryTagStage;
        let mut report = StageReport::default();
        let categories = vec![SourceCategory {
            id: 4,
            name: Some("Phones".into()),
            slug: Some("phones".into()),
            parent: 0,
            description: None,
        }];
        category_stage.sync_categories(&mut ctx, &categories, &mut report).await.unwrap();
        ctx.flush().await.unwrap();

        let mut record = product(120, "phone");
        record.categories = vec![
            SourceTermRef { id: 4, name: None, slug: None },
            // Unmapped term: dropped with a warning, record still syncs
            SourceTermRef { id: 999, name: None, slug: None },
        ];
        let stage = ProductStage;
        let mut report = StageReport::default();
        stage.sync_products(&mut ctx, &[record], &mut report).await.unwrap();
        ctx.flush().await.unwrap();
        assert_eq!(report.created, 1);

        let links: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM product_categories")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(links, 1);
    }

    #[tokio::test]
    async fn media_assets_are_identity_mapped_and_linked_in_order() {
        let (_dir, db) = test_database().await;
        let mut ctx = test_context(&db);
        let stage = ProductStage;

        let mut record = product(120, "phone");
        record.images = vec![
            SourceImage { id: Some(55), src: Some("https://cdn.example.com/a.jpg".into()), alt: None },
            SourceImage { id: None, src: Some("https://cdn.example.com/b.jpg".into()), alt: Some("back".into()) },
        ];
        let mut report = StageReport::default();
        stage.sync_products(&mut ctx, &[record.clone()], &mut report).await.unwrap();
        ctx.flush().await.unwrap();

        let media: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM media_assets").fetch_one(db.pool()).await.unwrap();
        assert_eq!(media, 2);

        // Re-sync keeps the same asset rows
        let mut report = StageReport::default();
        stage.sync_products(&mut ctx, &[record], &mut report).await.unwrap();
        ctx.flush().await.unwrap();
        let media: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM media_assets").fetch_one(db.pool()).await.unwrap();
        assert_eq!(media, 2);
    }

    #[tokio::test]
    async fn variable_flag_is_sticky() {
        let (_dir, db) = test_database().await;
        let mut ctx = test_context(&db);
        let stage = ProductStage;

        let mut record = product(120, "phone");
        record.kind = Some("variable".into());
        record.variations = vec![121, 122];
        let mut report = StageReport::default();
        stage.sync_products(&mut ctx, &[record], &mut report).await.unwrap();
        ctx.flush().await.unwrap();

        // Source later reports the product as simple with no variations
        let record = product(120, "phone");
        let mut report = StageReport::default();
        stage.sync_products(&mut ctx, &[record], &mut report).await.unwrap();
        ctx.flush().await.unwrap();

        let kind: String = sqlx::query_scalar("SELECT kind FROM products WHERE slug = 'phone'")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(kind, "variable");
    }

    #[tokio::test]
    async fn nameless_records_are_skipped() {
        let (_dir, db) = test_database().await;
        let mut ctx = test_context(&db);
        let stage = ProductStage;

        let mut bad = product(120, "phone");
        bad.name = None;
        let mut report = StageReport::default();
        stage.sync_products(&mut ctx, &[bad], &mut report).await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.created, 0);
    }
}
