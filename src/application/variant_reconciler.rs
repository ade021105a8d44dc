//! Variant & offer reconciler
//!
//! Per-product state machine with two states: Simple (no variants) and
//! Variable (has a reconciled variant set). A product upgrades to Variable
//! the first time the source reports more than one purchasable
//! configuration; the reverse transition is never performed, so a Variable
//! product whose source later reports nothing keeps its (now empty) variant
//! set. The variant set itself is reconciled by full replace: every existing
//! row is deleted and the set is rebuilt from the current source variation
//! list within the same batch.

use chrono::Utc;
use uuid::Uuid;

use crate::application::attribute_normalizer::AttributeNormalizer;
use crate::application::batch::{BatchCommitController, PendingWrite};
use crate::application::caches::RunCaches;
use crate::application::identity_map::IdentityMap;
use crate::domain::entities::{
    Product, ProductKind, ProductVariant, StockStatus, VariantAttributeValue, VendorOffer,
    VendorOfferVariant,
};
use crate::domain::errors::SyncResult;
use crate::domain::identity::EntityKind;
use crate::infrastructure::catalog_repository::CatalogRepository;
use crate::infrastructure::parsing::{parse_decimal, resolve_price};
use crate::infrastructure::source_dtos::{SourceProduct, SourceVariation};

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOutcome {
    pub offer_created: bool,
    pub offer_updated: bool,
    pub variants_written: u32,
    pub variants_deleted: u32,
}

pub struct VariantReconciler<'a> {
    identity: &'a IdentityMap,
    catalog: &'a CatalogRepository,
}

impl<'a> VariantReconciler<'a> {
    pub fn new(identity: &'a IdentityMap, catalog: &'a CatalogRepository) -> Self {
        Self { identity, catalog }
    }

    /// Reconcile a simple product: just make sure its marketplace offer
    /// exists and carries the current headline price.
    pub async fn reconcile_simple(
        &self,
        product: &Product,
        record: &SourceProduct,
        default_vendor_id: &str,
        batch: &mut BatchCommitController,
    ) -> SyncResult<ReconcileOutcome> {
        let mut outcome = ReconcileOutcome::default();
        self.ensure_offer(product, record, default_vendor_id, batch, &mut outcome).await?;
        Ok(outcome)
    }

    /// Reconcile a variable product: ensure the offer, refresh its headline
    /// price, then fully replace the variant set from the current source
    /// variation list. All writes land in the same batch; flush boundaries
    /// fall between products, never inside one product's write group.
    pub async fn reconcile_variable(
        &self,
        product: &Product,
        record: &SourceProduct,
        variations: &[SourceVariation],
        default_vendor_id: &str,
        normalizer: &AttributeNormalizer<'_>,
        caches: &mut RunCaches,
        batch: &mut BatchCommitController,
    ) -> SyncResult<ReconcileOutcome> {
        let mut outcome = ReconcileOutcome::default();
        let now = Utc::now();

        if product.kind == ProductKind::Simple {
            // First sighting of multiple purchasable configurations
            let upgraded =
                Product { kind: ProductKind::Variable, updated_at: now, ..product.clone() };
            batch.stage(PendingWrite::UpdateProduct {
                entity: upgraded,
                expected_version: product.version,
            });
        }

        let offer_id =
            self.ensure_offer(product, record, default_vendor_id, batch, &mut outcome).await?;

        outcome.variants_deleted = self.catalog.list_variant_ids(&product.id).await?.len() as u32;
        batch.stage(PendingWrite::DeleteVariantSet { product_id: product.id.clone() });

        for (position, variation) in variations.iter().enumerate() {
            if variation.purchasable == Some(false) {
                tracing::debug!("Skipping non-purchasable variation {}", variation.id);
                continue;
            }
            let variant_id = self
                .identity
                .get_or_create(EntityKind::ProductVariant, &variation.id.to_string(), None)
                .await?;

            batch.stage(PendingWrite::InsertVariant {
                entity: ProductVariant {
                    id: variant_id.clone(),
                    product_id: product.id.clone(),
                    sku: variation.sku.clone().filter(|s| !s.trim().is_empty()),
                    position: position as i64,
                    version: 1,
                    created_at: now,
                    updated_at: now,
                },
            });

            for attribute in &variation.attributes {
                let Some(option_value) = attribute.option.as_deref() else {
                    continue;
                };
                let resolved = match normalizer.resolve(attribute, &[option_value], caches).await {
                    Ok(resolved) => resolved,
                    Err(e) if e.is_record_scoped() => {
                        tracing::debug!("Skipping unusable variation attribute: {e}");
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                let option_id =
                    normalizer.resolve_option(&resolved.id, option_value, caches).await?;
                batch.stage(PendingWrite::InsertVariantValue {
                    entity: VariantAttributeValue {
                        id: Uuid::new_v4().to_string(),
                        variant_id: variant_id.clone(),
                        attribute_id: resolved.id,
                        option_id,
                        value: option_value.trim().to_string(),
                        created_at: now,
                    },
                });
            }

            let offer_variant_id = self
                .identity
                .get_or_create(EntityKind::VendorOfferVariant, &variation.id.to_string(), None)
                .await?;
            let dimensions = variation.dimensions.as_ref();
            batch.stage(PendingWrite::InsertOfferVariant {
                entity: VendorOfferVariant {
                    id: offer_variant_id,
                    offer_id: offer_id.clone(),
                    variant_id,
                    price: resolve_price(
                        variation.sale_price.as_deref(),
                        variation.regular_price.as_deref(),
                        variation.price.as_deref(),
                    ),
                    stock_status: StockStatus::from_source(variation.stock_status.as_deref()),
                    stock_quantity: variation.stock_quantity,
                    weight: variation.weight.as_deref().and_then(parse_decimal),
                    length: dimensions.and_then(|d| d.length.as_deref()).and_then(parse_decimal),
                    width: dimensions.and_then(|d| d.width.as_deref()).and_then(parse_decimal),
                    height: dimensions.and_then(|d| d.height.as_deref()).and_then(parse_decimal),
                    version: 1,
                    created_at: now,
                    updated_at: now,
                },
            });
            outcome.variants_written += 1;
        }

        Ok(outcome)
    }

    /// Ensure one marketplace offer exists for the product, created under the
    /// reserved default vendor; an existing offer gets its headline price
    /// refreshed via the price-resolution policy.
    async fn ensure_offer(
        &self,
        product: &Product,
        record: &SourceProduct,
        default_vendor_id: &str,
        batch: &mut BatchCommitController,
        outcome: &mut ReconcileOutcome,
    ) -> SyncResult<String> {
        let now = Utc::now();
        let offer_id = self
            .identity
            .get_or_create(EntityKind::VendorOffer, &record.id.to_string(), None)
            .await?;
        let headline = resolve_price(
            record.sale_price.as_deref(),
            record.regular_price.as_deref(),
            record.price.as_deref(),
        );

        match self.catalog.find_offer(&offer_id, true).await? {
            Some(offer) => {
                if offer.price != headline || offer.is_deleted {
                    batch.stage(PendingWrite::UpdateOffer {
                        entity: VendorOffer {
                            price: headline,
                            is_deleted: false,
                            updated_at: now,
                            ..offer.clone()
                        },
                        expected_version: offer.version,
                    });
                    outcome.offer_updated = true;
                }
            }
            None => {
                batch.stage(PendingWrite::InsertOffer {
                    entity: VendorOffer {
                        id: offer_id.clone(),
                        vendor_id: default_vendor_id.to_string(),
                        product_id: product.id.clone(),
                        price: headline,
                        is_deleted: false,
                        version: 1,
                        created_at: now,
                        updated_at: now,
                    },
                });
                outcome.offer_created = true;
            }
        }
        Ok(offer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::identity_map_repository::IdentityMapRepository;
    use crate::test_support::{sample_product, test_database, variation};

    struct Fixture {
        db: crate::infrastructure::DatabaseConnection,
        identity: IdentityMap,
        catalog: CatalogRepository,
    }

    async fn fixture() -> (tempfile::TempDir, Fixture) {
        let (dir, db) = test_database().await;
        let identity = IdentityMap::new("dokan", IdentityMapRepository::new(db.pool().clone()));
        let catalog = CatalogRepository::new(db.pool().clone());
        (dir, Fixture { db, identity, catalog })
    }

    fn source_record(id: i64, variations: Vec<i64>) -> SourceProduct {
        let raw = serde_json::json!({
            "id": id,
            "name": "Phone",
            "slug": "phone",
            "type": if variations.is_empty() { "simple" } else { "variable" },
            "price": "1200",
            "regular_price": "1500",
            "sale_price": "1200",
            "variations": variations,
        });
        serde_json::from_value(raw).unwrap()
    }

    async fn seed_variable_product(f: &Fixture) -> Product {
        let mut product = sample_product("p-1", "phone");
        product.kind = ProductKind::Variable;
        let mut tx = f.db.pool().begin().await.unwrap();
        CatalogRepository::insert_product(&mut tx, &product).await.unwrap();
        tx.commit().await.unwrap();
        f.catalog.find_product("p-1", false).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn full_replace_leaves_exactly_the_new_set() {
        let (_dir, f) = fixture().await;
        let product = seed_variable_product(&f).await;
        let reconciler = VariantReconciler::new(&f.identity, &f.catalog);
        let normalizer = AttributeNormalizer::new(&f.identity, &f.catalog);
        let mut caches = RunCaches::new();
        let mut batch = BatchCommitController::new(f.db.pool().clone(), 1000);

        // First run: set A = {v1, v2}
        let record = source_record(120, vec![121, 122]);
        let set_a = vec![variation(121, "1000"), variation(122, "1100")];
        reconciler
            .reconcile_variable(&product, &record, &set_a, "v-default", &normalizer, &mut caches, &mut batch)
            .await
            .unwrap();
        batch.flush(&mut caches, &f.identity).await.unwrap();

        let ids_a = f.catalog.list_variant_ids("p-1").await.unwrap();
        assert_eq!(ids_a.len(), 2);

        // Second run: set B = {v3}
        let record = source_record(120, vec![123]);
        let set_b = vec![variation(123, "900")];
        let product = f.catalog.find_product("p-1", false).await.unwrap().unwrap();
        let outcome = reconciler
            .reconcile_variable(&product, &record, &set_b, "v-default", &normalizer, &mut caches, &mut batch)
            .await
            .unwrap();
        batch.flush(&mut caches, &f.identity).await.unwrap();
        assert_eq!(outcome.variants_deleted, 2);
        assert_eq!(outcome.variants_written, 1);

        let ids_b = f.catalog.list_variant_ids("p-1").await.unwrap();
        assert_eq!(ids_b.len(), 1);
        assert!(!ids_b.contains(&ids_a[0]) && !ids_b.contains(&ids_a[1]));

        // None of A's offer-variant rows survive either
        let offer = f.catalog.find_offer_by_product("p-1").await.unwrap().unwrap();
        let offer_variants = f.catalog.list_offer_variants(&offer.id).await.unwrap();
        assert_eq!(offer_variants.len(), 1);
        assert_eq!(offer_variants[0].price, Some(900.0));
        assert_eq!(offer_variants[0].stock_status, StockStatus::InStock);

        // And the product is still Variable
        let product = f.catalog.find_product("p-1", false).await.unwrap().unwrap();
        assert_eq!(product.kind, ProductKind::Variable);
    }

    #[tokio::test]
    async fn same_variation_resolves_to_same_variant_id_across_runs() {
        let (_dir, f) = fixture().await;
        let product = seed_variable_product(&f).await;
        let reconciler = VariantReconciler::new(&f.identity, &f.catalog);
        let normalizer = AttributeNormalizer::new(&f.identity, &f.catalog);
        let mut caches = RunCaches::new();
        let mut batch = BatchCommitController::new(f.db.pool().clone(), 1000);

        let record = source_record(120, vec![121]);
        let set = vec![variation(121, "1000")];
        reconciler
            .reconcile_variable(&product, &record, &set, "v-default", &normalizer, &mut caches, &mut batch)
            .await
            .unwrap();
        batch.flush(&mut caches, &f.identity).await.unwrap();
        let first = f.catalog.list_variant_ids("p-1").await.unwrap();

        let product = f.catalog.find_product("p-1", false).await.unwrap().unwrap();
        reconciler
            .reconcile_variable(&product, &record, &set, "v-default", &normalizer, &mut caches, &mut batch)
            .await
            .unwrap();
        batch.flush(&mut caches, &f.identity).await.unwrap();
        let second = f.catalog.list_variant_ids("p-1").await.unwrap();

        // Full replace recreated the row, but under the identical internal ID
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn simple_product_gets_offer_with_resolved_price() {
        let (_dir, f) = fixture().await;
        let mut product = sample_product("p-1", "phone");
        product.kind = ProductKind::Simple;
        let mut tx = f.db.pool().begin().await.unwrap();
        CatalogRepository::insert_product(&mut tx, &product).await.unwrap();
        tx.commit().await.unwrap();
        let product = f.catalog.find_product("p-1", false).await.unwrap().unwrap();

        let reconciler = VariantReconciler::new(&f.identity, &f.catalog);
        let mut caches = RunCaches::new();
        let mut batch = BatchCommitController::new(f.db.pool().clone(), 1000);

        let record = source_record(120, vec![]);
        let outcome = reconciler
            .reconcile_simple(&product, &record, "v-default", &mut batch)
            .await
            .unwrap();
        assert!(outcome.offer_created);
        batch.flush(&mut caches, &f.identity).await.unwrap();

        let offer = f.catalog.find_offer_by_product("p-1").await.unwrap().unwrap();
        // Sale 1200 < regular 1500, so the sale price wins
        assert_eq!(offer.price, Some(1200.0));
        assert_eq!(offer.vendor_id, "v-default");

        // Re-run with unchanged data stages no offer changes
        let product = f.catalog.find_product("p-1", false).await.unwrap().unwrap();
        let outcome = reconciler
            .reconcile_simple(&product, &record, "v-default", &mut batch)
            .await
            .unwrap();
        assert!(!outcome.offer_created && !outcome.offer_updated);
        assert_eq!(batch.pending_len(), 0);
    }

    #[tokio::test]
    async fn unpriced_variation_yields_no_price_not_zero() {
        let (_dir, f) = fixture().await;
        let product = seed_variable_product(&f).await;
        let reconciler = VariantReconciler::new(&f.identity, &f.catalog);
        let normalizer = AttributeNormalizer::new(&f.identity, &f.catalog);
        let mut caches = RunCaches::new();
        let mut batch = BatchCommitController::new(f.db.pool().clone(), 1000);

        let record = source_record(120, vec![121]);
        let mut v = variation(121, "1000");
        v.price = Some("تماس بگیرید".into());
        v.regular_price = None;
        v.sale_price = None;
        reconciler
            .reconcile_variable(&product, &record, &[v], "v-default", &normalizer, &mut caches, &mut batch)
            .await
            .unwrap();
        batch.flush(&mut caches, &f.identity).await.unwrap();

        let price: Option<f64> =
            sqlx::query_scalar("SELECT price FROM vendor_offer_variants LIMIT 1")
                .fetch_one(f.db.pool())
                .await
                .unwrap();
        assert_eq!(price, None);
    }
}
