//! Repository for catalog entities
//!
//! Reads go through the pool and honor soft deletion (with an
//! `include_deleted` escape hatch for administrative reads). Batched writes
//! are associated functions over a live transaction so the batch commit
//! controller can apply a whole buffer atomically. Attribute registry writes
//! are immediate: the run caches are cleared on every flush and the next
//! lookup must find the rows persisted.

use std::sync::Arc;

use sqlx::{Row, SqliteConnection, SqlitePool, sqlite::SqliteRow};

use crate::domain::entities::{
    Attribute, AttributeGroup, AttributeOption, AttributeValueKind, CatalogCategory, CatalogTag,
    MediaAsset, Product, ProductKind, ProductVariant, StockStatus, VariantAttributeValue,
    VendorOffer, VendorOfferVariant,
};
use crate::domain::errors::SyncResult;
use crate::domain::identity::EntityKind;

#[derive(Clone)]
pub struct CatalogRepository {
    pool: Arc<SqlitePool>,
}

impl CatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    // ===============================
    // CATEGORY / TAG OPERATIONS
    // ===============================

    pub async fn find_category(&self, id: &str) -> SyncResult<Option<CatalogCategory>> {
        let row = sqlx::query(
            r#"
            SELECT id, slug, name, parent_id, description, is_deleted, created_at, updated_at
            FROM categories WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(row.map(map_category))
    }

    pub async fn find_tag(&self, id: &str) -> SyncResult<Option<CatalogTag>> {
        let row = sqlx::query(
            "SELECT id, slug, name, created_at, updated_at FROM tags WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(row.map(|row| CatalogTag {
            id: row.get("id"),
            slug: row.get("slug"),
            name: row.get("name"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    pub async fn upsert_category(
        conn: &mut SqliteConnection,
        category: &CatalogCategory,
    ) -> SyncResult<()> {
        sqlx::query(
            r#"
            INSERT INTO categories
            (id, slug, name, parent_id, description, is_deleted, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                slug = excluded.slug,
                name = excluded.name,
                parent_id = excluded.parent_id,
                description = excluded.description,
                is_deleted = excluded.is_deleted,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&category.id)
        .bind(&category.slug)
        .bind(&category.name)
        .bind(&category.parent_id)
        .bind(&category.description)
        .bind(category.is_deleted)
        .bind(category.created_at)
        .bind(category.updated_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn upsert_tag(conn: &mut SqliteConnection, tag: &CatalogTag) -> SyncResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tags (id, slug, name, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                slug = excluded.slug,
                name = excluded.name,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&tag.id)
        .bind(&tag.slug)
        .bind(&tag.name)
        .bind(tag.created_at)
        .bind(tag.updated_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    // ===============================
    // PRODUCT OPERATIONS
    // ===============================

    pub async fn find_product(
        &self,
        id: &str,
        include_deleted: bool,
    ) -> SyncResult<Option<Product>> {
        let sql = if include_deleted {
            r#"
            SELECT id, slug, name, kind, description, short_description, seo_title,
                   seo_description, vendor_id, is_deleted, version, created_at, updated_at
            FROM products WHERE id = ?
            "#
        } else {
            r#"
            SELECT id, slug, name, kind, description, short_description, seo_title,
                   seo_description, vendor_id, is_deleted, version, created_at, updated_at
            FROM products WHERE id = ? AND is_deleted = 0
            "#
        };
        let row = sqlx::query(sql).bind(id).fetch_optional(&*self.pool).await?;
        Ok(row.map(map_product))
    }

    pub async fn insert_product(
        conn: &mut SqliteConnection,
        product: &Product,
    ) -> SyncResult<()> {
        sqlx::query(
            r#"
            INSERT INTO products
            (id, slug, name, kind, description, short_description, seo_title, seo_description,
             vendor_id, is_deleted, version, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(&product.id)
        .bind(&product.slug)
        .bind(&product.name)
        .bind(product.kind.as_str())
        .bind(&product.description)
        .bind(&product.short_description)
        .bind(&product.seo_title)
        .bind(&product.seo_description)
        .bind(&product.vendor_id)
        .bind(product.is_deleted)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Version-guarded update. Returns the number of affected rows; zero
    /// signals an optimistic-concurrency conflict.
    pub async fn update_product(
        conn: &mut SqliteConnection,
        product: &Product,
        expected_version: i64,
    ) -> SyncResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE products SET
                slug = ?, name = ?, kind = ?, description = ?, short_description = ?,
                seo_title = ?, seo_description = ?, vendor_id = ?, is_deleted = ?,
                version = version + 1, updated_at = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(&product.slug)
        .bind(&product.name)
        .bind(product.kind.as_str())
        .bind(&product.description)
        .bind(&product.short_description)
        .bind(&product.seo_title)
        .bind(&product.seo_description)
        .bind(&product.vendor_id)
        .bind(product.is_deleted)
        .bind(product.updated_at)
        .bind(&product.id)
        .bind(expected_version)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn replace_product_categories(
        conn: &mut SqliteConnection,
        product_id: &str,
        category_ids: &[String],
    ) -> SyncResult<()> {
        sqlx::query("DELETE FROM product_categories WHERE product_id = ?")
            .bind(product_id)
            .execute(&mut *conn)
            .await?;
        for category_id in category_ids {
            sqlx::query("INSERT INTO product_categories (product_id, category_id) VALUES (?, ?)")
                .bind(product_id)
                .bind(category_id)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }

    pub async fn replace_product_tags(
        conn: &mut SqliteConnection,
        product_id: &str,
        tag_ids: &[String],
    ) -> SyncResult<()> {
        sqlx::query("DELETE FROM product_tags WHERE product_id = ?")
            .bind(product_id)
            .execute(&mut *conn)
            .await?;
        for tag_id in tag_ids {
            sqlx::query("INSERT INTO product_tags (product_id, tag_id) VALUES (?, ?)")
                .bind(product_id)
                .bind(tag_id)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }

    pub async fn upsert_media(conn: &mut SqliteConnection, media: &MediaAsset) -> SyncResult<()> {
        sqlx::query(
            r#"
            INSERT INTO media_assets (id, url, alt_text, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                url = excluded.url,
                alt_text = excluded.alt_text
            "#,
        )
        .bind(&media.id)
        .bind(&media.url)
        .bind(&media.alt_text)
        .bind(media.created_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn replace_product_media(
        conn: &mut SqliteConnection,
        product_id: &str,
        media: &[(String, i64)],
    ) -> SyncResult<()> {
        sqlx::query("DELETE FROM product_media WHERE product_id = ?")
            .bind(product_id)
            .execute(&mut *conn)
            .await?;
        for (media_id, position) in media {
            sqlx::query(
                "INSERT INTO product_media (product_id, media_id, position) VALUES (?, ?, ?)",
            )
            .bind(product_id)
            .bind(media_id)
            .bind(position)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    // ===============================
    // ATTRIBUTE REGISTRY OPERATIONS
    // ===============================

    pub async fn find_attribute_group_by_name(
        &self,
        name: &str,
    ) -> SyncResult<Option<AttributeGroup>> {
        let row = sqlx::query("SELECT id, name, created_at FROM attribute_groups WHERE name = ?")
            .bind(name)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row.map(|row| AttributeGroup {
            id: row.get("id"),
            name: row.get("name"),
            created_at: row.get("created_at"),
        }))
    }

    pub async fn insert_attribute_group(&self, group: &AttributeGroup) -> SyncResult<()> {
        sqlx::query("INSERT INTO attribute_groups (id, name, created_at) VALUES (?, ?, ?)")
            .bind(&group.id)
            .bind(&group.name)
            .bind(group.created_at)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    pub async fn find_attribute(&self, id: &str) -> SyncResult<Option<Attribute>> {
        let row = sqlx::query(
            r#"
            SELECT id, group_id, external_key, name, value_kind, created_at, updated_at
            FROM attributes WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(row.map(|row| Attribute {
            id: row.get("id"),
            group_id: row.get("group_id"),
            external_key: row.get("external_key"),
            name: row.get("name"),
            value_kind: AttributeValueKind::parse(row.get::<String, _>("value_kind").as_str()),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    pub async fn upsert_attribute(&self, attribute: &Attribute) -> SyncResult<()> {
        sqlx::query(
            r#"
            INSERT INTO attributes
            (id, group_id, external_key, name, value_kind, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                value_kind = excluded.value_kind,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&attribute.id)
        .bind(&attribute.group_id)
        .bind(&attribute.external_key)
        .bind(&attribute.name)
        .bind(attribute.value_kind.as_str())
        .bind(attribute.created_at)
        .bind(attribute.updated_at)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_option(
        &self,
        attribute_id: &str,
        value: &str,
    ) -> SyncResult<Option<AttributeOption>> {
        let row = sqlx::query(
            r#"
            SELECT id, attribute_id, value, created_at
            FROM attribute_options WHERE attribute_id = ? AND value = ?
            "#,
        )
        .bind(attribute_id)
        .bind(value)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(row.map(|row| AttributeOption {
            id: row.get("id"),
            attribute_id: row.get("attribute_id"),
            value: row.get("value"),
            created_at: row.get("created_at"),
        }))
    }

    /// Insert an option, returning the surviving row's ID when a concurrent
    /// writer created the same `(attribute_id, value)` pair first.
    pub async fn insert_option_if_absent(&self, option: &AttributeOption) -> SyncResult<String> {
        let result = sqlx::query(
            "INSERT INTO attribute_options (id, attribute_id, value, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&option.id)
        .bind(&option.attribute_id)
        .bind(&option.value)
        .bind(option.created_at)
        .execute(&*self.pool)
        .await;

        match result {
            Ok(_) => Ok(option.id.clone()),
            Err(sqlx::Error::Database(db))
                if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) =>
            {
                let existing = self.find_option(&option.attribute_id, &option.value).await?;
                existing
                    .map(|o| o.id)
                    .ok_or_else(|| sqlx::Error::RowNotFound.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    // ===============================
    // VARIANT / OFFER OPERATIONS
    // ===============================

    pub async fn find_offer(&self, id: &str, include_deleted: bool) -> SyncResult<Option<VendorOffer>> {
        let sql = if include_deleted {
            "SELECT id, vendor_id, product_id, price, is_deleted, version, created_at, updated_at FROM vendor_offers WHERE id = ?"
        } else {
            "SELECT id, vendor_id, product_id, price, is_deleted, version, created_at, updated_at FROM vendor_offers WHERE id = ? AND is_deleted = 0"
        };
        let row = sqlx::query(sql).bind(id).fetch_optional(&*self.pool).await?;
        Ok(row.map(map_offer))
    }

    pub async fn find_offer_by_product(&self, product_id: &str) -> SyncResult<Option<VendorOffer>> {
        let row = sqlx::query(
            r#"
            SELECT id, vendor_id, product_id, price, is_deleted, version, created_at, updated_at
            FROM vendor_offers WHERE product_id = ? AND is_deleted = 0
            "#,
        )
        .bind(product_id)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(row.map(map_offer))
    }

    pub async fn list_offer_variants(
        &self,
        offer_id: &str,
    ) -> SyncResult<Vec<VendorOfferVariant>> {
        let rows = sqlx::query(
            r#"
            SELECT id, offer_id, variant_id, price, stock_status, stock_quantity,
                   weight, length, width, height, version, created_at, updated_at
            FROM vendor_offer_variants WHERE offer_id = ? ORDER BY created_at, id
            "#,
        )
        .bind(offer_id)
        .fetch_all(&*self.pool)
        .await?;
        Ok(rows.iter().map(map_offer_variant).collect())
    }

    pub async fn list_variant_ids(&self, product_id: &str) -> SyncResult<Vec<String>> {
        let rows = sqlx::query("SELECT id FROM product_variants WHERE product_id = ? ORDER BY position")
            .bind(product_id)
            .fetch_all(&*self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| row.get("id")).collect())
    }

    /// Delete the whole reconciled variant set of a product: offer-variant
    /// rows, attribute-value rows, then the variants themselves. Returns the
    /// number of variants removed.
    pub async fn delete_variant_set(
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> SyncResult<u64> {
        sqlx::query(
            r#"
            DELETE FROM vendor_offer_variants WHERE variant_id IN
                (SELECT id FROM product_variants WHERE product_id = ?)
            "#,
        )
        .bind(product_id)
        .execute(&mut *conn)
        .await?;
        sqlx::query(
            r#"
            DELETE FROM variant_attribute_values WHERE variant_id IN
                (SELECT id FROM product_variants WHERE product_id = ?)
            "#,
        )
        .bind(product_id)
        .execute(&mut *conn)
        .await?;
        let result = sqlx::query("DELETE FROM product_variants WHERE product_id = ?")
            .bind(product_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn insert_variant(
        conn: &mut SqliteConnection,
        variant: &ProductVariant,
    ) -> SyncResult<()> {
        sqlx::query(
            r#"
            INSERT INTO product_variants (id, product_id, sku, position, version, created_at, updated_at)
            VALUES (?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(&variant.id)
        .bind(&variant.product_id)
        .bind(&variant.sku)
        .bind(variant.position)
        .bind(variant.created_at)
        .bind(variant.updated_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn insert_variant_value(
        conn: &mut SqliteConnection,
        value: &VariantAttributeValue,
    ) -> SyncResult<()> {
        sqlx::query(
            r#"
            INSERT INTO variant_attribute_values (id, variant_id, attribute_id, option_id, value, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&value.id)
        .bind(&value.variant_id)
        .bind(&value.attribute_id)
        .bind(&value.option_id)
        .bind(&value.value)
        .bind(value.created_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn insert_offer(conn: &mut SqliteConnection, offer: &VendorOffer) -> SyncResult<()> {
        sqlx::query(
            r#"
            INSERT INTO vendor_offers (id, vendor_id, product_id, price, is_deleted, version, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(&offer.id)
        .bind(&offer.vendor_id)
        .bind(&offer.product_id)
        .bind(offer.price)
        .bind(offer.is_deleted)
        .bind(offer.created_at)
        .bind(offer.updated_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Version-guarded offer update; zero affected rows signals a conflict.
    pub async fn update_offer(
        conn: &mut SqliteConnection,
        offer: &VendorOffer,
        expected_version: i64,
    ) -> SyncResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE vendor_offers SET
                vendor_id = ?, price = ?, is_deleted = ?, version = version + 1, updated_at = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(&offer.vendor_id)
        .bind(offer.price)
        .bind(offer.is_deleted)
        .bind(offer.updated_at)
        .bind(&offer.id)
        .bind(expected_version)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn insert_offer_variant(
        conn: &mut SqliteConnection,
        offer_variant: &VendorOfferVariant,
    ) -> SyncResult<()> {
        sqlx::query(
            r#"
            INSERT INTO vendor_offer_variants
            (id, offer_id, variant_id, price, stock_status, stock_quantity,
             weight, length, width, height, version, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(&offer_variant.id)
        .bind(&offer_variant.offer_id)
        .bind(&offer_variant.variant_id)
        .bind(offer_variant.price)
        .bind(offer_variant.stock_status.as_str())
        .bind(offer_variant.stock_quantity)
        .bind(offer_variant.weight)
        .bind(offer_variant.length)
        .bind(offer_variant.width)
        .bind(offer_variant.height)
        .bind(offer_variant.created_at)
        .bind(offer_variant.updated_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    // ===============================
    // DIAGNOSTICS
    // ===============================

    /// Read the currently persisted concurrency token of a versioned entity.
    /// `None` when the row does not exist or the kind carries no token.
    pub async fn persisted_version(
        &self,
        kind: EntityKind,
        id: &str,
    ) -> SyncResult<Option<i64>> {
        let sql = match kind {
            EntityKind::Product => "SELECT version FROM products WHERE id = ?",
            EntityKind::VendorOffer => "SELECT version FROM vendor_offers WHERE id = ?",
            EntityKind::ProductVariant => "SELECT version FROM product_variants WHERE id = ?",
            EntityKind::VendorOfferVariant => {
                "SELECT version FROM vendor_offer_variants WHERE id = ?"
            }
            _ => return Ok(None),
        };
        let version: Option<i64> =
            sqlx::query_scalar(sql).bind(id).fetch_optional(&*self.pool).await?;
        Ok(version)
    }
}

fn map_category(row: SqliteRow) -> CatalogCategory {
    CatalogCategory {
        id: row.get("id"),
        slug: row.get("slug"),
        name: row.get("name"),
        parent_id: row.get("parent_id"),
        description: row.get("description"),
        is_deleted: row.get("is_deleted"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn map_product(row: SqliteRow) -> Product {
    Product {
        id: row.get("id"),
        slug: row.get("slug"),
        name: row.get("name"),
        kind: ProductKind::parse(row.get::<String, _>("kind").as_str()),
        description: row.get("description"),
        short_description: row.get("short_description"),
        seo_title: row.get("seo_title"),
        seo_description: row.get("seo_description"),
        vendor_id: row.get("vendor_id"),
        is_deleted: row.get("is_deleted"),
        version: row.get("version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn map_offer(row: SqliteRow) -> VendorOffer {
    VendorOffer {
        id: row.get("id"),
        vendor_id: row.get("vendor_id"),
        product_id: row.get("product_id"),
        price: row.get("price"),
        is_deleted: row.get("is_deleted"),
        version: row.get("version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn map_offer_variant(row: &SqliteRow) -> VendorOfferVariant {
    VendorOfferVariant {
        id: row.get("id"),
        offer_id: row.get("offer_id"),
        variant_id: row.get("variant_id"),
        price: row.get("price"),
        stock_status: StockStatus::parse(row.get::<String, _>("stock_status").as_str()),
        stock_quantity: row.get("stock_quantity"),
        weight: row.get("weight"),
        length: row.get("length"),
        width: row.get("width"),
        height: row.get("height"),
        version: row.get("version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
