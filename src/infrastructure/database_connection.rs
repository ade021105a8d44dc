// Database connection and pool management
// This module handles SQLite database connections using sqlx

use std::path::Path;

use anyhow::Result;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        // Create database file directory if it doesn't exist
        let db_path = if database_url.starts_with("sqlite://") {
            database_url.trim_start_matches("sqlite://")
        } else if database_url.starts_with("sqlite:") {
            database_url.trim_start_matches("sqlite:")
        } else {
            database_url
        };

        if db_path != ":memory:" {
            if let Some(parent) = Path::new(db_path).parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            if !Path::new(db_path).exists() {
                std::fs::File::create(db_path)?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let statements: &[&str] = &[
            // The identity map is the durable cross-run contract: the triple
            // is globally unique and internal_id never changes once assigned.
            r#"
            CREATE TABLE IF NOT EXISTS external_identity_map (
                provider TEXT NOT NULL,
                entity_kind TEXT NOT NULL,
                external_id TEXT NOT NULL,
                internal_id TEXT NOT NULL,
                external_slug TEXT,
                last_synced_at DATETIME NOT NULL,
                PRIMARY KEY (provider, entity_kind, external_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS categories (
                id TEXT PRIMARY KEY,
                slug TEXT NOT NULL,
                name TEXT NOT NULL,
                parent_id TEXT,
                description TEXT,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS tags (
                id TEXT PRIMARY KEY,
                slug TEXT NOT NULL,
                name TEXT NOT NULL,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS products (
                id TEXT PRIMARY KEY,
                slug TEXT NOT NULL,
                name TEXT NOT NULL,
                kind TEXT NOT NULL DEFAULT 'simple',
                description TEXT,
                short_description TEXT,
                seo_title TEXT,
                seo_description TEXT,
                vendor_id TEXT,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                version INTEGER NOT NULL DEFAULT 1,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS product_categories (
                product_id TEXT NOT NULL,
                category_id TEXT NOT NULL,
                PRIMARY KEY (product_id, category_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS product_tags (
                product_id TEXT NOT NULL,
                tag_id TEXT NOT NULL,
                PRIMARY KEY (product_id, tag_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS media_assets (
                id TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                alt_text TEXT,
                created_at DATETIME NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS product_media (
                product_id TEXT NOT NULL,
                media_id TEXT NOT NULL,
                position INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (product_id, media_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS attribute_groups (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                created_at DATETIME NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS attributes (
                id TEXT PRIMARY KEY,
                group_id TEXT NOT NULL,
                external_key TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                value_kind TEXT NOT NULL DEFAULT 'text',
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS attribute_options (
                id TEXT PRIMARY KEY,
                attribute_id TEXT NOT NULL,
                value TEXT NOT NULL,
                created_at DATETIME NOT NULL,
                UNIQUE (attribute_id, value)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS product_variants (
                id TEXT PRIMARY KEY,
                product_id TEXT NOT NULL,
                sku TEXT,
                position INTEGER NOT NULL DEFAULT 0,
                version INTEGER NOT NULL DEFAULT 1,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS variant_attribute_values (
                id TEXT PRIMARY KEY,
                variant_id TEXT NOT NULL,
                attribute_id TEXT NOT NULL,
                option_id TEXT,
                value TEXT NOT NULL,
                created_at DATETIME NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                phone TEXT,
                display_name TEXT,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS vendors (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                slug TEXT NOT NULL,
                commission_percent REAL,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS vendor_members (
                id TEXT PRIMARY KEY,
                vendor_id TEXT NOT NULL,
                user_id TEXT NOT NULL UNIQUE,
                role TEXT NOT NULL,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS vendor_offers (
                id TEXT PRIMARY KEY,
                vendor_id TEXT NOT NULL,
                product_id TEXT NOT NULL,
                price REAL,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                version INTEGER NOT NULL DEFAULT 1,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS vendor_offer_variants (
                id TEXT PRIMARY KEY,
                offer_id TEXT NOT NULL,
                variant_id TEXT NOT NULL,
                price REAL,
                stock_status TEXT NOT NULL DEFAULT 'in_stock',
                stock_quantity INTEGER,
                weight REAL,
                length REAL,
                width REAL,
                height REAL,
                version INTEGER NOT NULL DEFAULT 1,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS blog_categories (
                id TEXT PRIMARY KEY,
                slug TEXT NOT NULL,
                name TEXT NOT NULL,
                created_at DATETIME NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS blog_tags (
                id TEXT PRIMARY KEY,
                slug TEXT NOT NULL,
                name TEXT NOT NULL,
                created_at DATETIME NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS blog_posts (
                id TEXT PRIMARY KEY,
                slug TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT,
                excerpt TEXT,
                published_at DATETIME,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS blog_post_categories (
                post_id TEXT NOT NULL,
                category_id TEXT NOT NULL,
                PRIMARY KEY (post_id, category_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS blog_post_tags (
                post_id TEXT NOT NULL,
                tag_id TEXT NOT NULL,
                PRIMARY KEY (post_id, tag_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS sync_runs (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                started_at DATETIME NOT NULL,
                finished_at DATETIME NOT NULL,
                stage_reports TEXT NOT NULL,
                error TEXT
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_identity_map_internal ON external_identity_map (internal_id)",
            "CREATE INDEX IF NOT EXISTS idx_products_vendor ON products (vendor_id)",
            "CREATE INDEX IF NOT EXISTS idx_variants_product ON product_variants (product_id)",
            "CREATE INDEX IF NOT EXISTS idx_variant_values_variant ON variant_attribute_values (variant_id)",
            "CREATE INDEX IF NOT EXISTS idx_offers_product ON vendor_offers (product_id)",
            "CREATE INDEX IF NOT EXISTS idx_offer_variants_offer ON vendor_offer_variants (offer_id)",
            "CREATE INDEX IF NOT EXISTS idx_users_phone ON users (phone)",
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }
}
