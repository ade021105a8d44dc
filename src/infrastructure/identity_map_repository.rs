//! Repository for the external identity map
//!
//! Writes here are immediate (never batched): every later record in the same
//! run must observe mappings created before it. Inserts distinguish a
//! uniqueness violation from other store errors so the identity map service
//! can resolve races by re-reading the winner.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::domain::errors::SyncResult;
use crate::domain::identity::{EntityKind, IdentityMapping};

/// Result of an insert attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A concurrent writer inserted the same key first.
    DuplicateKey,
}

#[derive(Clone)]
pub struct IdentityMapRepository {
    pool: Arc<SqlitePool>,
}

impl IdentityMapRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    pub async fn find(
        &self,
        provider: &str,
        kind: EntityKind,
        external_id: &str,
    ) -> SyncResult<Option<IdentityMapping>> {
        let row = sqlx::query(
            r#"
            SELECT provider, entity_kind, external_id, internal_id, external_slug, last_synced_at
            FROM external_identity_map
            WHERE provider = ? AND entity_kind = ? AND external_id = ?
            "#,
        )
        .bind(provider)
        .bind(kind.as_str())
        .bind(external_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(|row| IdentityMapping {
            provider: row.get("provider"),
            entity_kind: kind,
            external_id: row.get("external_id"),
            internal_id: row.get("internal_id"),
            external_slug: row.get("external_slug"),
            last_synced_at: row.get("last_synced_at"),
        }))
    }

    pub async fn insert(&self, mapping: &IdentityMapping) -> SyncResult<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO external_identity_map
            (provider, entity_kind, external_id, internal_id, external_slug, last_synced_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&mapping.provider)
        .bind(mapping.entity_kind.as_str())
        .bind(&mapping.external_id)
        .bind(&mapping.internal_id)
        .bind(&mapping.external_slug)
        .bind(mapping.last_synced_at)
        .execute(&*self.pool)
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(sqlx::Error::Database(db))
                if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) =>
            {
                Ok(InsertOutcome::DuplicateKey)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Refresh `last_synced_at` for an existing mapping.
    pub async fn touch(
        &self,
        provider: &str,
        kind: EntityKind,
        external_id: &str,
        at: DateTime<Utc>,
    ) -> SyncResult<()> {
        sqlx::query(
            r#"
            UPDATE external_identity_map
            SET last_synced_at = ?
            WHERE provider = ? AND entity_kind = ? AND external_id = ?
            "#,
        )
        .bind(at)
        .bind(provider)
        .bind(kind.as_str())
        .bind(external_id)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    pub async fn count(&self, provider: &str, kind: EntityKind) -> SyncResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM external_identity_map WHERE provider = ? AND entity_kind = ?",
        )
        .bind(provider)
        .bind(kind.as_str())
        .fetch_one(&*self.pool)
        .await?;
        Ok(count)
    }
}
