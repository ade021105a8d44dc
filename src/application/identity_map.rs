//! External-identity mapping service
//!
//! Resolves `(provider, entity_kind, external_id)` to a stable internal ID.
//! `get_or_create` is the one operation designed for concurrent callers: a
//! lookup, a process-scoped critical section, a double-check re-lookup, and
//! an insert that treats a uniqueness violation as "another caller won the
//! race" and re-reads the winner instead of propagating the error. The lock
//! covers only store lookups and the insert; it is released before any
//! network I/O happens elsewhere.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::domain::errors::SyncResult;
use crate::domain::identity::{EntityKind, IdentityMapping};
use crate::infrastructure::identity_map_repository::{IdentityMapRepository, InsertOutcome};

pub struct IdentityMap {
    provider: String,
    repo: IdentityMapRepository,
    /// Resolved keys for this run; consulted before the store.
    cache: Mutex<HashMap<(EntityKind, String), String>>,
    /// Serializes the double-check-then-insert window.
    create_lock: AsyncMutex<()>,
}

impl IdentityMap {
    pub fn new(provider: impl Into<String>, repo: IdentityMapRepository) -> Self {
        Self {
            provider: provider.into(),
            repo,
            cache: Mutex::new(HashMap::new()),
            create_lock: AsyncMutex::new(()),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Pure lookup; `None` when the external record was never observed.
    pub async fn find(&self, kind: EntityKind, external_id: &str) -> SyncResult<Option<String>> {
        if let Some(id) = self.cached(kind, external_id) {
            return Ok(Some(id));
        }
        let mapping = self.repo.find(&self.provider, kind, external_id).await?;
        if let Some(mapping) = &mapping {
            self.remember(kind, external_id, &mapping.internal_id);
        }
        Ok(mapping.map(|m| m.internal_id))
    }

    /// Returns the existing mapping's internal ID or creates a new one.
    /// Idempotent and safe under concurrent callers for the same key.
    pub async fn get_or_create(
        &self,
        kind: EntityKind,
        external_id: &str,
        slug: Option<&str>,
    ) -> SyncResult<String> {
        let internal_id = Uuid::new_v4().to_string();
        self.resolve_or_insert(kind, external_id, slug, internal_id).await
    }

    /// Like `get_or_create`, but binds the mapping to a caller-chosen
    /// internal ID when the key is new. Used when an external record resolved
    /// to an already-existing internal row (e.g. a user matched by email).
    /// The returned ID is authoritative: under a race the winner's ID is
    /// handed back, not the caller's.
    pub async fn bind(
        &self,
        kind: EntityKind,
        external_id: &str,
        internal_id: &str,
        slug: Option<&str>,
    ) -> SyncResult<String> {
        self.resolve_or_insert(kind, external_id, slug, internal_id.to_string()).await
    }

    async fn resolve_or_insert(
        &self,
        kind: EntityKind,
        external_id: &str,
        slug: Option<&str>,
        candidate_id: String,
    ) -> SyncResult<String> {
        if let Some(id) = self.find(kind, external_id).await? {
            return Ok(id);
        }

        let _guard = self.create_lock.lock().await;

        // Double-check: another caller may have inserted while we waited.
        if let Some(mapping) = self.repo.find(&self.provider, kind, external_id).await? {
            self.remember(kind, external_id, &mapping.internal_id);
            return Ok(mapping.internal_id);
        }

        let mapping = IdentityMapping {
            provider: self.provider.clone(),
            entity_kind: kind,
            external_id: external_id.to_string(),
            internal_id: candidate_id,
            external_slug: slug.map(str::to_string),
            last_synced_at: Utc::now(),
        };

        match self.repo.insert(&mapping).await? {
            InsertOutcome::Inserted => {
                self.remember(kind, external_id, &mapping.internal_id);
                Ok(mapping.internal_id)
            }
            InsertOutcome::DuplicateKey => {
                // A concurrent writer on another connection won; adopt its ID.
                let winner = self
                    .repo
                    .find(&self.provider, kind, external_id)
                    .await?
                    .ok_or(sqlx::Error::RowNotFound)?;
                self.remember(kind, external_id, &winner.internal_id);
                Ok(winner.internal_id)
            }
        }
    }

    /// Refresh `last_synced_at` for a mapping observed this run.
    pub async fn touch(&self, kind: EntityKind, external_id: &str) -> SyncResult<()> {
        self.repo.touch(&self.provider, kind, external_id, Utc::now()).await
    }

    /// Drop the in-process lookup cache; called on batch flush to bound
    /// memory growth across a long-running import.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    fn cached(&self, kind: EntityKind, external_id: &str) -> Option<String> {
        self.cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(&(kind, external_id.to_string())).cloned())
    }

    fn remember(&self, kind: EntityKind, external_id: &str, internal_id: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert((kind, external_id.to_string()), internal_id.to_string());
        }
    }
}
