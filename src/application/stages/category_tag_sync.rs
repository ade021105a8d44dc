//! Category and tag sync stage
//!
//! Runs first: products reference the internal IDs minted here. Categories
//! form an arena-style tree (own ID plus optional parent ID); a parent
//! assignment that would create a cycle is rejected at write time and the
//! category is synced without a parent.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;

use crate::application::batch::PendingWrite;
use crate::application::sync_orchestrator::{StageContext, SyncStage};
use crate::domain::entities::{CatalogCategory, CatalogTag};
use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::events::{StageName, StageReport};
use crate::domain::identity::EntityKind;
use crate::infrastructure::source_dtos::{SourceCategory, SourceTag};

pub struct CategoryTagStage;

#[async_trait]
impl SyncStage for CategoryTagStage {
    fn name(&self) -> StageName {
        StageName::CategoryTag
    }

    async fn run(&self, ctx: &mut StageContext) -> SyncResult<StageReport> {
        let mut report = StageReport::default();

        let categories: Vec<SourceCategory> =
            ctx.source.get_all_paged("products/categories", &[], &ctx.cancel).await?;
        self.sync_categories(ctx, &categories, &mut report).await?;

        let tags: Vec<SourceTag> =
            ctx.source.get_all_paged("products/tags", &[], &ctx.cancel).await?;
        self.sync_tags(ctx, &tags, &mut report).await?;

        Ok(report)
    }
}

impl CategoryTagStage {
    pub async fn sync_categories(
        &self,
        ctx: &mut StageContext,
        records: &[SourceCategory],
        report: &mut StageReport,
    ) -> SyncResult<()> {
        // Parent pointers staged this pass; cycle checks consult this first
        // and fall back to persisted rows.
        let mut parent_index: HashMap<String, Option<String>> = HashMap::new();

        for record in records {
            ctx.check_cancelled()?;
            match self.sync_category(ctx, record, &mut parent_index).await {
                Ok(true) => report.created += 1,
                Ok(false) => report.updated += 1,
                Err(e) if e.is_record_scoped() => {
                    tracing::warn!("Skipping category {}: {}", record.id, e);
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
            ctx.flush_if_full().await?;
        }
        Ok(())
    }

    async fn sync_category(
        &self,
        ctx: &mut StageContext,
        record: &SourceCategory,
        parent_index: &mut HashMap<String, Option<String>>,
    ) -> SyncResult<bool> {
        let slug = record
            .slug
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SyncError::malformed("category without a slug"))?;
        let name = record
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(slug);

        let external_id = record.id.to_string();
        let id = ctx.identity.get_or_create(EntityKind::Category, &external_id, Some(slug)).await?;
        let existing = ctx.catalog.find_category(&id).await?;

        let parent_id = if record.parent > 0 {
            // The parent's mapping is minted on first observation even when
            // its own record arrives later in the fetch.
            let parent = ctx
                .identity
                .get_or_create(EntityKind::Category, &record.parent.to_string(), None)
                .await?;
            if parent == id || would_create_cycle(ctx, &id, &parent, parent_index).await? {
                tracing::warn!(
                    "Rejecting parent {} for category {}: would create a cycle",
                    record.parent,
                    record.id
                );
                None
            } else {
                Some(parent)
            }
        } else {
            None
        };
        parent_index.insert(id.clone(), parent_id.clone());

        let now = Utc::now();
        let entity = CatalogCategory {
            id,
            slug: slug.to_string(),
            name: name.to_string(),
            parent_id,
            description: record.description.clone().filter(|d| !d.trim().is_empty()),
            is_deleted: false,
            created_at: existing.as_ref().map(|c| c.created_at).unwrap_or(now),
            updated_at: now,
        };
        ctx.batch.stage(PendingWrite::UpsertCategory { entity });
        ctx.identity.touch(EntityKind::Category, &external_id).await?;
        Ok(existing.is_none())
    }

    pub async fn sync_tags(
        &self,
        ctx: &mut StageContext,
        records: &[SourceTag],
        report: &mut StageReport,
    ) -> SyncResult<()> {
        for record in records {
            ctx.check_cancelled()?;
            match self.sync_tag(ctx, record).await {
                Ok(true) => report.created += 1,
                Ok(false) => report.updated += 1,
                Err(e) if e.is_record_scoped() => {
                    tracing::warn!("Skipping tag {}: {}", record.id, e);
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
            ctx.flush_if_full().await?;
        }
        Ok(())
    }

    async fn sync_tag(&self, ctx: &mut StageContext, record: &SourceTag) -> SyncResult<bool> {
        let slug = record
            .slug
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SyncError::malformed("tag without a slug"))?;
        let name =
            record.name.as_deref().map(str::trim).filter(|n| !n.is_empty()).unwrap_or(slug);

        let external_id = record.id.to_string();
        let id = ctx.identity.get_or_create(EntityKind::Tag, &external_id, Some(slug)).await?;
        let existing = ctx.catalog.find_tag(&id).await?;

        let now = Utc::now();
        let entity = CatalogTag {
            id,
            slug: slug.to_string(),
            name: name.to_string(),
            created_at: existing.as_ref().map(|t| t.created_at).unwrap_or(now),
            updated_at: now,
        };
        ctx.batch.stage(PendingWrite::UpsertTag { entity });
        ctx.identity.touch(EntityKind::Tag, &external_id).await?;
        Ok(existing.is_none())
    }
}

/// Walks up from `parent`; reaching `child` (or a pre-existing loop) means
/// the assignment must be rejected.
async fn would_create_cycle(
    ctx: &StageContext,
    child: &str,
    parent: &str,
    parent_index: &HashMap<String, Option<String>>,
) -> SyncResult<bool> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut current = Some(parent.to_string());
    while let Some(node) = current {
        if node == child {
            return Ok(true);
        }
        if !visited.insert(node.clone()) {
            return Ok(true);
        }
        current = match parent_index.get(&node) {
            Some(parent) => parent.clone(),
            None => ctx.catalog.find_category(&node).await?.and_then(|c| c.parent_id),
        };
    }
    Ok(false)
}
