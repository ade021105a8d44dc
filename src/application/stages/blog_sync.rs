//! Blog sync stage
//!
//! Posts, post categories, and post tags follow the same identity-mapped
//! upsert discipline as the catalog; term links are reconciled by full
//! replace and unmapped term references are dropped with a warning.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::application::batch::PendingWrite;
use crate::application::sync_orchestrator::{StageContext, SyncStage};
use crate::domain::entities::{BlogCategory, BlogPost, BlogTag};
use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::events::{StageName, StageReport};
use crate::domain::identity::EntityKind;
use crate::infrastructure::source_dtos::{SourcePost, SourcePostTerm};

pub struct BlogStage;

#[async_trait]
impl SyncStage for BlogStage {
    fn name(&self) -> StageName {
        StageName::Blog
    }

    async fn run(&self, ctx: &mut StageContext) -> SyncResult<StageReport> {
        let mut report = StageReport::default();

        let categories: Vec<SourcePostTerm> =
            ctx.source.get_all_paged("posts/categories", &[], &ctx.cancel).await?;
        self.sync_terms(ctx, &categories, EntityKind::BlogCategory, &mut report).await?;

        let tags: Vec<SourcePostTerm> =
            ctx.source.get_all_paged("posts/tags", &[], &ctx.cancel).await?;
        self.sync_terms(ctx, &tags, EntityKind::BlogTag, &mut report).await?;

        let mut page = 1;
        loop {
            let posts: Vec<SourcePost> =
                ctx.source.get_page("posts", &[], page, &ctx.cancel).await?;
            if posts.is_empty() {
                break;
            }
            let fetched = posts.len();
            self.sync_posts(ctx, &posts, &mut report).await?;
            if fetched < ctx.source.page_size() as usize {
                break;
            }
            page += 1;
        }
        Ok(report)
    }
}

impl BlogStage {
    pub async fn sync_terms(
        &self,
        ctx: &mut StageContext,
        records: &[SourcePostTerm],
        kind: EntityKind,
        report: &mut StageReport,
    ) -> SyncResult<()> {
        for record in records {
            ctx.check_cancelled()?;
            match self.sync_term(ctx, record, kind).await {
                Ok(()) => report.created += 1,
                Err(e) if e.is_record_scoped() => {
                    tracing::warn!("Skipping {} {}: {}", kind, record.id, e);
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
            ctx.flush_if_full().await?;
        }
        Ok(())
    }

    async fn sync_term(
        &self,
        ctx: &mut StageContext,
        record: &SourcePostTerm,
        kind: EntityKind,
    ) -> SyncResult<()> {
        let slug = record
            .slug
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SyncError::malformed("term without a slug"))?;
        let name =
            record.name.as_deref().map(str::trim).filter(|n| !n.is_empty()).unwrap_or(slug);

        let external_id = record.id.to_string();
        let id = ctx.identity.get_or_create(kind, &external_id, Some(slug)).await?;
        let now = Utc::now();
        match kind {
            EntityKind::BlogTag => ctx.batch.stage(PendingWrite::UpsertBlogTag {
                entity: BlogTag {
                    id,
                    slug: slug.to_string(),
                    name: name.to_string(),
                    created_at: now,
                },
            }),
            _ => ctx.batch.stage(PendingWrite::UpsertBlogCategory {
                entity: BlogCategory {
                    id,
                    slug: slug.to_string(),
                    name: name.to_string(),
                    created_at: now,
                },
            }),
        }
        ctx.identity.touch(kind, &external_id).await?;
        Ok(())
    }

    pub async fn sync_posts(
        &self,
        ctx: &mut StageContext,
        records: &[SourcePost],
        report: &mut StageReport,
    ) -> SyncResult<()> {
        for record in records {
            ctx.check_cancelled()?;
            match self.sync_post(ctx, record).await {
                Ok(true) => report.created += 1,
                Ok(false) => report.updated += 1,
                Err(e) if e.is_record_scoped() => {
                    tracing::warn!("Skipping post {}: {}", record.id, e);
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
            ctx.flush_if_full().await?;
        }
        Ok(())
    }

    async fn sync_post(&self, ctx: &mut StageContext, record: &SourcePost) -> SyncResult<bool> {
        let slug = record
            .slug
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SyncError::malformed("post without a slug"))?;
        let title = record
            .title
            .as_ref()
            .and_then(|t| t.text())
            .ok_or_else(|| SyncError::malformed("post without a title"))?;

        let external_id = record.id.to_string();
        let id = ctx.identity.get_or_create(EntityKind::BlogPost, &external_id, Some(slug)).await?;
        let existing = ctx.blog.find_post(&id).await?;

        let mut category_ids = Vec::new();
        for term in &record.categories {
            match ctx.identity.find(EntityKind::BlogCategory, &term.to_string()).await? {
                Some(category_id) => category_ids.push(category_id),
                None => tracing::warn!("Post {} references unmapped category {}", record.id, term),
            }
        }
        let mut tag_ids = Vec::new();
        for term in &record.tags {
            match ctx.identity.find(EntityKind::BlogTag, &term.to_string()).await? {
                Some(tag_id) => tag_ids.push(tag_id),
                None => tracing::warn!("Post {} references unmapped tag {}", record.id, term),
            }
        }

        let now = Utc::now();
        let entity = BlogPost {
            id: id.clone(),
            slug: slug.to_string(),
            title: title.to_string(),
            content: record.content.as_ref().and_then(|c| c.text()).map(str::to_string),
            excerpt: record.excerpt.as_ref().and_then(|e| e.text()).map(str::to_string),
            published_at: record.date_gmt.as_deref().and_then(parse_source_datetime),
            created_at: existing.as_ref().map(|p| p.created_at).unwrap_or(now),
            updated_at: now,
        };
        ctx.batch.stage(PendingWrite::UpsertBlogPost { entity });
        ctx.batch
            .stage(PendingWrite::ReplacePostCategories { post_id: id.clone(), category_ids });
        ctx.batch.stage(PendingWrite::ReplacePostTags { post_id: id, tag_ids });
        ctx.identity.touch(EntityKind::BlogPost, &external_id).await?;
        Ok(existing.is_none())
    }
}

/// WordPress reports GMT timestamps without a zone suffix; RFC 3339 input is
/// accepted too.
fn parse_source_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_context, test_database};

    fn term(id: i64, slug: &str) -> SourcePostTerm {
        SourcePostTerm { id, name: Some(slug.to_string()), slug: Some(slug.to_string()) }
    }

    fn post(id: i64, slug: &str, categories: Vec<i64>) -> SourcePost {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "slug": slug,
            "title": {"rendered": slug.to_uppercase()},
            "content": {"rendered": "<p>body</p>"},
            "excerpt": {"rendered": ""},
            "date_gmt": "2025-11-02T08:30:00",
            "categories": categories,
            "tags": [],
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn posts_sync_with_term_links_and_rerun_is_stable() {
        let (_dir, db) = test_database().await;
        let mut ctx = test_context(&db);
        let stage = BlogStage;

        let mut report = StageReport::default();
        stage
            .sync_terms(&mut ctx, &[term(1, "news")], EntityKind::BlogCategory, &mut report)
            .await
            .unwrap();
        stage.sync_posts(&mut ctx, &[post(10, "hello", vec![1])], &mut report).await.unwrap();
        ctx.flush().await.unwrap();

        let posts: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM blog_posts").fetch_one(db.pool()).await.unwrap();
        assert_eq!(posts, 1);
        let links: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blog_post_categories")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(links, 1);

        // Empty excerpt is stored as absent, GMT timestamp parsed
        let excerpt: Option<String> =
            sqlx::query_scalar("SELECT excerpt FROM blog_posts").fetch_one(db.pool()).await.unwrap();
        assert_eq!(excerpt, None);
        let published: Option<chrono::DateTime<Utc>> =
            sqlx::query_scalar("SELECT published_at FROM blog_posts")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert!(published.is_some());

        let mut second = StageReport::default();
        stage.sync_posts(&mut ctx, &[post(10, "hello", vec![1])], &mut second).await.unwrap();
        ctx.flush().await.unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.updated, 1);
        let posts: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM blog_posts").fetch_one(db.pool()).await.unwrap();
        assert_eq!(posts, 1);
    }

    #[tokio::test]
    async fn unmapped_post_terms_are_dropped_not_fatal() {
        let (_dir, db) = test_database().await;
        let mut ctx = test_context(&db);
        let stage = BlogStage;

        let mut report = StageReport::default();
        stage.sync_posts(&mut ctx, &[post(10, "hello", vec![42])], &mut report).await.unwrap();
        ctx.flush().await.unwrap();
        assert_eq!(report.created, 1);

        let links: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blog_post_categories")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(links, 0);
    }

    #[test]
    fn source_datetimes_parse_with_and_without_zone() {
        assert!(parse_source_datetime("2025-11-02T08:30:00").is_some());
        assert!(parse_source_datetime("2025-11-02T08:30:00Z").is_some());
        assert!(parse_source_datetime("not a date").is_none());
    }
}
