//! Vendor/user identity sync stage
//!
//! Independent of the catalog stages but ordered before vendor-link sync,
//! which needs the vendor mappings minted here. Each store record runs
//! through the ordered identity match; the users collection, when reachable,
//! enriches stores that expose no contact data of their own.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::application::sync_orchestrator::{StageContext, SyncStage};
use crate::application::vendor_resolver::VendorIdentityResolver;
use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::events::{StageName, StageReport};
use crate::infrastructure::source_dtos::{SourceStore, SourceUser};

pub struct VendorIdentityStage;

#[async_trait]
impl SyncStage for VendorIdentityStage {
    fn name(&self) -> StageName {
        StageName::VendorIdentity
    }

    async fn run(&self, ctx: &mut StageContext) -> SyncResult<StageReport> {
        // The users endpoint often sits behind auth on WordPress installs;
        // it only enriches identity signals, so unavailability is not fatal.
        let users = match ctx.source.get_all_paged::<SourceUser>("users", &[], &ctx.cancel).await {
            Ok(users) => users,
            Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
            Err(e) => {
                tracing::warn!("Users collection unavailable, continuing without it: {}", e);
                Vec::new()
            }
        };
        let users_by_id: HashMap<i64, SourceUser> =
            users.into_iter().map(|u| (u.id, u)).collect();

        let stores: Vec<SourceStore> =
            ctx.source.get_all_paged("stores", &[], &ctx.cancel).await?;

        let mut report = StageReport::default();
        self.sync_stores(ctx, &stores, &users_by_id, &mut report).await?;
        Ok(report)
    }
}

impl VendorIdentityStage {
    pub async fn sync_stores(
        &self,
        ctx: &mut StageContext,
        stores: &[SourceStore],
        users_by_id: &HashMap<i64, SourceUser>,
        report: &mut StageReport,
    ) -> SyncResult<()> {
        for store in stores {
            ctx.check_cancelled()?;
            let resolver = VendorIdentityResolver::new(&ctx.identity, &ctx.vendors);
            match resolver
                .resolve(store, users_by_id.get(&store.id), &mut ctx.caches, &mut ctx.batch)
                .await
            {
                Ok(outcome) => {
                    if outcome.created_vendor {
                        report.created += 1;
                    } else {
                        report.updated += 1;
                    }
                }
                Err(e) if e.is_record_scoped() => {
                    tracing::warn!("Skipping store {}: {}", store.id, e);
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
            ctx.flush_if_full().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::MemberRole;
    use crate::infrastructure::vendor_repository::VendorRepository;
    use crate::test_support::{test_context, test_database};

    fn store(id: i64, email: Option<&str>) -> SourceStore {
        SourceStore {
            id,
            store_name: Some(format!("Store {id}")),
            first_name: None,
            last_name: None,
            email: email.map(str::to_string),
            phone: None,
            admin_commission: None,
            admin_commission_type: None,
        }
    }

    #[tokio::test]
    async fn stage_rerun_is_idempotent() {
        let (_dir, db) = test_database().await;
        let mut ctx = test_context(&db);
        let stage = VendorIdentityStage;
        let repo = VendorRepository::new(db.pool().clone());

        let stores = vec![store(8, Some("a@example.com")), store(9, None)];
        let users = HashMap::new();

        let mut first = StageReport::default();
        stage.sync_stores(&mut ctx, &stores, &users, &mut first).await.unwrap();
        ctx.flush().await.unwrap();
        assert_eq!(first.created, 2);

        let mut second = StageReport::default();
        stage.sync_stores(&mut ctx, &stores, &users, &mut second).await.unwrap();
        ctx.flush().await.unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.updated, 2);

        let vendors: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM vendors").fetch_one(db.pool()).await.unwrap();
        let users_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(db.pool()).await.unwrap();
        let members: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vendor_members")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(vendors, 2);
        assert_eq!(users_count, 2);
        assert_eq!(members, 2);

        // Owner uniqueness per vendor holds after the re-run
        let vendor_id: String =
            sqlx::query_scalar("SELECT id FROM vendors LIMIT 1").fetch_one(db.pool()).await.unwrap();
        assert_eq!(repo.count_members(&vendor_id, MemberRole::Owner).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn linked_user_record_supplies_the_email() {
        let (_dir, db) = test_database().await;
        let mut ctx = test_context(&db);
        let stage = VendorIdentityStage;

        let mut users = HashMap::new();
        users.insert(
            8,
            SourceUser {
                id: 8,
                email: Some("From-User@example.com".into()),
                name: Some("Ali".into()),
                slug: None,
            },
        );

        let mut report = StageReport::default();
        stage.sync_stores(&mut ctx, &[store(8, None)], &users, &mut report).await.unwrap();
        ctx.flush().await.unwrap();

        let email: String =
            sqlx::query_scalar("SELECT email FROM users LIMIT 1").fetch_one(db.pool()).await.unwrap();
        assert_eq!(email, "from-user@example.com");
    }
}
