//! Vendor/User identity resolver
//!
//! Resolves one external seller/store record to an internal User + Vendor +
//! Owner membership. The ordered match strategy (real email, then canonical
//! phone, then a deterministic synthetic address) only runs the first time a
//! store is seen; afterwards the identity map pins the pair so every run
//! resolves the same store to the same internal identities.

use chrono::Utc;
use uuid::Uuid;

use crate::application::batch::{BatchCommitController, PendingWrite};
use crate::application::caches::RunCaches;
use crate::application::identity_map::IdentityMap;
use crate::domain::entities::{MemberRole, User, Vendor, VendorMember};
use crate::domain::errors::SyncResult;
use crate::domain::identity::EntityKind;
use crate::infrastructure::parsing::{
    canonicalize_phone, normalize_email, parse_decimal, slugify, synthetic_store_email,
};
use crate::infrastructure::source_dtos::{SourceStore, SourceUser};
use crate::infrastructure::vendor_repository::VendorRepository;

#[derive(Debug, Clone)]
pub struct VendorSyncOutcome {
    pub user_id: String,
    pub vendor_id: String,
    pub created_user: bool,
    pub created_vendor: bool,
}

pub struct VendorIdentityResolver<'a> {
    identity: &'a IdentityMap,
    repo: &'a VendorRepository,
}

impl<'a> VendorIdentityResolver<'a> {
    pub fn new(identity: &'a IdentityMap, repo: &'a VendorRepository) -> Self {
        Self { identity, repo }
    }

    /// Resolve a store record to its internal identity, creating or updating
    /// the user, vendor, and owner membership as needed.
    pub async fn resolve(
        &self,
        store: &SourceStore,
        linked_user: Option<&SourceUser>,
        caches: &mut RunCaches,
        batch: &mut BatchCommitController,
    ) -> SyncResult<VendorSyncOutcome> {
        let external_id = store.id.to_string();

        let real_email = store
            .email
            .as_deref()
            .and_then(normalize_email)
            .or_else(|| linked_user.and_then(|u| u.email.as_deref()).and_then(normalize_email));
        let phone = store.phone.as_deref().and_then(canonicalize_phone);
        let display_name = store
            .display_name()
            .or_else(|| linked_user.and_then(|u| u.name.clone()))
            .filter(|n| !n.trim().is_empty());

        let (user_id, created_user) = self
            .resolve_user(&external_id, real_email.as_deref(), phone.as_deref(), display_name.as_deref(), caches, batch)
            .await?;

        let (vendor_id, created_vendor) =
            self.upsert_vendor(&external_id, store, display_name.as_deref(), batch).await?;

        self.ensure_owner_membership(&user_id, &vendor_id, caches, batch).await?;

        self.identity.touch(EntityKind::User, &external_id).await?;
        self.identity.touch(EntityKind::Vendor, &external_id).await?;

        Ok(VendorSyncOutcome { user_id, vendor_id, created_user, created_vendor })
    }

    /// Ordered match, first hit wins: (1) real email, (2) canonical phone,
    /// (3) the deterministic synthetic address for this store. No hit means a
    /// new user built from the best available identity.
    async fn resolve_user(
        &self,
        external_id: &str,
        real_email: Option<&str>,
        phone: Option<&str>,
        display_name: Option<&str>,
        caches: &mut RunCaches,
        batch: &mut BatchCommitController,
    ) -> SyncResult<(String, bool)> {
        let synthetic = synthetic_store_email(self.identity.provider(), external_id);

        // The map pins identity across runs; the match strategy only applies
        // to stores never seen before.
        if let Some(user_id) = self.identity.find(EntityKind::User, external_id).await? {
            match self.repo.find_user(&user_id).await? {
                Some(user) => self.backfill_user(user, phone, display_name, caches, batch),
                None if !caches.users_by_email.values().any(|id| id == &user_id) => {
                    // Mapping survived an interrupted run whose batch never
                    // committed; recreate the row under the pinned ID.
                    let email = real_email.map(str::to_string).unwrap_or(synthetic);
                    self.stage_new_user(user_id.clone(), email, phone, display_name, caches, batch);
                }
                None => {}
            }
            return Ok((user_id, false));
        }

        let mut matched: Option<String> = None;
        if let Some(email) = real_email {
            matched = self.match_by_email(email, caches).await?;
        }
        if matched.is_none() {
            if let Some(phone) = phone {
                matched = match caches.users_by_phone.get(phone) {
                    Some(id) => Some(id.clone()),
                    None => self.repo.find_user_by_phone(phone).await?.map(|u| u.id),
                };
            }
        }
        if matched.is_none() {
            matched = self.match_by_email(&synthetic, caches).await?;
        }

        match matched {
            Some(found_id) => {
                // Bind the store to the matched account; the winner's ID is
                // authoritative should a mapping appear concurrently.
                let user_id =
                    self.identity.bind(EntityKind::User, external_id, &found_id, None).await?;
                if let Some(user) = self.repo.find_user(&user_id).await? {
                    self.backfill_user(user, phone, display_name, caches, batch);
                }
                Ok((user_id, false))
            }
            None => {
                let user_id =
                    self.identity.get_or_create(EntityKind::User, external_id, None).await?;
                let email = real_email.map(str::to_string).unwrap_or(synthetic);
                self.stage_new_user(user_id.clone(), email, phone, display_name, caches, batch);
                tracing::debug!("Created user {} for store {}", user_id, external_id);
                Ok((user_id, true))
            }
        }
    }

    async fn match_by_email(
        &self,
        email: &str,
        caches: &RunCaches,
    ) -> SyncResult<Option<String>> {
        if let Some(id) = caches.users_by_email.get(email) {
            return Ok(Some(id.clone()));
        }
        Ok(self.repo.find_user_by_email(email).await?.map(|u| u.id))
    }

    fn stage_new_user(
        &self,
        user_id: String,
        email: String,
        phone: Option<&str>,
        display_name: Option<&str>,
        caches: &mut RunCaches,
        batch: &mut BatchCommitController,
    ) {
        let now = Utc::now();
        let user = User {
            id: user_id.clone(),
            email: email.clone(),
            phone: phone.map(str::to_string),
            display_name: display_name.map(str::to_string),
            created_at: now,
            updated_at: now,
        };
        caches.users_by_email.insert(email, user_id.clone());
        if let Some(phone) = &user.phone {
            caches.users_by_phone.insert(phone.clone(), user_id);
        }
        batch.stage(PendingWrite::InsertUser { entity: user });
    }

    /// Populated fields are never overwritten; only empty ones are filled
    /// from newly observed source data.
    fn backfill_user(
        &self,
        user: User,
        phone: Option<&str>,
        display_name: Option<&str>,
        caches: &mut RunCaches,
        batch: &mut BatchCommitController,
    ) {
        let mut updated = user.clone();
        if updated.phone.is_none() {
            updated.phone = phone.map(str::to_string);
        }
        if updated.display_name.is_none() {
            updated.display_name = display_name.map(str::to_string);
        }
        let changed = updated.phone != user.phone || updated.display_name != user.display_name;
        caches.users_by_email.insert(updated.email.clone(), updated.id.clone());
        if let Some(phone) = &updated.phone {
            caches.users_by_phone.insert(phone.clone(), updated.id.clone());
        }
        if changed {
            updated.updated_at = Utc::now();
            batch.stage(PendingWrite::UpdateUser { entity: updated });
        }
    }

    async fn upsert_vendor(
        &self,
        external_id: &str,
        store: &SourceStore,
        display_name: Option<&str>,
        batch: &mut BatchCommitController,
    ) -> SyncResult<(String, bool)> {
        let now = Utc::now();
        let vendor_id = self.identity.get_or_create(EntityKind::Vendor, external_id, None).await?;
        let existing = self.repo.find_vendor(&vendor_id).await?;
        let created = existing.is_none();

        let name = display_name
            .map(str::to_string)
            .unwrap_or_else(|| format!("Store {external_id}"));
        // Commission applies only when the source reports a percentage type;
        // flat/fixed commissions carry no percent value.
        let commission_percent = if store.admin_commission_type.as_deref() == Some("percentage") {
            store.admin_commission.as_deref().and_then(parse_decimal)
        } else {
            None
        };

        let vendor = Vendor {
            id: vendor_id.clone(),
            slug: slugify(&name),
            name,
            commission_percent,
            created_at: existing.as_ref().map(|v| v.created_at).unwrap_or(now),
            updated_at: now,
        };
        batch.stage(PendingWrite::UpsertVendor { entity: vendor });
        Ok((vendor_id, created))
    }

    /// Maintain exactly one Owner membership for the resolved user: an
    /// existing membership is re-pointed at the correct vendor rather than
    /// duplicated, and a second Owner row for the same vendor is never
    /// created.
    async fn ensure_owner_membership(
        &self,
        user_id: &str,
        vendor_id: &str,
        caches: &mut RunCaches,
        batch: &mut BatchCommitController,
    ) -> SyncResult<()> {
        let existing = match caches.members_by_user.get(user_id) {
            Some((member_id, current_vendor)) => {
                Some((member_id.clone(), current_vendor.clone()))
            }
            None => self
                .repo
                .find_member_by_user(user_id)
                .await?
                .map(|m| (m.id, m.vendor_id)),
        };

        match existing {
            Some((member_id, current_vendor)) => {
                if current_vendor != vendor_id {
                    batch.stage(PendingWrite::RepointVendorMember {
                        member_id: member_id.clone(),
                        vendor_id: vendor_id.to_string(),
                    });
                }
                caches
                    .members_by_user
                    .insert(user_id.to_string(), (member_id, vendor_id.to_string()));
            }
            None => {
                if let Some(owner) = self.repo.find_owner_by_vendor(vendor_id).await? {
                    tracing::warn!(
                        vendor_id,
                        existing_owner = %owner.user_id,
                        "Vendor already has an owner; not adding a second one"
                    );
                    return Ok(());
                }
                let now = Utc::now();
                let member = VendorMember {
                    id: Uuid::new_v4().to_string(),
                    vendor_id: vendor_id.to_string(),
                    user_id: user_id.to_string(),
                    role: MemberRole::Owner,
                    created_at: now,
                    updated_at: now,
                };
                caches
                    .members_by_user
                    .insert(user_id.to_string(), (member.id.clone(), member.vendor_id.clone()));
                batch.stage(PendingWrite::InsertVendorMember { entity: member });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::identity_map_repository::IdentityMapRepository;
    use crate::test_support::{sample_user, test_database};

    fn store(id: i64, email: Option<&str>, phone: Option<&str>) -> SourceStore {
        SourceStore {
            id,
            store_name: Some(format!("Store {id}")),
            first_name: None,
            last_name: None,
            email: email.map(str::to_string),
            phone: phone.map(str::to_string),
            admin_commission: None,
            admin_commission_type: None,
        }
    }

    struct Fixture {
        db: crate::infrastructure::DatabaseConnection,
        identity: IdentityMap,
        repo: VendorRepository,
    }

    async fn fixture() -> (tempfile::TempDir, Fixture) {
        let (dir, db) = test_database().await;
        let identity = IdentityMap::new("dokan", IdentityMapRepository::new(db.pool().clone()));
        let repo = VendorRepository::new(db.pool().clone());
        (dir, Fixture { db, identity, repo })
    }

    async fn insert_user(db: &crate::infrastructure::DatabaseConnection, user: &User) {
        let mut tx = db.pool().begin().await.unwrap();
        VendorRepository::insert_user(&mut tx, user).await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn email_match_beats_phone_and_synthetic() {
        let (_dir, f) = fixture().await;

        // Three candidate accounts exist: email-matched, phone-matched, and
        // a prior synthetic account for the same store.
        let mut by_email = sample_user("u-email", "seller@example.com");
        by_email.phone = Some("09999999999".into());
        insert_user(&f.db, &by_email).await;
        let mut by_phone = sample_user("u-phone", "other@example.com");
        by_phone.phone = Some("09123456789".into());
        insert_user(&f.db, &by_phone).await;
        insert_user(&f.db, &sample_user("u-synth", &synthetic_store_email("dokan", "8"))).await;

        let resolver = VendorIdentityResolver::new(&f.identity, &f.repo);
        let mut caches = RunCaches::new();
        let mut batch = BatchCommitController::new(f.db.pool().clone(), 100);

        let outcome = resolver
            .resolve(
                &store(8, Some("Seller@Example.com"), Some("+98 912 345 6789")),
                None,
                &mut caches,
                &mut batch,
            )
            .await
            .unwrap();
        assert_eq!(outcome.user_id, "u-email");
        assert!(!outcome.created_user);
    }

    #[tokio::test]
    async fn phone_match_applies_without_email() {
        let (_dir, f) = fixture().await;
        let mut by_phone = sample_user("u-phone", "other@example.com");
        by_phone.phone = Some("09123456789".into());
        insert_user(&f.db, &by_phone).await;

        let resolver = VendorIdentityResolver::new(&f.identity, &f.repo);
        let mut caches = RunCaches::new();
        let mut batch = BatchCommitController::new(f.db.pool().clone(), 100);

        let outcome = resolver
            .resolve(&store(8, None, Some("0098 912 345 6789")), None, &mut caches, &mut batch)
            .await
            .unwrap();
        assert_eq!(outcome.user_id, "u-phone");
    }

    #[tokio::test]
    async fn no_signal_falls_back_to_deterministic_synthetic_identity() {
        let (_dir, f) = fixture().await;
        let resolver = VendorIdentityResolver::new(&f.identity, &f.repo);
        let mut caches = RunCaches::new();
        let mut batch = BatchCommitController::new(f.db.pool().clone(), 100);

        let first = resolver.resolve(&store(8, None, None), None, &mut caches, &mut batch).await.unwrap();
        assert!(first.created_user);
        batch.flush(&mut caches, &f.identity).await.unwrap();

        let created = f.repo.find_user(&first.user_id).await.unwrap().unwrap();
        assert_eq!(created.email, synthetic_store_email("dokan", "8"));

        // A second run resolves the same store to the same pair
        let second = resolver.resolve(&store(8, None, None), None, &mut caches, &mut batch).await.unwrap();
        assert_eq!(second.user_id, first.user_id);
        assert_eq!(second.vendor_id, first.vendor_id);
        assert!(!second.created_user);
    }

    #[tokio::test]
    async fn rerun_never_duplicates_owner_membership() {
        let (_dir, f) = fixture().await;
        let resolver = VendorIdentityResolver::new(&f.identity, &f.repo);
        let mut caches = RunCaches::new();
        let mut batch = BatchCommitController::new(f.db.pool().clone(), 100);

        let record = store(8, Some("seller@example.com"), None);
        let outcome = resolver.resolve(&record, None, &mut caches, &mut batch).await.unwrap();
        batch.flush(&mut caches, &f.identity).await.unwrap();

        // Fresh caches to model a separate run
        let mut caches = RunCaches::new();
        resolver.resolve(&record, None, &mut caches, &mut batch).await.unwrap();
        batch.flush(&mut caches, &f.identity).await.unwrap();

        assert_eq!(
            f.repo.count_members(&outcome.vendor_id, MemberRole::Owner).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn backfill_fills_only_empty_fields() {
        let (_dir, f) = fixture().await;
        let mut existing = sample_user("u-1", "seller@example.com");
        existing.display_name = Some("Original Name".into());
        insert_user(&f.db, &existing).await;

        let resolver = VendorIdentityResolver::new(&f.identity, &f.repo);
        let mut caches = RunCaches::new();
        let mut batch = BatchCommitController::new(f.db.pool().clone(), 100);

        let mut record = store(8, Some("seller@example.com"), Some("09123456789"));
        record.store_name = Some("New Store Name".into());
        resolver.resolve(&record, None, &mut caches, &mut batch).await.unwrap();
        batch.flush(&mut caches, &f.identity).await.unwrap();

        let user = f.repo.find_user("u-1").await.unwrap().unwrap();
        // Phone was empty and gets back-filled; the name was set and stays
        assert_eq!(user.phone.as_deref(), Some("09123456789"));
        assert_eq!(user.display_name.as_deref(), Some("Original Name"));
    }

    #[tokio::test]
    async fn percentage_commission_is_parsed_others_ignored() {
        let (_dir, f) = fixture().await;
        let resolver = VendorIdentityResolver::new(&f.identity, &f.repo);
        let mut caches = RunCaches::new();
        let mut batch = BatchCommitController::new(f.db.pool().clone(), 100);

        let mut record = store(8, None, None);
        record.admin_commission = Some("12.5".into());
        record.admin_commission_type = Some("percentage".into());
        let outcome = resolver.resolve(&record, None, &mut caches, &mut batch).await.unwrap();
        batch.flush(&mut caches, &f.identity).await.unwrap();
        let vendor = f.repo.find_vendor(&outcome.vendor_id).await.unwrap().unwrap();
        assert_eq!(vendor.commission_percent, Some(12.5));

        let mut record = store(9, None, None);
        record.admin_commission = Some("5000".into());
        record.admin_commission_type = Some("flat".into());
        let outcome = resolver.resolve(&record, None, &mut caches, &mut batch).await.unwrap();
        batch.flush(&mut caches, &f.identity).await.unwrap();
        let vendor = f.repo.find_vendor(&outcome.vendor_id).await.unwrap().unwrap();
        assert_eq!(vendor.commission_percent, None);
    }
}
