//! Repository for users, vendors, and vendor memberships

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection, SqlitePool, sqlite::SqliteRow};

use crate::domain::entities::{MemberRole, User, Vendor, VendorMember};
use crate::domain::errors::SyncResult;

#[derive(Clone)]
pub struct VendorRepository {
    pool: Arc<SqlitePool>,
}

impl VendorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    // ===============================
    // USER OPERATIONS
    // ===============================

    pub async fn find_user(&self, id: &str) -> SyncResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, email, phone, display_name, created_at, updated_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(row.map(map_user))
    }

    pub async fn find_user_by_email(&self, email: &str) -> SyncResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, email, phone, display_name, created_at, updated_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(row.map(map_user))
    }

    pub async fn find_user_by_phone(&self, phone: &str) -> SyncResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, email, phone, display_name, created_at, updated_at FROM users WHERE phone = ?",
        )
        .bind(phone)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(row.map(map_user))
    }

    pub async fn insert_user(conn: &mut SqliteConnection, user: &User) -> SyncResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, phone, display_name, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.display_name)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn update_user(conn: &mut SqliteConnection, user: &User) -> SyncResult<()> {
        sqlx::query(
            r#"
            UPDATE users SET email = ?, phone = ?, display_name = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.display_name)
        .bind(user.updated_at)
        .bind(&user.id)
        .execute(conn)
        .await?;
        Ok(())
    }

    // ===============================
    // VENDOR OPERATIONS
    // ===============================

    pub async fn find_vendor(&self, id: &str) -> SyncResult<Option<Vendor>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, slug, commission_percent, created_at, updated_at
            FROM vendors WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(row.map(map_vendor))
    }

    pub async fn upsert_vendor(conn: &mut SqliteConnection, vendor: &Vendor) -> SyncResult<()> {
        sqlx::query(
            r#"
            INSERT INTO vendors (id, name, slug, commission_percent, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                slug = excluded.slug,
                commission_percent = excluded.commission_percent,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&vendor.id)
        .bind(&vendor.name)
        .bind(&vendor.slug)
        .bind(vendor.commission_percent)
        .bind(vendor.created_at)
        .bind(vendor.updated_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Insert the reserved marketplace vendor outside any batch so offers can
    /// reference it from the very first one.
    pub async fn insert_vendor_if_absent(&self, vendor: &Vendor) -> SyncResult<()> {
        sqlx::query(
            r#"
            INSERT INTO vendors (id, name, slug, commission_percent, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&vendor.id)
        .bind(&vendor.name)
        .bind(&vendor.slug)
        .bind(vendor.commission_percent)
        .bind(vendor.created_at)
        .bind(vendor.updated_at)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    // ===============================
    // MEMBERSHIP OPERATIONS
    // ===============================

    pub async fn find_member_by_user(&self, user_id: &str) -> SyncResult<Option<VendorMember>> {
        let row = sqlx::query(
            r#"
            SELECT id, vendor_id, user_id, role, created_at, updated_at
            FROM vendor_members WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(row.map(map_member))
    }

    pub async fn find_owner_by_vendor(&self, vendor_id: &str) -> SyncResult<Option<VendorMember>> {
        let row = sqlx::query(
            r#"
            SELECT id, vendor_id, user_id, role, created_at, updated_at
            FROM vendor_members WHERE vendor_id = ? AND role = ?
            "#,
        )
        .bind(vendor_id)
        .bind(MemberRole::Owner.as_str())
        .fetch_optional(&*self.pool)
        .await?;
        Ok(row.map(map_member))
    }

    pub async fn insert_member(
        conn: &mut SqliteConnection,
        member: &VendorMember,
    ) -> SyncResult<()> {
        sqlx::query(
            r#"
            INSERT INTO vendor_members (id, vendor_id, user_id, role, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&member.id)
        .bind(&member.vendor_id)
        .bind(&member.user_id)
        .bind(member.role.as_str())
        .bind(member.created_at)
        .bind(member.updated_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Re-point an existing membership at a different vendor instead of
    /// creating a second row.
    pub async fn repoint_member(
        conn: &mut SqliteConnection,
        member_id: &str,
        vendor_id: &str,
        at: DateTime<Utc>,
    ) -> SyncResult<()> {
        sqlx::query("UPDATE vendor_members SET vendor_id = ?, updated_at = ? WHERE id = ?")
            .bind(vendor_id)
            .bind(at)
            .bind(member_id)
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn count_members(&self, vendor_id: &str, role: MemberRole) -> SyncResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM vendor_members WHERE vendor_id = ? AND role = ?",
        )
        .bind(vendor_id)
        .bind(role.as_str())
        .fetch_one(&*self.pool)
        .await?;
        Ok(count)
    }
}

fn map_user(row: SqliteRow) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        phone: row.get("phone"),
        display_name: row.get("display_name"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn map_vendor(row: SqliteRow) -> Vendor {
    Vendor {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        commission_percent: row.get("commission_percent"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn map_member(row: SqliteRow) -> VendorMember {
    VendorMember {
        id: row.get("id"),
        vendor_id: row.get("vendor_id"),
        user_id: row.get("user_id"),
        role: MemberRole::parse(row.get::<String, _>("role").as_str()),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
