//! Repository for blog posts and their taxonomy

use std::sync::Arc;

use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::domain::entities::{BlogCategory, BlogPost, BlogTag};
use crate::domain::errors::SyncResult;

#[derive(Clone)]
pub struct BlogRepository {
    pool: Arc<SqlitePool>,
}

impl BlogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    pub async fn find_post(&self, id: &str) -> SyncResult<Option<BlogPost>> {
        let row = sqlx::query(
            r#"
            SELECT id, slug, title, content, excerpt, published_at, created_at, updated_at
            FROM blog_posts WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(row.map(|row| BlogPost {
            id: row.get("id"),
            slug: row.get("slug"),
            title: row.get("title"),
            content: row.get("content"),
            excerpt: row.get("excerpt"),
            published_at: row.get("published_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    pub async fn upsert_category(
        conn: &mut SqliteConnection,
        category: &BlogCategory,
    ) -> SyncResult<()> {
        sqlx::query(
            r#"
            INSERT INTO blog_categories (id, slug, name, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET slug = excluded.slug, name = excluded.name
            "#,
        )
        .bind(&category.id)
        .bind(&category.slug)
        .bind(&category.name)
        .bind(category.created_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn upsert_tag(conn: &mut SqliteConnection, tag: &BlogTag) -> SyncResult<()> {
        sqlx::query(
            r#"
            INSERT INTO blog_tags (id, slug, name, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET slug = excluded.slug, name = excluded.name
            "#,
        )
        .bind(&tag.id)
        .bind(&tag.slug)
        .bind(&tag.name)
        .bind(tag.created_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn upsert_post(conn: &mut SqliteConnection, post: &BlogPost) -> SyncResult<()> {
        sqlx::query(
            r#"
            INSERT INTO blog_posts
            (id, slug, title, content, excerpt, published_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                slug = excluded.slug,
                title = excluded.title,
                content = excluded.content,
                excerpt = excluded.excerpt,
                published_at = excluded.published_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&post.id)
        .bind(&post.slug)
        .bind(&post.title)
        .bind(&post.content)
        .bind(&post.excerpt)
        .bind(post.published_at)
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn replace_post_categories(
        conn: &mut SqliteConnection,
        post_id: &str,
        category_ids: &[String],
    ) -> SyncResult<()> {
        sqlx::query("DELETE FROM blog_post_categories WHERE post_id = ?")
            .bind(post_id)
            .execute(&mut *conn)
            .await?;
        for category_id in category_ids {
            sqlx::query("INSERT INTO blog_post_categories (post_id, category_id) VALUES (?, ?)")
                .bind(post_id)
                .bind(category_id)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }

    pub async fn replace_post_tags(
        conn: &mut SqliteConnection,
        post_id: &str,
        tag_ids: &[String],
    ) -> SyncResult<()> {
        sqlx::query("DELETE FROM blog_post_tags WHERE post_id = ?")
            .bind(post_id)
            .execute(&mut *conn)
            .await?;
        for tag_id in tag_ids {
            sqlx::query("INSERT INTO blog_post_tags (post_id, tag_id) VALUES (?, ?)")
                .bind(post_id)
                .bind(tag_id)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }
}
