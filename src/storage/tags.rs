use sqlx::SqliteConnection;

use super::articles::{article_exists, replace_article_tags};
use super::schema::Database;
use super::types::{now_millis, DatabaseError, StorageResult, Tag, TagRow};

/// Return the id of the tag named `name`, creating it if needed.
///
/// The UNIQUE(name) constraint decides: a concurrent insert of the same name
/// is absorbed by `ON CONFLICT DO NOTHING` and the lookup finds the winner.
pub(crate) async fn find_or_create_tag(
    conn: &mut SqliteConnection,
    name: &str,
    created_by: Option<&str>,
) -> StorageResult<i64> {
    sqlx::query(
        "INSERT INTO tags (name, created_by, created_at) VALUES (?, ?, ?) ON CONFLICT(name) DO NOTHING",
    )
    .bind(name)
    .bind(created_by)
    .bind(now_millis())
    .execute(&mut *conn)
    .await?;

    let (id,): (i64,) = sqlx::query_as("SELECT id FROM tags WHERE name = ?")
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;
    Ok(id)
}

impl Database {
    // ========================================================================
    // Tag Operations
    // ========================================================================

    /// All tags, alphabetical by name.
    pub async fn list_tags(&self) -> StorageResult<Vec<Tag>> {
        let rows = sqlx::query_as::<_, TagRow>(
            "SELECT id, name, created_by, created_at FROM tags ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(TagRow::into_tag).collect())
    }

    pub async fn get_tag(&self, id: i64) -> StorageResult<Option<Tag>> {
        let row = sqlx::query_as::<_, TagRow>(
            "SELECT id, name, created_by, created_at FROM tags WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(TagRow::into_tag))
    }

    /// Exact, case-sensitive name lookup.
    pub async fn get_tag_by_name(&self, name: &str) -> StorageResult<Option<Tag>> {
        let row = sqlx::query_as::<_, TagRow>(
            "SELECT id, name, created_by, created_at FROM tags WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(TagRow::into_tag))
    }

    /// Create a tag, or return the existing one with the same name.
    ///
    /// Idempotent: never creates a duplicate and never fails on an existing name.
    pub async fn create_tag(&self, name: &str, created_by: Option<&str>) -> StorageResult<Tag> {
        let clean_name = Self::sanitize_name(name, "Tag")?;

        let mut conn = self.pool.acquire().await?;
        let id = find_or_create_tag(&mut conn, &clean_name, created_by).await?;

        let row = sqlx::query_as::<_, TagRow>(
            "SELECT id, name, created_by, created_at FROM tags WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(row.into_tag())
    }

    /// Rename a tag. Renaming onto an existing name is a `Conflict`.
    pub async fn rename_tag(&self, id: i64, new_name: &str) -> StorageResult<Option<Tag>> {
        let clean_name = Self::sanitize_name(new_name, "Tag")?;

        let row = sqlx::query_as::<_, TagRow>(
            "UPDATE tags SET name = ? WHERE id = ? RETURNING id, name, created_by, created_at",
        )
        .bind(&clean_name)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(TagRow::into_tag))
    }

    /// Delete a tag; its article associations cascade.
    pub async fn delete_tag(&self, id: i64) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM tags WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn tag_in_use(&self, id: i64) -> StorageResult<bool> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM article_tags WHERE tag_id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    /// Tags attached to an article, sorted by name.
    pub async fn get_tags_for_article(&self, article_id: i64) -> StorageResult<Vec<Tag>> {
        let rows = sqlx::query_as::<_, TagRow>(
            r#"
            SELECT t.id, t.name, t.created_by, t.created_at
            FROM article_tags atg
            JOIN tags t ON t.id = atg.tag_id
            WHERE atg.article_id = ?
            ORDER BY t.name
        "#,
        )
        .bind(article_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(TagRow::into_tag).collect())
    }

    /// Replace an article's tags in one transaction.
    pub async fn set_article_tags(
        &self,
        article_id: i64,
        names: &[String],
        created_by: Option<&str>,
    ) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        if !article_exists(&mut tx, article_id).await? {
            return Err(DatabaseError::NotFound {
                entity: "article",
                id: article_id,
            });
        }
        replace_article_tags(&mut tx, article_id, names, created_by).await?;

        tx.commit().await?;
        Ok(())
    }
}
