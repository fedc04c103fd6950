use super::schema::Database;
use super::types::{now_millis, Category, DatabaseError, StorageResult, TaxonomyRow};
use crate::util::strip_control_chars;

impl Database {
    /// Sanitize and validate a taxonomy or tag name.
    ///
    /// Strips control characters, trims whitespace, and rejects
    /// empty/whitespace-only names. `what` names the entity in the error.
    pub(crate) fn sanitize_name(name: &str, what: &str) -> StorageResult<String> {
        let sanitized = strip_control_chars(name);
        let trimmed = sanitized.trim();
        if trimmed.is_empty() {
            return Err(DatabaseError::Validation(format!(
                "{what} name cannot be empty or whitespace-only"
            )));
        }
        Ok(trimmed.to_owned())
    }

    // ========================================================================
    // Category Operations
    // ========================================================================

    /// All categories, alphabetical by name.
    pub async fn list_categories(&self) -> StorageResult<Vec<Category>> {
        let rows = sqlx::query_as::<_, TaxonomyRow>(
            "SELECT id, name, description, created_by, created_at FROM categories ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(TaxonomyRow::into_category).collect())
    }

    pub async fn get_category(&self, id: i64) -> StorageResult<Option<Category>> {
        let row = sqlx::query_as::<_, TaxonomyRow>(
            "SELECT id, name, description, created_by, created_at FROM categories WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(TaxonomyRow::into_category))
    }

    /// Create a category.
    ///
    /// A duplicate name is rejected by the UNIQUE constraint and surfaces as
    /// [`DatabaseError::Conflict`].
    pub async fn create_category(
        &self,
        name: &str,
        description: Option<&str>,
        created_by: Option<&str>,
    ) -> StorageResult<Category> {
        let clean_name = Self::sanitize_name(name, "Category")?;

        let row = sqlx::query_as::<_, TaxonomyRow>(
            r#"
            INSERT INTO categories (name, description, created_by, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, name, description, created_by, created_at
        "#,
        )
        .bind(&clean_name)
        .bind(description)
        .bind(created_by)
        .bind(now_millis())
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(id = row.id, name = %row.name, "Created category");
        Ok(row.into_category())
    }

    /// Replace a category's name and description. `Ok(None)` if it does not exist.
    pub async fn update_category(
        &self,
        id: i64,
        name: &str,
        description: Option<&str>,
    ) -> StorageResult<Option<Category>> {
        let clean_name = Self::sanitize_name(name, "Category")?;

        let row = sqlx::query_as::<_, TaxonomyRow>(
            r#"
            UPDATE categories SET name = ?, description = ?
            WHERE id = ?
            RETURNING id, name, description, created_by, created_at
        "#,
        )
        .bind(&clean_name)
        .bind(description)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(TaxonomyRow::into_category))
    }

    /// Hard-delete a category. Articles in it become uncategorized (ON DELETE SET NULL).
    ///
    /// Callers that must not orphan articles check [`Database::category_in_use`] first.
    pub async fn delete_category(&self, id: i64) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Whether any article references this category.
    pub async fn category_in_use(&self, id: i64) -> StorageResult<bool> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles WHERE category_id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, DatabaseError, NewArticle};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_create_category() {
        let db = test_db().await;

        let cat = db
            .create_category("Tech", Some("Technical notes"), Some("admin"))
            .await
            .unwrap();
        assert!(cat.id > 0);
        assert_eq!(cat.description.as_deref(), Some("Technical notes"));
        assert_eq!(cat.created_by.as_deref(), Some("admin"));

        let categories = db.list_categories().await.unwrap();
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].name, "Tech");
    }

    #[tokio::test]
    async fn test_list_categories_ordering() {
        let db = test_db().await;

        db.create_category("Zebra", None, None).await.unwrap();
        db.create_category("Alpha", None, None).await.unwrap();
        db.create_category("Middle", None, None).await.unwrap();

        let categories = db.list_categories().await.unwrap();
        let names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Middle", "Zebra"]);
    }

    #[tokio::test]
    async fn test_duplicate_category_is_conflict() {
        let db = test_db().await;

        db.create_category("Tech", None, None).await.unwrap();
        let result = db.create_category("Tech", None, None).await;
        assert!(matches!(result, Err(DatabaseError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_update_category() {
        let db = test_db().await;

        let cat = db.create_category("Old Name", Some("desc"), None).await.unwrap();
        let updated = db
            .update_category(cat.id, "New Name", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "New Name");
        assert_eq!(updated.description, None);

        assert!(db.update_category(999, "Nope", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_category_uncategorizes_articles() {
        let db = test_db().await;

        let cat = db.create_category("Disposable", None, None).await.unwrap();
        let article = db
            .create_article(&NewArticle {
                title: "Orphan-to-be".to_string(),
                category_id: Some(cat.id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(db.category_in_use(cat.id).await.unwrap());

        assert!(db.delete_category(cat.id).await.unwrap());
        assert!(!db.delete_category(cat.id).await.unwrap());

        let article = db.get_article(article.id).await.unwrap().unwrap();
        assert_eq!(article.category_id, None);
        assert_eq!(article.category_name, None);
        assert!(!db.category_in_use(cat.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_category_not_in_use() {
        let db = test_db().await;
        let cat = db.create_category("Empty", None, None).await.unwrap();
        assert!(!db.category_in_use(cat.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_category() {
        let db = test_db().await;
        let cat = db.create_category("Lookup", None, None).await.unwrap();
        assert_eq!(db.get_category(cat.id).await.unwrap(), Some(cat));
        assert_eq!(db.get_category(12345).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_create_category_strips_control_chars() {
        let db = test_db().await;

        let cat = db
            .create_category("\x07Bell\x00 ", None, None)
            .await
            .unwrap();
        assert_eq!(cat.name, "Bell");
    }

    #[tokio::test]
    async fn test_create_category_rejects_whitespace_only() {
        let db = test_db().await;

        let result = db.create_category("   ", None, None).await;
        assert!(matches!(result, Err(DatabaseError::Validation(_))));
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[tokio::test]
    async fn test_rename_category_rejects_empty_name() {
        let db = test_db().await;

        let cat = db.create_category("Valid", None, None).await.unwrap();
        assert!(db.update_category(cat.id, "", None).await.is_err());

        // Original name should be preserved
        let categories = db.list_categories().await.unwrap();
        assert_eq!(categories[0].name, "Valid");
    }
}
