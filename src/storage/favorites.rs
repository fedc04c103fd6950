use super::schema::Database;
use super::types::{now_millis, FavoriteEntry, StorageResult, UserArticleRow};

impl Database {
    // ========================================================================
    // Favorite Operations
    // ========================================================================

    /// Mark an article as a favorite of the user.
    ///
    /// Repeat adds are no-ops. The existence check and the insert are one
    /// statement, so concurrent adds cannot produce a duplicate row.
    /// Returns whether a new favorite was created.
    pub async fn add_favorite(&self, user_id: i64, article_id: i64) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_favorites (user_id, article_id, created_at)
            SELECT ?1, ?2, ?3
            WHERE NOT EXISTS (
                SELECT 1 FROM user_favorites WHERE user_id = ?1 AND article_id = ?2
            )
        "#,
        )
        .bind(user_id)
        .bind(article_id)
        .bind(now_millis())
        .execute(&self.pool)
        .await?;

        let created = result.rows_affected() > 0;
        tracing::debug!(user_id, article_id, created, "add_favorite");
        Ok(created)
    }

    /// Remove a favorite. Removing an absent favorite is not an error.
    pub async fn remove_favorite(&self, user_id: i64, article_id: i64) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM user_favorites WHERE user_id = ? AND article_id = ?")
            .bind(user_id)
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn is_favorited(&self, user_id: i64, article_id: i64) -> StorageResult<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM user_favorites WHERE user_id = ? AND article_id = ?)",
        )
        .bind(user_id)
        .bind(article_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// The user's favorites, most recently favorited first.
    pub async fn list_favorites(&self, user_id: i64) -> StorageResult<Vec<FavoriteEntry>> {
        let rows = sqlx::query_as::<_, UserArticleRow>(
            r#"
            SELECT f.article_id, f.created_at AS at,
                   a.title, a.summary,
                   c.name AS category, d.name AS department
            FROM user_favorites f
            JOIN articles a ON a.id = f.article_id
            LEFT JOIN categories c ON c.id = a.category_id
            LEFT JOIN departments d ON d.id = a.department_id
            WHERE f.user_id = ?
            ORDER BY f.created_at DESC, f.id DESC
        "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(UserArticleRow::into_favorite).collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, NewArticle, UserRole};

    async fn setup() -> (Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db
            .create_user("reader@example.com", "hash", UserRole::User, true)
            .await
            .unwrap();
        (db, user.id)
    }

    async fn article(db: &Database, title: &str) -> i64 {
        db.create_article(&NewArticle {
            title: title.to_string(),
            summary: Some(format!("About {title}")),
            ..Default::default()
        })
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn test_add_favorite_is_idempotent() {
        let (db, user_id) = setup().await;
        let article_id = article(&db, "Fav").await;

        assert!(db.add_favorite(user_id, article_id).await.unwrap());
        assert!(!db.add_favorite(user_id, article_id).await.unwrap());

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_favorites")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_remove_and_membership() {
        let (db, user_id) = setup().await;
        let article_id = article(&db, "Toggle").await;

        assert!(!db.is_favorited(user_id, article_id).await.unwrap());
        db.add_favorite(user_id, article_id).await.unwrap();
        assert!(db.is_favorited(user_id, article_id).await.unwrap());

        assert!(db.remove_favorite(user_id, article_id).await.unwrap());
        assert!(!db.remove_favorite(user_id, article_id).await.unwrap());
        assert!(!db.is_favorited(user_id, article_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_favorites_newest_first_with_taxonomy() {
        let (db, user_id) = setup().await;
        let cat = db.create_category("Guides", None, None).await.unwrap();
        let older = article(&db, "Older").await;
        let newer = db
            .create_article(&NewArticle {
                title: "Newer".to_string(),
                category_id: Some(cat.id),
                ..Default::default()
            })
            .await
            .unwrap()
            .id;

        db.add_favorite(user_id, older).await.unwrap();
        db.add_favorite(user_id, newer).await.unwrap();

        let favorites = db.list_favorites(user_id).await.unwrap();
        assert_eq!(favorites.len(), 2);
        assert_eq!(favorites[0].article_id, newer);
        assert_eq!(favorites[0].category.as_deref(), Some("Guides"));
        assert_eq!(favorites[0].department, None);
        assert_eq!(favorites[1].title, "Older");
        assert_eq!(favorites[1].summary.as_deref(), Some("About Older"));
    }

    #[tokio::test]
    async fn test_favorites_are_per_user() {
        let (db, user_id) = setup().await;
        let other = db
            .create_user("other@example.com", "hash", UserRole::User, true)
            .await
            .unwrap();
        let article_id = article(&db, "Mine").await;

        db.add_favorite(user_id, article_id).await.unwrap();
        assert!(db.list_favorites(other.id).await.unwrap().is_empty());
        assert!(!db.is_favorited(other.id, article_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_deleted_article_leaves_favorites() {
        let (db, user_id) = setup().await;
        let article_id = article(&db, "Ephemeral").await;
        db.add_favorite(user_id, article_id).await.unwrap();

        db.delete_article(article_id).await.unwrap();
        assert!(db.list_favorites(user_id).await.unwrap().is_empty());
    }
}
