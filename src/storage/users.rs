use super::schema::Database;
use super::types::{now_millis, DatabaseError, StorageResult, User, UserRole, UserRow};

const USER_COLUMNS: &str =
    "id, email, password_hash, role, approved, is_root, created_at, last_login_at";

fn normalize_email(email: &str) -> StorageResult<String> {
    let trimmed = email.trim();
    if trimmed.is_empty() {
        return Err(DatabaseError::Validation(
            "Email cannot be empty".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Create a user account. A taken email surfaces as `Conflict`.
    ///
    /// `password_hash` must already be a PHC-format hash; see
    /// [`crate::storage::hash_password`].
    pub async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        role: UserRole,
        approved: bool,
    ) -> StorageResult<User> {
        let email = normalize_email(email)?;

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (email, password_hash, role, approved, is_root, created_at)
            VALUES (?, ?, ?, ?, 0, ?)
            RETURNING {USER_COLUMNS}
        "#
        ))
        .bind(&email)
        .bind(password_hash)
        .bind(role.as_str())
        .bind(approved)
        .bind(now_millis())
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(user_id = row.id, role = role.as_str(), "Created user");
        Ok(row.into_user())
    }

    pub async fn get_user_by_id(&self, id: i64) -> StorageResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserRow::into_user))
    }

    /// Look up a user for a credential check.
    pub async fn get_user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ?"
        ))
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserRow::into_user))
    }

    /// All users, newest account first.
    pub async fn list_users(&self) -> StorageResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(UserRow::into_user).collect())
    }

    pub async fn update_last_login(&self, id: i64) -> StorageResult<()> {
        sqlx::query("UPDATE users SET last_login_at = ? WHERE id = ?")
            .bind(now_millis())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_user_role(&self, id: i64, role: UserRole) -> StorageResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET role = ? WHERE id = ? RETURNING {USER_COLUMNS}"
        ))
        .bind(role.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserRow::into_user))
    }

    pub async fn update_user_approved(
        &self,
        id: i64,
        approved: bool,
    ) -> StorageResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET approved = ? WHERE id = ? RETURNING {USER_COLUMNS}"
        ))
        .bind(approved)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserRow::into_user))
    }

    /// Delete a user with their favorites and view history.
    ///
    /// The root account can never be deleted. Deleting an absent id is not
    /// an error; returns whether a row was removed.
    pub async fn delete_user(&self, id: i64) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ? AND is_root = 0")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            tracing::debug!(user_id = id, "Deleted user");
            return Ok(true);
        }

        let is_root: Option<(bool,)> = sqlx::query_as("SELECT is_root FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        if let Some((true,)) = is_root {
            tracing::warn!(user_id = id, "Refused to delete root user");
            return Err(DatabaseError::Forbidden(
                "Cannot delete root user".to_string(),
            ));
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, DatabaseError, NewArticle, UserRole};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_lookup_user() {
        let db = test_db().await;
        let user = db
            .create_user(" agent@example.com ", "$argon2id$stub", UserRole::User, false)
            .await
            .unwrap();
        assert_eq!(user.email, "agent@example.com");
        assert_eq!(user.role, UserRole::User);
        assert!(!user.approved);
        assert!(!user.is_root);
        assert_eq!(user.last_login_at, None);

        let by_email = db.get_user_by_email("agent@example.com").await.unwrap();
        assert_eq!(by_email.as_ref().map(|u| u.id), Some(user.id));
        assert_eq!(by_email.unwrap().password_hash, "$argon2id$stub");
        assert_eq!(db.get_user_by_id(user.id).await.unwrap(), Some(user));
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict() {
        let db = test_db().await;
        db.create_user("dup@example.com", "h", UserRole::User, true)
            .await
            .unwrap();
        let result = db
            .create_user("dup@example.com", "h", UserRole::Admin, true)
            .await;
        assert!(matches!(result, Err(DatabaseError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_empty_email_rejected() {
        let db = test_db().await;
        let result = db.create_user("  ", "h", UserRole::User, true).await;
        assert!(matches!(result, Err(DatabaseError::Validation(_))));
    }

    #[tokio::test]
    async fn test_password_hash_not_serialized() {
        let db = test_db().await;
        let user = db
            .create_user("secret@example.com", "do-not-leak", UserRole::User, true)
            .await
            .unwrap();
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("do-not-leak"));
        assert!(json.contains("\"role\":\"user\""));
    }

    #[tokio::test]
    async fn test_role_and_approval_updates() {
        let db = test_db().await;
        let user = db
            .create_user("promote@example.com", "h", UserRole::User, false)
            .await
            .unwrap();

        let admin = db
            .update_user_role(user.id, UserRole::Admin)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(admin.role, UserRole::Admin);

        let approved = db.update_user_approved(user.id, true).await.unwrap().unwrap();
        assert!(approved.approved);

        assert!(db.update_user_role(999, UserRole::Admin).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_last_login() {
        let db = test_db().await;
        let user = db
            .create_user("login@example.com", "h", UserRole::User, true)
            .await
            .unwrap();
        db.update_last_login(user.id).await.unwrap();
        let user = db.get_user_by_id(user.id).await.unwrap().unwrap();
        assert!(user.last_login_at.is_some());
    }

    #[tokio::test]
    async fn test_list_users_newest_first() {
        let db = test_db().await;
        let first = db
            .create_user("first@example.com", "h", UserRole::User, true)
            .await
            .unwrap();
        let second = db
            .create_user("second@example.com", "h", UserRole::User, true)
            .await
            .unwrap();

        let ids: Vec<i64> = db.list_users().await.unwrap().iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn test_delete_user_cascades_user_state() {
        let db = test_db().await;
        let user = db
            .create_user("leaving@example.com", "h", UserRole::User, true)
            .await
            .unwrap();
        let article = db
            .create_article(&NewArticle {
                title: "Read me".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        db.add_favorite(user.id, article.id).await.unwrap();
        db.record_view(user.id, article.id).await.unwrap();

        assert!(db.delete_user(user.id).await.unwrap());
        assert!(!db.delete_user(user.id).await.unwrap());

        let (favorites,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_favorites")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        let (views,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recently_viewed")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!((favorites, views), (0, 0));
    }

    #[tokio::test]
    async fn test_root_user_cannot_be_deleted() {
        let db = test_db().await;
        let root = db
            .create_user("root@example.com", "h", UserRole::Admin, true)
            .await
            .unwrap();
        sqlx::query("UPDATE users SET is_root = 1 WHERE id = ?")
            .bind(root.id)
            .execute(&db.pool)
            .await
            .unwrap();

        let result = db.delete_user(root.id).await;
        assert!(matches!(result, Err(DatabaseError::Forbidden(_))));
        assert!(db.get_user_by_id(root.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_root_with_user_role_cannot_be_deleted() {
        let db = test_db().await;
        let root = db
            .create_user("demoted@example.com", "h", UserRole::User, true)
            .await
            .unwrap();
        sqlx::query("UPDATE users SET is_root = 1 WHERE id = ?")
            .bind(root.id)
            .execute(&db.pool)
            .await
            .unwrap();

        let stored = db.get_user_by_id(root.id).await.unwrap().unwrap();
        assert_eq!(stored.role, UserRole::User);
        assert!(stored.is_root);

        let result = db.delete_user(root.id).await;
        assert!(matches!(result, Err(DatabaseError::Forbidden(_))));
        assert!(db.get_user_by_id(root.id).await.unwrap().is_some());
    }
}
