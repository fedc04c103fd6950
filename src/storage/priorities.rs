use super::schema::Database;
use super::types::{now_millis, NewPriority, Priority, PriorityRow, PriorityUpdate, StorageResult};

impl Database {
    // ========================================================================
    // Priority Operations
    // ========================================================================

    /// All priorities, most urgent (highest level) first.
    pub async fn list_priorities(&self) -> StorageResult<Vec<Priority>> {
        let rows = sqlx::query_as::<_, PriorityRow>(
            r#"
            SELECT id, name, level, color, created_by, created_at
            FROM priorities
            ORDER BY level DESC, name
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PriorityRow::into_priority).collect())
    }

    pub async fn get_priority(&self, id: i64) -> StorageResult<Option<Priority>> {
        let row = sqlx::query_as::<_, PriorityRow>(
            "SELECT id, name, level, color, created_by, created_at FROM priorities WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(PriorityRow::into_priority))
    }

    /// Create a priority. Duplicate names surface as `Conflict`.
    pub async fn create_priority(&self, input: &NewPriority) -> StorageResult<Priority> {
        let clean_name = Self::sanitize_name(&input.name, "Priority")?;

        let row = sqlx::query_as::<_, PriorityRow>(
            r#"
            INSERT INTO priorities (name, level, color, created_by, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, name, level, color, created_by, created_at
        "#,
        )
        .bind(&clean_name)
        .bind(input.level)
        .bind(&input.color)
        .bind(&input.created_by)
        .bind(now_millis())
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(id = row.id, name = %row.name, level = row.level, "Created priority");
        Ok(row.into_priority())
    }

    /// Rename a priority; `level` and `color` change only when provided.
    pub async fn update_priority(
        &self,
        id: i64,
        input: &PriorityUpdate,
    ) -> StorageResult<Option<Priority>> {
        let clean_name = Self::sanitize_name(&input.name, "Priority")?;

        let row = sqlx::query_as::<_, PriorityRow>(
            r#"
            UPDATE priorities SET
                name = ?,
                level = COALESCE(?, level),
                color = COALESCE(?, color)
            WHERE id = ?
            RETURNING id, name, level, color, created_by, created_at
        "#,
        )
        .bind(&clean_name)
        .bind(input.level)
        .bind(&input.color)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(PriorityRow::into_priority))
    }

    /// Hard-delete a priority; referencing articles keep a NULL priority.
    pub async fn delete_priority(&self, id: i64) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM priorities WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn priority_in_use(&self, id: i64) -> StorageResult<bool> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles WHERE priority_id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, DatabaseError, NewArticle, NewPriority, PriorityUpdate};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn priority(name: &str, level: i64) -> NewPriority {
        NewPriority {
            name: name.to_string(),
            level,
            color: Some("#000000".to_string()),
            created_by: None,
        }
    }

    #[tokio::test]
    async fn test_list_priorities_by_level_desc() {
        let db = test_db().await;
        db.create_priority(&priority("Low", 1)).await.unwrap();
        db.create_priority(&priority("Urgent", 4)).await.unwrap();
        db.create_priority(&priority("Medium", 2)).await.unwrap();

        let levels: Vec<i64> = db
            .list_priorities()
            .await
            .unwrap()
            .iter()
            .map(|p| p.level)
            .collect();
        assert_eq!(levels, vec![4, 2, 1]);
    }

    #[tokio::test]
    async fn test_update_priority_partial() {
        let db = test_db().await;
        let p = db.create_priority(&priority("High", 3)).await.unwrap();

        let renamed = db
            .update_priority(
                p.id,
                &PriorityUpdate {
                    name: "Higher".to_string(),
                    level: None,
                    color: None,
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(renamed.name, "Higher");
        assert_eq!(renamed.level, 3);
        assert_eq!(renamed.color.as_deref(), Some("#000000"));

        let releveled = db
            .update_priority(
                p.id,
                &PriorityUpdate {
                    name: "Higher".to_string(),
                    level: Some(5),
                    color: Some("#DC3545".to_string()),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(releveled.level, 5);
        assert_eq!(releveled.color.as_deref(), Some("#DC3545"));
    }

    #[tokio::test]
    async fn test_update_missing_priority() {
        let db = test_db().await;
        let update = PriorityUpdate {
            name: "Ghost".to_string(),
            ..Default::default()
        };
        assert!(db.update_priority(77, &update).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_priority_is_conflict() {
        let db = test_db().await;
        db.create_priority(&priority("Low", 1)).await.unwrap();
        let result = db.create_priority(&priority("Low", 2)).await;
        assert!(matches!(result, Err(DatabaseError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_delete_priority_in_use() {
        let db = test_db().await;
        let p = db.create_priority(&priority("Urgent", 4)).await.unwrap();
        let article = db
            .create_article(&NewArticle {
                title: "Outage runbook".to_string(),
                priority_id: Some(p.id),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(db.priority_in_use(p.id).await.unwrap());
        assert!(db.delete_priority(p.id).await.unwrap());

        let article = db.get_article(article.id).await.unwrap().unwrap();
        assert_eq!(article.priority_id, None);
        assert_eq!(article.priority_level, None);
    }
}
