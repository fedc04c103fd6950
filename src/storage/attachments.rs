use super::articles::{article_exists, reassign_attachments};
use super::schema::Database;
use super::types::{
    now_millis, Attachment, AttachmentRow, DatabaseError, NewAttachment, StorageResult,
};

impl Database {
    // ========================================================================
    // Attachment Operations
    // ========================================================================

    /// Store attachment metadata, optionally already linked to an article.
    pub async fn create_attachment(&self, input: &NewAttachment) -> StorageResult<Attachment> {
        if input.file_name.trim().is_empty() {
            return Err(DatabaseError::Validation(
                "Attachment file name cannot be empty".to_string(),
            ));
        }

        let row = sqlx::query_as::<_, AttachmentRow>(
            r#"
            INSERT INTO attachments (article_id, file_name, mime_type, size, url, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, article_id, file_name, mime_type, size, url, created_at
        "#,
        )
        .bind(input.article_id)
        .bind(input.file_name.trim())
        .bind(&input.mime_type)
        .bind(input.size)
        .bind(&input.url)
        .bind(now_millis())
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(id = row.id, article_id = ?row.article_id, "Created attachment");
        Ok(row.into_attachment())
    }

    pub async fn get_attachment(&self, id: i64) -> StorageResult<Option<Attachment>> {
        let row = sqlx::query_as::<_, AttachmentRow>(
            r#"
            SELECT id, article_id, file_name, mime_type, size, url, created_at
            FROM attachments WHERE id = ?
        "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(AttachmentRow::into_attachment))
    }

    /// Attachments linked to an article, newest first.
    pub async fn get_attachments_for_article(
        &self,
        article_id: i64,
    ) -> StorageResult<Vec<Attachment>> {
        let rows = sqlx::query_as::<_, AttachmentRow>(
            r#"
            SELECT id, article_id, file_name, mime_type, size, url, created_at
            FROM attachments
            WHERE article_id = ?
            ORDER BY created_at DESC, id DESC
        "#,
        )
        .bind(article_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AttachmentRow::into_attachment).collect())
    }

    /// Unlink every attachment from an article. The rows are kept.
    pub async fn detach_attachments(&self, article_id: i64) -> StorageResult<u64> {
        let result = sqlx::query("UPDATE attachments SET article_id = NULL WHERE article_id = ?")
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Make `attachment_ids` the article's exact attachment set.
    ///
    /// Attachments owned by other articles move over; each attachment has at
    /// most one owner afterwards.
    pub async fn assign_attachments(
        &self,
        article_id: i64,
        attachment_ids: &[i64],
    ) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        if !article_exists(&mut tx, article_id).await? {
            return Err(DatabaseError::NotFound {
                entity: "article",
                id: article_id,
            });
        }
        reassign_attachments(&mut tx, article_id, attachment_ids).await?;

        tx.commit().await?;
        Ok(())
    }
}
