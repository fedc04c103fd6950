use chrono::{DateTime, Duration, Utc};

use super::schema::Database;
use super::types::{RecentlyViewedEntry, StorageResult, UserArticleRow};

/// Per-user cap on recently viewed entries.
pub const RECENTLY_VIEWED_LIMIT: i64 = 20;

/// Entries older than this are expired regardless of rank.
pub const RETENTION_DAYS: i64 = 3;

fn expiry_cutoff(now: DateTime<Utc>) -> i64 {
    (now - Duration::days(RETENTION_DAYS)).timestamp_millis()
}

impl Database {
    // ========================================================================
    // Recently Viewed Operations
    // ========================================================================

    /// Record that `user_id` opened `article_id` now.
    pub async fn record_view(&self, user_id: i64, article_id: i64) -> StorageResult<()> {
        self.record_view_at(user_id, article_id, Utc::now()).await
    }

    /// Record a view at an explicit time, then prune the user's history.
    ///
    /// Re-viewing moves the existing entry instead of adding a second one.
    /// After the write the user's history is cut to the newest
    /// [`RECENTLY_VIEWED_LIMIT`] entries, then entries older than
    /// [`RETENTION_DAYS`] before `at` are removed. Write and both prunes
    /// commit together.
    pub async fn record_view_at(
        &self,
        user_id: i64,
        article_id: i64,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let viewed_at = at.timestamp_millis();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE recently_viewed SET viewed_at = ? WHERE user_id = ? AND article_id = ?",
        )
        .bind(viewed_at)
        .bind(user_id)
        .bind(article_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                "INSERT INTO recently_viewed (user_id, article_id, viewed_at) VALUES (?, ?, ?)",
            )
            .bind(user_id)
            .bind(article_id)
            .bind(viewed_at)
            .execute(&mut *tx)
            .await?;
        }

        let over_cap = sqlx::query(
            r#"
            DELETE FROM recently_viewed
            WHERE user_id = ?1
              AND id NOT IN (
                  SELECT id FROM recently_viewed
                  WHERE user_id = ?1
                  ORDER BY viewed_at DESC, id DESC
                  LIMIT ?2
              )
        "#,
        )
        .bind(user_id)
        .bind(RECENTLY_VIEWED_LIMIT)
        .execute(&mut *tx)
        .await?;

        let expired = sqlx::query("DELETE FROM recently_viewed WHERE user_id = ? AND viewed_at < ?")
            .bind(user_id)
            .bind(expiry_cutoff(at))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::debug!(
            user_id,
            article_id,
            pruned_over_cap = over_cap.rows_affected(),
            pruned_expired = expired.rows_affected(),
            "Recorded view"
        );
        Ok(())
    }

    /// Unexpired history for a user, most recent first, at most `limit` entries.
    ///
    /// Entries whose article was deleted are not returned.
    pub async fn list_recently_viewed(
        &self,
        user_id: i64,
        limit: i64,
    ) -> StorageResult<Vec<RecentlyViewedEntry>> {
        let rows = sqlx::query_as::<_, UserArticleRow>(
            r#"
            SELECT rv.article_id, rv.viewed_at AS at,
                   a.title, a.summary,
                   c.name AS category, d.name AS department
            FROM recently_viewed rv
            JOIN articles a ON a.id = rv.article_id
            LEFT JOIN categories c ON c.id = a.category_id
            LEFT JOIN departments d ON d.id = a.department_id
            WHERE rv.user_id = ? AND rv.viewed_at >= ?
            ORDER BY rv.viewed_at DESC, rv.id DESC
            LIMIT ?
        "#,
        )
        .bind(user_id)
        .bind(expiry_cutoff(Utc::now()))
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(UserArticleRow::into_recently_viewed)
            .collect())
    }

    /// Drop the user's whole history. Returns the number of removed entries.
    pub async fn clear_recently_viewed(&self, user_id: i64) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM recently_viewed WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Global sweep: delete expired entries for every user.
    pub async fn cleanup_expired_views(&self) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM recently_viewed WHERE viewed_at < ?")
            .bind(expiry_cutoff(Utc::now()))
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected();
        tracing::info!(deleted, "Expired recently viewed entries swept");
        Ok(deleted)
    }
}
