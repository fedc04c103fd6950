use std::collections::HashMap;

use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::schema::Database;
use super::tags::find_or_create_tag;
use super::types::{
    from_millis, now_millis, Article, ArticleDbRow, ArticleFilter, ArticleStats, ArticleUpdate,
    Attachment, AttachmentRow, DatabaseError, NamedCount, NewArticle, RecentArticle,
    StorageResult, Tag, TagRow,
};

/// Article columns with taxonomy names resolved by explicit LEFT JOINs.
/// Callers append their own WHERE / ORDER BY.
pub(crate) const ARTICLE_SELECT: &str = r#"
    SELECT a.id, a.title, a.summary, a.content,
           a.category_id, a.department_id, a.priority_id,
           a.author, a.author_id, a.views, a.created_at, a.updated_at,
           c.name AS category_name,
           d.name AS department_name,
           p.name AS priority_name,
           p.color AS priority_color,
           p.level AS priority_level
    FROM articles a
    LEFT JOIN categories c ON c.id = a.category_id
    LEFT JOIN departments d ON d.id = a.department_id
    LEFT JOIN priorities p ON p.id = a.priority_id
"#;

/// Number of entries in `ArticleStats::recent_articles`
const RECENT_ARTICLES_LIMIT: i64 = 5;

fn require_title(title: &str) -> StorageResult<&str> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(DatabaseError::Validation(
            "Article title cannot be empty".to_string(),
        ));
    }
    Ok(trimmed)
}

// ============================================================================
// Unit-of-work helpers
// ============================================================================
//
// These take a connection so they run inside the caller's transaction.

/// Replace the article's tag set with `names`.
///
/// Deletes every existing association, then find-or-creates each tag by name
/// and links it. Duplicate names collapse to one association; blank names
/// are skipped.
pub(crate) async fn replace_article_tags(
    conn: &mut SqliteConnection,
    article_id: i64,
    names: &[String],
    created_by: Option<&str>,
) -> StorageResult<()> {
    sqlx::query("DELETE FROM article_tags WHERE article_id = ?")
        .bind(article_id)
        .execute(&mut *conn)
        .await?;

    for name in names {
        let Ok(clean) = Database::sanitize_name(name, "Tag") else {
            tracing::debug!(article_id, "Skipping blank tag name");
            continue;
        };
        let tag_id = find_or_create_tag(&mut *conn, &clean, created_by).await?;

        sqlx::query("INSERT OR IGNORE INTO article_tags (article_id, tag_id) VALUES (?, ?)")
            .bind(article_id)
            .bind(tag_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

/// Make the article's attachment set exactly `attachment_ids`.
///
/// Attachments currently linked to the article are unlinked (not deleted),
/// then the requested ids are re-parented onto it, stealing them from any
/// other article. Unknown ids are ignored.
pub(crate) async fn reassign_attachments(
    conn: &mut SqliteConnection,
    article_id: i64,
    attachment_ids: &[i64],
) -> StorageResult<()> {
    sqlx::query("UPDATE attachments SET article_id = NULL WHERE article_id = ?")
        .bind(article_id)
        .execute(&mut *conn)
        .await?;

    for attachment_id in attachment_ids {
        sqlx::query("UPDATE attachments SET article_id = ? WHERE id = ?")
            .bind(article_id)
            .bind(attachment_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

pub(crate) async fn article_exists(
    conn: &mut SqliteConnection,
    article_id: i64,
) -> StorageResult<bool> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM articles WHERE id = ?")
        .bind(article_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

/// Ids per IN-list query, well under SQLite's bound-variable limit.
pub(crate) const HYDRATE_CHUNK: usize = 500;

/// Resolve tags and attachments for a batch of article rows.
///
/// Two IN-list queries per chunk of `HYDRATE_CHUNK` ids instead of two per article.
pub(crate) async fn hydrate_articles(
    conn: &mut SqliteConnection,
    rows: Vec<ArticleDbRow>,
) -> StorageResult<Vec<Article>> {
    let mut tags_by_article: HashMap<i64, Vec<Tag>> = HashMap::new();
    let mut attachments_by_article: HashMap<i64, Vec<Attachment>> = HashMap::new();

    let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
    for chunk in ids.chunks(HYDRATE_CHUNK) {
        let mut tag_query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT atg.article_id, t.id, t.name, t.created_by, t.created_at \
             FROM article_tags atg JOIN tags t ON t.id = atg.tag_id \
             WHERE atg.article_id IN (",
        );
        let mut separated = tag_query.separated(", ");
        for id in chunk {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY t.name");

        let tag_rows: Vec<(i64, i64, String, Option<String>, i64)> =
            tag_query.build_query_as().fetch_all(&mut *conn).await?;

        for (article_id, id, name, created_by, created_at) in tag_rows {
            let tag = TagRow {
                id,
                name,
                created_by,
                created_at,
            }
            .into_tag();
            tags_by_article.entry(article_id).or_default().push(tag);
        }

        let mut attachment_query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, article_id, file_name, mime_type, size, url, created_at \
             FROM attachments WHERE article_id IN (",
        );
        let mut separated = attachment_query.separated(", ");
        for id in chunk {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY created_at DESC, id DESC");

        let attachment_rows: Vec<AttachmentRow> = attachment_query
            .build_query_as()
            .fetch_all(&mut *conn)
            .await?;

        for row in attachment_rows {
            if let Some(article_id) = row.article_id {
                attachments_by_article
                    .entry(article_id)
                    .or_default()
                    .push(row.into_attachment());
            }
        }
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let tags = tags_by_article.remove(&row.id).unwrap_or_default();
            let attachments = attachments_by_article.remove(&row.id).unwrap_or_default();
            row.into_article(tags, attachments)
        })
        .collect())
}

impl Database {
    // ========================================================================
    // Article Queries
    // ========================================================================

    /// List articles matching every provided filter, most recently updated first.
    pub async fn list_articles(&self, filter: &ArticleFilter) -> StorageResult<Vec<Article>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(ARTICLE_SELECT);
        query.push(" WHERE 1 = 1");
        if let Some(category_id) = filter.category_id {
            query.push(" AND a.category_id = ").push_bind(category_id);
        }
        if let Some(department_id) = filter.department_id {
            query.push(" AND a.department_id = ").push_bind(department_id);
        }
        if let Some(priority_id) = filter.priority_id {
            query.push(" AND a.priority_id = ").push_bind(priority_id);
        }
        query.push(" ORDER BY a.updated_at DESC, a.id DESC");

        let mut conn = self.pool.acquire().await?;
        let rows: Vec<ArticleDbRow> = query.build_query_as().fetch_all(&mut *conn).await?;
        tracing::debug!(count = rows.len(), ?filter, "list_articles");

        hydrate_articles(&mut conn, rows).await
    }

    /// Get a single article with taxonomy names, tags and attachments.
    pub async fn get_article(&self, article_id: i64) -> StorageResult<Option<Article>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query_as::<_, ArticleDbRow>(&format!("{ARTICLE_SELECT} WHERE a.id = ?"))
            .bind(article_id)
            .fetch_optional(&mut *conn)
            .await?;

        match row {
            Some(row) => Ok(hydrate_articles(&mut conn, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    // ========================================================================
    // Article Mutations
    // ========================================================================

    /// Create an article together with its tags and attachment links.
    ///
    /// The insert, tag upserts and attachment re-parenting commit as one
    /// transaction; any failure rolls all of them back.
    pub async fn create_article(&self, input: &NewArticle) -> StorageResult<Article> {
        let title = require_title(&input.title)?;
        let now = now_millis();

        let mut tx = self.pool.begin().await?;

        let (article_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO articles
                (title, summary, content, category_id, department_id, priority_id,
                 author, author_id, views, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            RETURNING id
        "#,
        )
        .bind(title)
        .bind(&input.summary)
        .bind(&input.content)
        .bind(input.category_id)
        .bind(input.department_id)
        .bind(input.priority_id)
        .bind(&input.author)
        .bind(&input.author_id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        if !input.tags.is_empty() {
            replace_article_tags(&mut tx, article_id, &input.tags, input.author_id.as_deref())
                .await?;
        }
        if !input.attachment_ids.is_empty() {
            reassign_attachments(&mut tx, article_id, &input.attachment_ids).await?;
        }

        tx.commit().await?;
        tracing::debug!(
            article_id,
            tags = input.tags.len(),
            attachments = input.attachment_ids.len(),
            "Created article"
        );

        self.get_article(article_id)
            .await?
            .ok_or(DatabaseError::NotFound {
                entity: "article",
                id: article_id,
            })
    }

    /// Replace every field of an article and bump `updated_at`.
    ///
    /// Returns `Ok(None)` when the article does not exist. See
    /// [`ArticleUpdate`] for how `tags` and `attachment_ids` are applied.
    pub async fn update_article(
        &self,
        article_id: i64,
        input: &ArticleUpdate,
    ) -> StorageResult<Option<Article>> {
        let title = require_title(&input.title)?;

        let mut tx = self.pool.begin().await?;

        // updated_at strictly increases even for updates within the same millisecond
        let result = sqlx::query(
            r#"
            UPDATE articles SET
                title = ?, summary = ?, content = ?,
                category_id = ?, department_id = ?, priority_id = ?,
                author = ?, author_id = ?,
                updated_at = MAX(?, updated_at + 1)
            WHERE id = ?
        "#,
        )
        .bind(title)
        .bind(&input.summary)
        .bind(&input.content)
        .bind(input.category_id)
        .bind(input.department_id)
        .bind(input.priority_id)
        .bind(&input.author)
        .bind(&input.author_id)
        .bind(now_millis())
        .bind(article_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        if let Some(tags) = &input.tags {
            replace_article_tags(&mut tx, article_id, tags, input.author_id.as_deref()).await?;
        }
        if let Some(attachment_ids) = &input.attachment_ids {
            reassign_attachments(&mut tx, article_id, attachment_ids).await?;
        }

        tx.commit().await?;
        tracing::debug!(article_id, "Updated article");

        self.get_article(article_id).await
    }

    /// Delete an article. Deleting a missing id is not an error.
    ///
    /// Tag links, favorites and view history cascade; attachments stay with
    /// a NULL article reference. Returns whether a row was removed.
    pub async fn delete_article(&self, article_id: i64) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM articles WHERE id = ?")
            .bind(article_id)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        tracing::debug!(article_id, deleted, "delete_article");
        Ok(deleted)
    }

    /// Atomically add one to the view counter. Missing articles are ignored.
    pub async fn increment_views(&self, article_id: i64) -> StorageResult<()> {
        sqlx::query("UPDATE articles SET views = views + 1 WHERE id = ?")
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Aggregate counts across all articles.
    ///
    /// Categories and departments without articles are reported with a zero
    /// count.
    pub async fn stats(&self) -> StorageResult<ArticleStats> {
        let mut conn = self.pool.acquire().await?;

        let (total_articles, total_views): (i64, i64) =
            sqlx::query_as("SELECT COUNT(*), COALESCE(SUM(views), 0) FROM articles")
                .fetch_one(&mut *conn)
                .await?;

        let by_category: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT c.name, COUNT(a.id)
            FROM categories c
            LEFT JOIN articles a ON a.category_id = c.id
            GROUP BY c.id, c.name
            ORDER BY c.name
        "#,
        )
        .fetch_all(&mut *conn)
        .await?;

        let by_department: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT d.name, COUNT(a.id)
            FROM departments d
            LEFT JOIN articles a ON a.department_id = d.id
            GROUP BY d.id, d.name
            ORDER BY d.name
        "#,
        )
        .fetch_all(&mut *conn)
        .await?;

        let recent: Vec<(i64, String, i64)> = sqlx::query_as(
            "SELECT id, title, updated_at FROM articles ORDER BY updated_at DESC, id DESC LIMIT ?",
        )
        .bind(RECENT_ARTICLES_LIMIT)
        .fetch_all(&mut *conn)
        .await?;

        let to_counts = |rows: Vec<(String, i64)>| {
            rows.into_iter()
                .map(|(name, count)| NamedCount { name, count })
                .collect()
        };

        Ok(ArticleStats {
            total_articles,
            total_views,
            by_category: to_counts(by_category),
            by_department: to_counts(by_department),
            recent_articles: recent
                .into_iter()
                .map(|(id, title, updated_at)| RecentArticle {
                    id,
                    title,
                    updated_at: from_millis(updated_at),
                })
                .collect(),
        })
    }
}
