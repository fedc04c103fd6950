use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::{DatabaseError, StorageResult};

/// Schema statements, applied in order. Every statement is idempotent.
///
/// Foreign keys: taxonomy links and attachment back-links are SET NULL so
/// articles and attachments outlive their parents; join rows and per-user
/// state CASCADE with the article or user they point at.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'user',
        approved INTEGER NOT NULL DEFAULT 0,
        is_root INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        last_login_at INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS categories (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        description TEXT,
        created_by TEXT,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS departments (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        description TEXT,
        created_by TEXT,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS priorities (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        level INTEGER NOT NULL DEFAULT 0,
        color TEXT,
        created_by TEXT,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tags (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        created_by TEXT,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL,
        summary TEXT,
        content TEXT,
        category_id INTEGER REFERENCES categories(id) ON DELETE SET NULL,
        department_id INTEGER REFERENCES departments(id) ON DELETE SET NULL,
        priority_id INTEGER REFERENCES priorities(id) ON DELETE SET NULL,
        author TEXT,
        author_id TEXT,
        views INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS article_tags (
        article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
        tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
        PRIMARY KEY (article_id, tag_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS attachments (
        id INTEGER PRIMARY KEY,
        article_id INTEGER REFERENCES articles(id) ON DELETE SET NULL,
        file_name TEXT NOT NULL,
        mime_type TEXT,
        size INTEGER,
        url TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_favorites (
        id INTEGER PRIMARY KEY,
        user_id INTEGER REFERENCES users(id) ON DELETE CASCADE,
        article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS recently_viewed (
        id INTEGER PRIMARY KEY,
        user_id INTEGER REFERENCES users(id) ON DELETE CASCADE,
        article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
        viewed_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_articles_category ON articles(category_id)",
    "CREATE INDEX IF NOT EXISTS idx_articles_department ON articles(department_id)",
    "CREATE INDEX IF NOT EXISTS idx_articles_priority ON articles(priority_id)",
    "CREATE INDEX IF NOT EXISTS idx_articles_created ON articles(created_at)",
    "CREATE INDEX IF NOT EXISTS idx_articles_updated ON articles(updated_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_articles_title ON articles(title)",
    "CREATE INDEX IF NOT EXISTS idx_article_tags_tag ON article_tags(tag_id)",
    "CREATE INDEX IF NOT EXISTS idx_attachments_article ON attachments(article_id)",
    "CREATE INDEX IF NOT EXISTS idx_user_favorites_user ON user_favorites(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_user_favorites_article ON user_favorites(article_id)",
    "CREATE INDEX IF NOT EXISTS idx_recently_viewed_user ON recently_viewed(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_recently_viewed_viewed_at ON recently_viewed(viewed_at)",
];

// ============================================================================
// Database
// ============================================================================

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// `":memory:"` opens a private in-memory database shared by the pool.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another process holds the
    /// database lock (SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN).
    /// Returns `DatabaseError::Migration` if the schema could not be applied.
    pub async fn open(path: &str) -> StorageResult<Self> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // Create the file with owner-only permissions before SQLite touches it
        #[cfg(unix)]
        if path != ":memory:" {
            use std::os::unix::fs::OpenOptionsExt;
            let db_path = std::path::Path::new(path);
            if !db_path.exists() && db_path.parent().is_some_and(|p| p.exists()) {
                // If creation fails, SQLite reports the error at connect_with.
                let _file = std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(0o600)
                    .open(db_path)
                    .ok();
            }
        }

        // busy_timeout=5000: writers wait up to 5 seconds for a lock before SQLITE_BUSY.
        // Pool-level options so every connection inherits them.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .foreign_keys(true)
            .pragma("busy_timeout", "5000");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        tracing::debug!(path = %path, "Opened database pool");

        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Create any missing tables and indexes.
    ///
    /// Administrative maintenance operation: safe to call at any time, on an
    /// empty or a fully migrated database. Authorization is the caller's job.
    pub async fn ensure_schema(&self) -> StorageResult<()> {
        self.migrate().await.map_err(|e| match DatabaseError::from_sqlx(e) {
            DatabaseError::InstanceLocked => DatabaseError::InstanceLocked,
            other => DatabaseError::Migration(other.to_string()),
        })
    }

    /// Run all schema statements in one transaction.
    ///
    /// SQLite supports DDL inside transactions, so a failure part-way leaves
    /// the previous schema untouched.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        tracing::debug!(statements = SCHEMA.len(), "Schema is up to date");
        Ok(())
    }

    /// Close the pool, waiting for in-flight connections to be returned.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::Database;

    #[tokio::test]
    async fn test_open_creates_all_tables() {
        let db = Database::open(":memory:").await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&db.pool)
        .await
        .unwrap();
        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();

        assert_eq!(
            names,
            vec![
                "article_tags",
                "articles",
                "attachments",
                "categories",
                "departments",
                "priorities",
                "recently_viewed",
                "tags",
                "user_favorites",
                "users",
            ]
        );
    }

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() {
        let db = Database::open(":memory:").await.unwrap();
        db.ensure_schema().await.unwrap();
        db.ensure_schema().await.unwrap();
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let db = Database::open(":memory:").await.unwrap();
        let row: (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(row.0, 1);
    }

    #[tokio::test]
    async fn test_open_file_backed_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kbase.db");
        let path_str = path.to_str().unwrap();

        let db = Database::open(path_str).await.unwrap();
        db.close().await;
        assert!(path.exists());

        // Reopening an existing database re-runs the idempotent migration
        let db = Database::open(path_str).await.unwrap();
        db.ensure_schema().await.unwrap();
    }
}
