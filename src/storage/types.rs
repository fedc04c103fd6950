use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Storage errors with caller-facing messages.
///
/// The HTTP boundary maps these to status codes; the storage layer never
/// retries on its own.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The targeted row does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Unique constraint violation (duplicate name or email)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Operation is never allowed (e.g. deleting the root user)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Input rejected before reaching SQL
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Another process holds the database lock
    #[error("The database is locked by another process. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Password hashing failed while seeding the root account
    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[source] sqlx::Error),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return DatabaseError::Conflict(db_err.message().to_string());
            }
        }
        DatabaseError::Other(err)
    }
}

impl DatabaseError {
    /// Classify a connection-time sqlx error, detecting lock contention.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::from(err)
    }
}

pub type StorageResult<T> = Result<T, DatabaseError>;

// ============================================================================
// Timestamps
// ============================================================================

/// Current time as Unix epoch milliseconds (the on-disk timestamp format).
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

// ============================================================================
// Row Types
// ============================================================================

/// Article row with its taxonomy columns resolved by LEFT JOIN.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ArticleDbRow {
    pub id: i64,
    pub title: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub category_id: Option<i64>,
    pub department_id: Option<i64>,
    pub priority_id: Option<i64>,
    pub author: Option<String>,
    pub author_id: Option<String>,
    pub views: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub category_name: Option<String>,
    pub department_name: Option<String>,
    pub priority_name: Option<String>,
    pub priority_color: Option<String>,
    pub priority_level: Option<i64>,
}

impl ArticleDbRow {
    pub(crate) fn into_article(self, tags: Vec<Tag>, attachments: Vec<Attachment>) -> Article {
        Article {
            id: self.id,
            title: self.title,
            summary: self.summary,
            content: self.content,
            category_id: self.category_id,
            department_id: self.department_id,
            priority_id: self.priority_id,
            author: self.author,
            author_id: self.author_id,
            views: self.views,
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
            category_name: self.category_name,
            department_name: self.department_name,
            priority_name: self.priority_name,
            priority_color: self.priority_color,
            priority_level: self.priority_level,
            tags,
            attachments,
        }
    }
}

/// Shared row shape of `categories` and `departments`.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TaxonomyRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Option<String>,
    pub created_at: i64,
}

impl TaxonomyRow {
    pub(crate) fn into_category(self) -> Category {
        Category {
            id: self.id,
            name: self.name,
            description: self.description,
            created_by: self.created_by,
            created_at: from_millis(self.created_at),
        }
    }

    pub(crate) fn into_department(self) -> Department {
        Department {
            id: self.id,
            name: self.name,
            description: self.description,
            created_by: self.created_by,
            created_at: from_millis(self.created_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PriorityRow {
    pub id: i64,
    pub name: String,
    pub level: i64,
    pub color: Option<String>,
    pub created_by: Option<String>,
    pub created_at: i64,
}

impl PriorityRow {
    pub(crate) fn into_priority(self) -> Priority {
        Priority {
            id: self.id,
            name: self.name,
            level: self.level,
            color: self.color,
            created_by: self.created_by,
            created_at: from_millis(self.created_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TagRow {
    pub id: i64,
    pub name: String,
    pub created_by: Option<String>,
    pub created_at: i64,
}

impl TagRow {
    pub(crate) fn into_tag(self) -> Tag {
        Tag {
            id: self.id,
            name: self.name,
            created_by: self.created_by,
            created_at: from_millis(self.created_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct AttachmentRow {
    pub id: i64,
    pub article_id: Option<i64>,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub size: Option<i64>,
    pub url: String,
    pub created_at: i64,
}

impl AttachmentRow {
    pub(crate) fn into_attachment(self) -> Attachment {
        Attachment {
            id: self.id,
            article_id: self.article_id,
            file_name: self.file_name,
            mime_type: self.mime_type,
            size: self.size,
            url: self.url,
            created_at: from_millis(self.created_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub approved: bool,
    pub is_root: bool,
    pub created_at: i64,
    pub last_login_at: Option<i64>,
}

impl UserRow {
    pub(crate) fn into_user(self) -> User {
        User {
            id: self.id,
            email: self.email,
            password_hash: self.password_hash,
            role: UserRole::from_db(&self.role),
            approved: self.approved,
            is_root: self.is_root,
            created_at: from_millis(self.created_at),
            last_login_at: self.last_login_at.map(from_millis),
        }
    }
}

/// Favorite or recently-viewed row joined with its article and taxonomy names.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserArticleRow {
    pub article_id: i64,
    pub at: i64,
    pub title: String,
    pub summary: Option<String>,
    pub category: Option<String>,
    pub department: Option<String>,
}

impl UserArticleRow {
    pub(crate) fn into_favorite(self) -> FavoriteEntry {
        FavoriteEntry {
            article_id: self.article_id,
            created_at: from_millis(self.at),
            title: self.title,
            summary: self.summary,
            category: self.category,
            department: self.department,
        }
    }

    pub(crate) fn into_recently_viewed(self) -> RecentlyViewedEntry {
        RecentlyViewedEntry {
            article_id: self.article_id,
            viewed_at: from_millis(self.at),
            title: self.title,
            summary: self.summary,
            category: self.category,
            department: self.department,
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// Article projection with taxonomy names, tags and attachments resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub category_id: Option<i64>,
    pub department_id: Option<i64>,
    pub priority_id: Option<i64>,
    pub author: Option<String>,
    pub author_id: Option<String>,
    pub views: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub category_name: Option<String>,
    pub department_name: Option<String>,
    pub priority_name: Option<String>,
    pub priority_color: Option<String>,
    pub priority_level: Option<i64>,
    pub tags: Vec<Tag>,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Department {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Priority level. Higher `level` means more urgent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Priority {
    pub id: i64,
    pub name: String,
    pub level: i64,
    pub color: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Attachment metadata. The file bytes live behind `url`, outside the database.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attachment {
    pub id: i64,
    pub article_id: Option<i64>,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub size: Option<i64>,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }

    pub(crate) fn from_db(value: &str) -> Self {
        match value {
            "admin" => UserRole::Admin,
            "user" => UserRole::User,
            other => {
                tracing::warn!(role = %other, "Unknown role in users table, treating as user");
                UserRole::User
            }
        }
    }
}

/// User account. `password_hash` is only ever read by the credential check
/// and is never serialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub approved: bool,
    pub is_root: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// A favorited article as shown in the user's favorites list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FavoriteEntry {
    pub article_id: i64,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub summary: Option<String>,
    pub category: Option<String>,
    pub department: Option<String>,
}

/// A recently viewed article as shown in the user's history list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentlyViewedEntry {
    pub article_id: i64,
    pub viewed_at: DateTime<Utc>,
    pub title: String,
    pub summary: Option<String>,
    pub category: Option<String>,
    pub department: Option<String>,
}

/// Which article field produced a search hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchField {
    Title,
    Summary,
    Content,
    Unknown,
}

/// Search hit: the article plus a preview snippet around the match.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    #[serde(flatten)]
    pub article: Article,
    pub snippet: String,
    pub match_field: MatchField,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedCount {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentArticle {
    pub id: i64,
    pub title: String,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate usage statistics over all articles.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleStats {
    pub total_articles: i64,
    pub total_views: i64,
    pub by_category: Vec<NamedCount>,
    pub by_department: Vec<NamedCount>,
    pub recent_articles: Vec<RecentArticle>,
}

/// Counts of rows inserted by default-data seeding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub categories: u64,
    pub departments: u64,
    pub priorities: u64,
}

// ============================================================================
// Input Types
// ============================================================================

/// Conjunctive article list filter. `None` fields do not restrict.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArticleFilter {
    pub category_id: Option<i64>,
    pub department_id: Option<i64>,
    pub priority_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewArticle {
    pub title: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub category_id: Option<i64>,
    pub department_id: Option<i64>,
    pub priority_id: Option<i64>,
    pub author: Option<String>,
    pub author_id: Option<String>,
    /// Tag names, resolved to existing tags or created
    #[serde(default)]
    pub tags: Vec<String>,
    /// Attachments to re-parent onto the new article
    #[serde(default)]
    pub attachment_ids: Vec<i64>,
}

/// Full replacement of an article's fields.
///
/// `tags` and `attachment_ids`: `None` leaves the associations untouched,
/// `Some(vec![])` clears them, `Some(list)` replaces them exactly.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArticleUpdate {
    pub title: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub category_id: Option<i64>,
    pub department_id: Option<i64>,
    pub priority_id: Option<i64>,
    pub author: Option<String>,
    pub author_id: Option<String>,
    pub tags: Option<Vec<String>>,
    pub attachment_ids: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAttachment {
    pub article_id: Option<i64>,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub size: Option<i64>,
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPriority {
    pub name: String,
    #[serde(default)]
    pub level: i64,
    pub color: Option<String>,
    pub created_by: Option<String>,
}

/// Priority update. `level` and `color` are only written when provided.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PriorityUpdate {
    pub name: String,
    pub level: Option<i64>,
    pub color: Option<String>,
}
