//! SQLite persistence for the knowledge base.
//!
//! Every repository operation is an `async fn` on [`Database`], grouped by
//! entity in the submodules. Multi-statement writes run in a single
//! transaction.

mod articles;
mod attachments;
mod categories;
mod departments;
mod favorites;
mod priorities;
mod recently_viewed;
mod schema;
mod search;
mod seed;
mod tags;
mod types;
mod users;

pub use recently_viewed::{RECENTLY_VIEWED_LIMIT, RETENTION_DAYS};
pub use schema::Database;
pub use search::{extract_snippet, match_snippet, SNIPPET_WINDOW};
pub use seed::{hash_password, verify_password};
pub use types::{
    Article, ArticleFilter, ArticleStats, ArticleUpdate, Attachment, Category, DatabaseError,
    Department, FavoriteEntry, MatchField, NamedCount, NewArticle, NewAttachment, NewPriority,
    Priority, PriorityUpdate, RecentArticle, RecentlyViewedEntry, SearchResult, SeedReport,
    StorageResult, Tag, User, UserRole,
};
