//! Knowledge-base storage backend.
//!
//! Articles organized by category, department and priority, with tags,
//! attachments, per-user favorites and recently-viewed history, substring
//! search with snippets, and usage statistics. Everything lives in one
//! SQLite database behind [`storage::Database`].

pub mod config;
pub mod storage;
pub mod util;
