use super::articles::{hydrate_articles, ARTICLE_SELECT};
use super::schema::Database;
use super::types::{Article, ArticleDbRow, DatabaseError, MatchField, SearchResult, StorageResult};
use crate::util::{contains_ignore_case, find_ignore_case, html_to_text};

// ============================================================================
// Query Validation
// ============================================================================

/// Longest accepted search term, in characters
const MAX_QUERY_LENGTH: usize = 256;

/// Characters of context kept on each side of the first match
pub const SNIPPET_WINDOW: usize = 150;

/// Snippet length when the term is not found in the chosen text
const FALLBACK_SNIPPET_CHARS: usize = 300;

const ELLIPSIS: &str = "...";

fn validate_query(query: &str) -> StorageResult<()> {
    if query.is_empty() {
        return Err(DatabaseError::Validation(
            "Search query cannot be empty".to_string(),
        ));
    }
    if query.chars().count() > MAX_QUERY_LENGTH {
        return Err(DatabaseError::Validation(format!(
            "Search query exceeds maximum length of {MAX_QUERY_LENGTH} characters"
        )));
    }
    Ok(())
}

/// True when `term` occurs case-insensitively in the title, summary or raw content.
fn row_matches(row: &ArticleDbRow, term: &str) -> bool {
    contains_ignore_case(&row.title, term)
        || row
            .summary
            .as_deref()
            .is_some_and(|summary| contains_ignore_case(summary, term))
        || row
            .content
            .as_deref()
            .is_some_and(|content| contains_ignore_case(content, term))
}

// ============================================================================
// Snippets
// ============================================================================

/// Extract a preview of `text` around the first case-insensitive match of `term`.
///
/// Keeps `window` characters on each side of the match and marks cut ends
/// with `...`. When `term` does not occur, the first 300 characters are
/// returned unmarked.
///
/// # Examples
///
/// ```
/// use kbase::storage::extract_snippet;
///
/// assert_eq!(extract_snippet("alpha beta gamma", "BETA", 2), "...a beta g...");
/// ```
pub fn extract_snippet(text: &str, term: &str, window: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let needle: Vec<char> = term.chars().collect();

    let Some(index) = find_ignore_case(&chars, &needle) else {
        return chars.iter().take(FALLBACK_SNIPPET_CHARS).collect();
    };

    let start = index.saturating_sub(window);
    let end = chars.len().min(index + needle.len() + window);

    let mut snippet = String::new();
    if start > 0 {
        snippet.push_str(ELLIPSIS);
    }
    snippet.extend(&chars[start..end]);
    if end < chars.len() {
        snippet.push_str(ELLIPSIS);
    }
    snippet
}

/// Decide which field of `article` matched `term` and build its snippet.
///
/// Fields are tried in order title, summary, content. Title hits show the
/// whole title; content is searched as plain text with markup removed.
pub fn match_snippet(article: &Article, term: &str) -> (String, MatchField) {
    if contains_ignore_case(&article.title, term) {
        return (article.title.clone(), MatchField::Title);
    }

    if let Some(summary) = article.summary.as_deref() {
        if contains_ignore_case(summary, term) {
            return (extract_snippet(summary, term, SNIPPET_WINDOW), MatchField::Summary);
        }
    }

    if let Some(content) = article.content.as_deref() {
        let plain = html_to_text(content);
        if contains_ignore_case(&plain, term) {
            return (extract_snippet(&plain, term, SNIPPET_WINDOW), MatchField::Content);
        }
    }

    // The raw content matched but not after markup removal (e.g. a tag name)
    (
        article.summary.clone().unwrap_or_default(),
        MatchField::Unknown,
    )
}

impl Database {
    // ========================================================================
    // Search Operations
    // ========================================================================

    /// Substring search over title, summary and raw content.
    ///
    /// Case folds per Unicode character, which SQLite `LIKE` cannot do, so
    /// rows are filtered here. The term is used verbatim; an empty term is a
    /// `Validation` error. Results are most recently updated first, each with
    /// a snippet and the field that matched.
    pub async fn search_articles(&self, query: &str) -> StorageResult<Vec<SearchResult>> {
        validate_query(query)?;

        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, ArticleDbRow>(&format!(
            "{ARTICLE_SELECT} ORDER BY a.updated_at DESC, a.id DESC"
        ))
        .fetch_all(&mut *conn)
        .await?;

        let scanned = rows.len();
        let rows: Vec<ArticleDbRow> = rows
            .into_iter()
            .filter(|row| row_matches(row, query))
            .collect();

        let articles = hydrate_articles(&mut conn, rows).await?;
        tracing::debug!(query = %query, scanned, results = articles.len(), "search_articles");

        Ok(articles
            .into_iter()
            .map(|article| {
                let (snippet, match_field) = match_snippet(&article, query);
                SearchResult {
                    article,
                    snippet,
                    match_field,
                }
            })
            .collect())
    }
}
