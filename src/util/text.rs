use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("HTML tag pattern is valid"));
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Reduce rich-text (HTML) content to plain searchable text.
///
/// Every tag is replaced by a single space, then runs of whitespace collapse
/// to one space. Entities are left as-is.
///
/// # Examples
///
/// ```
/// use kbase::util::html_to_text;
///
/// assert_eq!(html_to_text("<p>Hello</p>\n<b>world</b>"), " Hello world ");
/// ```
pub fn html_to_text(html: &str) -> String {
    let without_tags = HTML_TAG.replace_all(html, " ");
    WHITESPACE_RUN.replace_all(&without_tags, " ").into_owned()
}

fn chars_eq_ignore_case(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

/// Find the first case-insensitive occurrence of `needle` in `haystack`.
///
/// Comparison is per character, so the returned index is a **char** index
/// into `haystack` and lines up with the original text even when lowercasing
/// would change byte lengths.
pub fn find_ignore_case(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).find(|&start| {
        haystack[start..start + needle.len()]
            .iter()
            .zip(needle)
            .all(|(&h, &n)| chars_eq_ignore_case(h, n))
    })
}

/// Case-insensitive substring test with the same folding as [`find_ignore_case`].
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    let haystack: Vec<char> = haystack.chars().collect();
    let needle: Vec<char> = needle.chars().collect();
    find_ignore_case(&haystack, &needle).is_some()
}

fn is_stripped_control(c: char) -> bool {
    c.is_control() && !matches!(c, '\t' | '\n' | '\r')
}

/// Strip control characters (C0, DEL, C1) except tab, newline and carriage return.
///
/// Returns `Cow::Borrowed` when the input is already clean (the common case).
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped_control) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(|&c| !is_stripped_control(c)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn test_html_to_text_replaces_tags_with_space() {
        assert_eq!(html_to_text("a<br>b"), "a b");
        assert_eq!(html_to_text("<div class=\"x\">text</div>"), " text ");
    }

    #[test]
    fn test_html_to_text_collapses_whitespace() {
        assert_eq!(html_to_text("one\n\n  two\t\tthree"), "one two three");
    }

    #[test]
    fn test_html_to_text_plain_text_unchanged() {
        assert_eq!(html_to_text("plain words"), "plain words");
    }

    #[test]
    fn test_html_to_text_unclosed_angle_kept() {
        // No closing '>' means no tag
        assert_eq!(html_to_text("a < b"), "a < b");
    }

    #[test]
    fn test_find_ignore_case_basic() {
        assert_eq!(find_ignore_case(&chars("Hello World"), &chars("world")), Some(6));
        assert_eq!(find_ignore_case(&chars("Hello World"), &chars("HELLO")), Some(0));
        assert_eq!(find_ignore_case(&chars("Hello"), &chars("xyz")), None);
    }

    #[test]
    fn test_find_ignore_case_first_occurrence() {
        assert_eq!(find_ignore_case(&chars("abcABCabc"), &chars("ABC")), Some(0));
        assert_eq!(find_ignore_case(&chars("xxabcABC"), &chars("Abc")), Some(2));
    }

    #[test]
    fn test_find_ignore_case_char_indices_for_multibyte() {
        // Hebrew letters are 2 bytes each in UTF-8; index must be in chars
        assert_eq!(find_ignore_case(&chars("שלום עולם"), &chars("עולם")), Some(5));
        assert_eq!(find_ignore_case(&chars("ÄÖÜ test"), &chars("TEST")), Some(4));
        assert_eq!(find_ignore_case(&chars("straße"), &chars("STRASSE")), None);
        assert_eq!(find_ignore_case(&chars("ПРИВЕТ мир"), &chars("привет")), Some(0));
    }

    #[test]
    fn test_find_ignore_case_needle_longer_than_haystack() {
        assert_eq!(find_ignore_case(&chars("ab"), &chars("abc")), None);
    }

    #[test]
    fn test_find_ignore_case_empty_needle() {
        assert_eq!(find_ignore_case(&chars("abc"), &[]), Some(0));
    }

    #[test]
    fn test_contains_ignore_case() {
        assert!(contains_ignore_case("Knowledge Base", "BASE"));
        assert!(!contains_ignore_case("Knowledge Base", "bases"));
    }

    #[test]
    fn test_strip_clean_text_returns_borrowed() {
        let result = strip_control_chars("Clean name");
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(result, "Clean name");
    }

    #[test]
    fn test_strip_control_chars_removes_controls() {
        assert_eq!(strip_control_chars("a\x00b\x07c\x7fd"), "abcd");
        assert_eq!(strip_control_chars("\x1b[31mRed\x1b[0m"), "[31mRed[0m");
    }

    #[test]
    fn test_strip_preserves_tabs_newlines_cr() {
        let result = strip_control_chars("a\tb\nc\rd");
        assert!(matches!(result, Cow::Borrowed(_)));
    }

    #[test]
    fn test_strip_unicode_preserved() {
        assert_eq!(strip_control_chars("נהלים\u{0085}"), "נהלים");
    }
}
