//! Text helpers shared by the storage layer.
//!
//! - **HTML reduction**: strip tags and collapse whitespace before searching rich text
//! - **Case-insensitive search**: char-indexed matching used for search snippets
//! - **Sanitization**: control-character stripping for user-supplied names
//!
//! # Examples
//!
//! ```
//! use kbase::util::{contains_ignore_case, html_to_text};
//!
//! let text = html_to_text("<p>Reset the <b>Router</b></p>");
//! assert!(contains_ignore_case(&text, "router"));
//! ```

mod text;

pub use text::{contains_ignore_case, find_ignore_case, html_to_text, strip_control_chars};
