//! Utility functions shared by the ingestion pipeline.
//!
//! - **Text processing**: HTML to plain text, word-boundary truncation,
//!   control-character stripping
//! - **URL validation**: registry URL checks and image URL filtering
//!
//! # Examples
//!
//! ```
//! use scruper::util::{summarize, validate_url};
//!
//! let url = validate_url("https://example.com/feed.xml").unwrap();
//! assert_eq!(url.host_str(), Some("example.com"));
//!
//! assert_eq!(summarize("<p>Hello <b>world</b></p>"), "Hello world");
//! ```

mod text;
mod url_validator;

pub use text::{
    first_img_src, strip_control_chars, strip_html, summarize, truncate_summary,
    SUMMARY_MAX_CHARS,
};
pub use url_validator::{is_acceptable_image_url, validate_url, UrlValidationError};
