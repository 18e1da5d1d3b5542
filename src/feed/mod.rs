//! Feed ingestion: proxied fetching, XML parsing and item normalisation.
//!
//! - [`fetcher`] - HTTP retrieval through a primary intermediary with one fallback
//! - [`parser`] - well-formedness check and item extraction with `quick-xml`
//! - [`normalizer`] - one `<item>`/`<entry>` to one [`Article`]
//!
//! # Example
//!
//! ```ignore
//! use scruper::feed::ProxyFetcher;
//!
//! let fetcher = ProxyFetcher::from_config(&config)?;
//! let articles = fetcher.fetch_articles(&source, clock.now()).await?;
//! ```

mod article;
mod fetcher;
mod item;
mod normalizer;
mod parser;

pub use article::{article_id, Article};
pub use fetcher::{
    build_http_client, Envelope, FetchError, ProxyConfig, ProxyError, ProxyFetcher, SourceError,
};
pub use item::{Element, Node};
pub use normalizer::{normalize_item, parse_date};
pub use parser::{parse_feed, ParseError};
