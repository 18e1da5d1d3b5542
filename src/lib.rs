//! Scruper: the ingestion core of a client-side RSS aggregator.
//!
//! Feeds from a fixed [`registry`] are fetched through a CORS-style proxy
//! with one fallback ([`feed::ProxyFetcher`]), parsed and normalised into
//! [`feed::Article`]s, merged into a persisted cache ([`articles::merge`]) and
//! filtered per tab ([`articles::filter`]). [`Aggregator`] ties these
//! together over any [`storage::KeyValueStore`]; [`scheduler`] re-runs the
//! cycle periodically.
//!
//! Rendering is left to the embedding application, which reads
//! [`Aggregator::visible_articles`], [`Aggregator::statuses`] and
//! [`Aggregator::last_fetch`], and issues `set_active_tab`, `toggle_saved`
//! and `force_refresh`.

pub mod aggregator;
pub mod articles;
pub mod clock;
pub mod config;
pub mod feed;
pub mod logging;
pub mod registry;
pub mod scheduler;
pub mod storage;
pub mod util;

pub use aggregator::{Aggregator, CycleOutcome, CycleReport, FetchStatus};
pub use articles::{Tab, TabCounts};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigError, SetupError};
pub use feed::{Article, FetchError, ParseError, ProxyError, SourceError};
pub use logging::init_logging;
pub use registry::{FeedSource, Registry};
pub use scheduler::{spawn_refresh_loop, RefreshHandle};
pub use storage::{KeyValueStore, MemoryStore, SqliteStore, StorageError};
