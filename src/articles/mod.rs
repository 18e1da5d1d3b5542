//! Pure operations over article collections: cache merge and tab filtering.
//!
//! Nothing here performs I/O or reads the clock.

mod filter;
mod merge;

pub use filter::{filter, is_fresh, tab_counts, Tab, TabCounts, FRESHNESS_WINDOW_HOURS};
pub use merge::merge;
