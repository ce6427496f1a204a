//! Content search: pattern compilation, per-file line scanning and the
//! parallel aggregation that ties them to the walker.
//!
//! ```rust,no_run
//! use rgsearch::{search_structured, SearchConfig, SortMode};
//!
//! let config = SearchConfig::new(["TODO", "FIXME"], ["src"])
//!     .globs(["*.rs"])
//!     .sort(SortMode::path())
//!     .max_total(100);
//! let report = search_structured(&config)?;
//! for m in &report.matches {
//!     println!("{}", m.to_grep_line(true));
//! }
//! # Ok::<(), rgsearch::SearchError>(())
//! ```
pub mod engine;
pub mod matcher;
pub mod scanner;

pub use engine::{search, search_structured};
pub use matcher::{MatchOptions, PatternMatcher};
pub use scanner::{LineScanner, ScanOptions, ScanOutcome};
