//! Recursive, pattern-based file content and file listing search.
//!
//! Roots are walked in parallel with gitignore-style filtering, every file
//! is matched line by line against a set of ORed patterns, and results come
//! back as plain value records that can optionally be sorted by path.
pub mod config;
pub mod errors;
pub mod filters;
pub mod listing;
pub mod results;
pub mod search;
pub mod sort;
pub mod stats;
pub mod walker;

pub use config::{BinaryMode, EncodingMode, SearchConfig, WalkConfig};
pub use errors::{Diagnostic, DiagnosticKind, SearchError, SearchResult};
pub use listing::{files, files_with_info, find_files, list_files, list_files_with_info};
pub use results::{
    ContextLine, FileInfo, FileKind, FileListing, SearchMatch, SearchReport, SearchSubmatch,
};
pub use search::{search, search_structured, MatchOptions, PatternMatcher};
pub use sort::{SortMode, SortModeKind};
pub use stats::ScanStatsSnapshot;
