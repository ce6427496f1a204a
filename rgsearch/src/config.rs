use config::{Config as ConfigBuilder, File};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::errors::{SearchError, SearchResult};
use crate::search::matcher::MatchOptions;
use crate::search::scanner::ScanOptions;
use crate::sort::SortMode;

/// Configuration for search and listing operations.
///
/// # Configuration Locations
///
/// The configuration can be loaded from multiple locations in order of precedence:
/// 1. Custom config file passed to [`SearchConfig::load_from`]
/// 2. Local `.rgsearch.yaml` in the current directory
/// 3. Global `$HOME/.config/rgsearch/config.yaml`
///
/// # Configuration Format
///
/// ```yaml
/// patterns: ["TODO", "FIXME"]
/// paths: ["src", "tests"]
///
/// # Include/exclude globs, later entries win; `!` excludes
/// globs:
///   - "*.rs"
///   - "!target/*.rs"
///
/// case_insensitive: false
/// fixed_strings: false
/// max_total: 500
/// sort:
///   kind: Path
///   reverse: false
///
/// threads: 4
/// log_level: "info"
/// ```
///
/// Every field is optional in the file; missing keys take the documented
/// defaults. Command line values take precedence through
/// [`SearchConfig::merge_with_cli`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Patterns to search for; a line matches when any of them matches
    pub patterns: Vec<String>,

    /// Traversal settings shared with the listing operations
    #[serde(flatten)]
    pub walk: WalkConfig,

    /// Render `path:line:text` instead of `path:text` in grep-style output.
    /// Matching and the `line_number` field of each record are unaffected.
    pub line_number: bool,

    /// Fold case before matching
    pub case_insensitive: bool,

    /// Treat every pattern as a literal string
    pub fixed_strings: bool,

    /// Hard ceiling on the number of matches returned by structured searches
    pub max_total: Option<usize>,

    /// Maximum number of matching lines reported per file
    pub max_per_file: Option<usize>,

    /// Number of context lines to attach before each match
    pub context_before: usize,

    /// Number of context lines to attach after each match
    pub context_after: usize,

    /// What to do with files that contain NUL bytes
    pub binary: BinaryMode,

    /// How to handle invalid UTF-8 sequences
    pub encoding: EncodingMode,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Traversal settings: roots, filters and parallelism
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkConfig {
    /// Roots to search. An empty list yields an empty result.
    pub paths: Vec<PathBuf>,

    /// Ordered include/exclude globs. A leading `!` excludes and the last
    /// matching glob wins. Globs without a `/` match the file name at any
    /// depth; globs with a `/` are anchored at the search root.
    pub globs: Vec<String>,

    /// Include hidden files and directories
    pub hidden: bool,

    /// Honour `.gitignore`, `.ignore` and git exclude files
    pub respect_ignore_files: bool,

    /// Follow symbolic links. Link cycles are detected and reported.
    pub follow_links: bool,

    /// Maximum directory depth below each root
    pub max_depth: Option<usize>,

    /// Worker count for traversal and scanning
    /// Defaults to number of CPU cores if not specified
    pub threads: NonZeroUsize,

    /// Ordering applied to the file list
    pub sort: SortMode,
}

/// Policy for files that look binary (contain a NUL byte)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryMode {
    /// Skip the file and record a diagnostic
    #[default]
    Skip,
    /// Scan the file as text anyway
    Text,
}

/// Policy for invalid UTF-8
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    /// Skip the file and record an encoding diagnostic
    #[default]
    FailFast,
    /// Replace invalid sequences with U+FFFD and keep scanning
    Lossy,
}

pub(crate) fn default_thread_count() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            globs: Vec::new(),
            hidden: false,
            respect_ignore_files: true,
            follow_links: false,
            max_depth: None,
            threads: default_thread_count(),
            sort: SortMode::default(),
        }
    }
}

impl WalkConfig {
    pub fn new<P: Into<PathBuf>>(paths: impl IntoIterator<Item = P>) -> Self {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn globs<S: Into<String>>(mut self, globs: impl IntoIterator<Item = S>) -> Self {
        self.globs = globs.into_iter().map(Into::into).collect();
        self
    }

    pub fn sort(mut self, sort: SortMode) -> Self {
        self.sort = sort;
        self
    }

    pub fn threads(mut self, threads: NonZeroUsize) -> Self {
        self.threads = threads;
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn follow_links(mut self, follow_links: bool) -> Self {
        self.follow_links = follow_links;
        self
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            walk: WalkConfig::default(),
            line_number: false,
            case_insensitive: false,
            fixed_strings: false,
            max_total: None,
            max_per_file: None,
            context_before: 0,
            context_after: 0,
            binary: BinaryMode::default(),
            encoding: EncodingMode::default(),
            log_level: default_log_level(),
        }
    }
}

impl SearchConfig {
    /// Creates a configuration with the given patterns and roots and every
    /// other option at its default
    pub fn new<S, P>(
        patterns: impl IntoIterator<Item = S>,
        paths: impl IntoIterator<Item = P>,
    ) -> Self
    where
        S: Into<String>,
        P: Into<PathBuf>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
            walk: WalkConfig::new(paths),
            ..Default::default()
        }
    }

    pub fn globs<S: Into<String>>(mut self, globs: impl IntoIterator<Item = S>) -> Self {
        self.walk.globs = globs.into_iter().map(Into::into).collect();
        self
    }

    pub fn line_number(mut self, yes: bool) -> Self {
        self.line_number = yes;
        self
    }

    pub fn case_insensitive(mut self, yes: bool) -> Self {
        self.case_insensitive = yes;
        self
    }

    pub fn fixed_strings(mut self, yes: bool) -> Self {
        self.fixed_strings = yes;
        self
    }

    pub fn max_total(mut self, max_total: usize) -> Self {
        self.max_total = Some(max_total);
        self
    }

    pub fn max_per_file(mut self, max_per_file: usize) -> Self {
        self.max_per_file = Some(max_per_file);
        self
    }

    pub fn context(mut self, before: usize, after: usize) -> Self {
        self.context_before = before;
        self.context_after = after;
        self
    }

    pub fn sort(mut self, sort: SortMode) -> Self {
        self.walk.sort = sort;
        self
    }

    pub fn threads(mut self, threads: NonZeroUsize) -> Self {
        self.walk.threads = threads;
        self
    }

    pub fn binary(mut self, binary: BinaryMode) -> Self {
        self.binary = binary;
        self
    }

    pub fn encoding(mut self, encoding: EncodingMode) -> Self {
        self.encoding = encoding;
        self
    }

    /// Boundary validation for search operations. Pattern syntax is checked
    /// later by the compiler, which can name the offending pattern.
    pub fn validate(&self) -> SearchResult<()> {
        if self.patterns.is_empty() {
            return Err(SearchError::EmptyPatterns);
        }
        Ok(())
    }

    pub fn match_options(&self) -> MatchOptions {
        MatchOptions {
            case_insensitive: self.case_insensitive,
            fixed_strings: self.fixed_strings,
            line_number: self.line_number,
        }
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            binary: self.binary,
            encoding: self.encoding,
            context_before: self.context_before,
            context_after: self.context_after,
            max_per_file: self.max_per_file,
        }
    }

    /// Loads configuration from the default locations
    pub fn load() -> SearchResult<Self> {
        Self::load_from(None)
    }

    /// Loads configuration from the default locations plus an optional
    /// explicit file. The explicit file must exist.
    pub fn load_from(config_path: Option<&Path>) -> SearchResult<Self> {
        let mut builder = ConfigBuilder::builder();

        let defaults = [
            // Global config
            dirs::config_dir().map(|p| p.join("rgsearch/config.yaml")),
            // Local config
            Some(PathBuf::from(".rgsearch.yaml")),
        ];

        for path in defaults.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| SearchError::config_error(e.to_string()))
    }

    /// Merges CLI arguments with configuration file values
    pub fn merge_with_cli(mut self, cli: SearchConfig) -> Self {
        let defaults = SearchConfig::default();

        // CLI values take precedence over config file values
        if !cli.patterns.is_empty() {
            self.patterns = cli.patterns;
        }
        if !cli.walk.paths.is_empty() {
            self.walk.paths = cli.walk.paths;
        }
        if !cli.walk.globs.is_empty() {
            self.walk.globs = cli.walk.globs;
        }
        self.walk.hidden |= cli.walk.hidden;
        self.walk.follow_links |= cli.walk.follow_links;
        if !cli.walk.respect_ignore_files {
            self.walk.respect_ignore_files = false;
        }
        if cli.walk.max_depth.is_some() {
            self.walk.max_depth = cli.walk.max_depth;
        }
        if cli.walk.threads != defaults.walk.threads {
            self.walk.threads = cli.walk.threads;
        }
        if cli.walk.sort != defaults.walk.sort {
            self.walk.sort = cli.walk.sort;
        }
        self.line_number |= cli.line_number;
        self.case_insensitive |= cli.case_insensitive;
        self.fixed_strings |= cli.fixed_strings;
        if cli.max_total.is_some() {
            self.max_total = cli.max_total;
        }
        if cli.max_per_file.is_some() {
            self.max_per_file = cli.max_per_file;
        }
        if cli.context_before != 0 {
            self.context_before = cli.context_before;
        }
        if cli.context_after != 0 {
            self.context_after = cli.context_after;
        }
        if cli.binary != defaults.binary {
            self.binary = cli.binary;
        }
        if cli.encoding != defaults.encoding {
            self.encoding = cli.encoding;
        }
        if cli.log_level != defaults.log_level {
            self.log_level = cli.log_level;
        }
        self
    }
}
