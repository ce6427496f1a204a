//! Error taxonomy for search and listing operations.
//!
//! Errors fall into two groups. Fatal errors (bad patterns, bad globs, no
//! usable root, thread pool failures) are returned as `Err` before any
//! traversal starts. Recoverable errors concern a single root or file; the
//! engine turns them into [`Diagnostic`] records and keeps going.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for search operations
pub type SearchResult<T> = Result<T, SearchError>;

/// Errors that can occur during search operations
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
    #[error("No search patterns provided")]
    EmptyPatterns,
    #[error("Invalid glob '{glob}': {message}")]
    InvalidGlob { glob: String, message: String },
    #[error("Root not found: {0}")]
    RootNotFound(PathBuf),
    #[error("Root unreadable: {path}: {message}")]
    RootUnreadable { path: PathBuf, message: String },
    #[error("None of the search roots could be read: {0:?}")]
    NoReadableRoot(Vec<PathBuf>),
    #[error("File unreadable: {path}: {message}")]
    FileUnreadable { path: PathBuf, message: String },
    #[error("Invalid UTF-8 in file {path}: {source}")]
    EncodingError {
        path: PathBuf,
        source: std::str::Utf8Error,
    },
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SearchError {
    pub fn invalid_pattern(pattern: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            message: message.to_string(),
        }
    }

    pub fn invalid_glob(glob: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::InvalidGlob {
            glob: glob.into(),
            message: message.to_string(),
        }
    }

    pub fn root_not_found(path: impl Into<PathBuf>) -> Self {
        Self::RootNotFound(path.into())
    }

    pub fn root_unreadable(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Self::RootUnreadable {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn file_unreadable(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Self::FileUnreadable {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn encoding_error(path: impl Into<PathBuf>, source: std::str::Utf8Error) -> Self {
        Self::EncodingError {
            path: path.into(),
            source,
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Maps an I/O failure on a file to the matching recoverable error.
    pub fn from_file_io(path: &Path, err: std::io::Error) -> Self {
        Self::file_unreadable(path, err)
    }

    /// Recoverable errors affect a single root or file and never abort an
    /// operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::RootNotFound(_)
                | Self::RootUnreadable { .. }
                | Self::FileUnreadable { .. }
                | Self::EncodingError { .. }
                | Self::IoError(_)
        )
    }

    /// Converts a recoverable error into a side-channel diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let (path, kind) = match self {
            Self::RootNotFound(path) => (Some(path.clone()), DiagnosticKind::RootNotFound),
            Self::RootUnreadable { path, .. } => {
                (Some(path.clone()), DiagnosticKind::RootUnreadable)
            }
            Self::FileUnreadable { path, .. } => {
                (Some(path.clone()), DiagnosticKind::FileUnreadable)
            }
            Self::EncodingError { path, .. } => (Some(path.clone()), DiagnosticKind::Encoding),
            _ => (None, DiagnosticKind::Other),
        };
        Diagnostic {
            path,
            kind,
            message: self.to_string(),
        }
    }
}

impl From<ignore::Error> for SearchError {
    fn from(err: ignore::Error) -> Self {
        match walk_error_path(&err) {
            Some(path) => Self::file_unreadable(path, &err),
            None => match err.into_io_error() {
                Some(io) => Self::IoError(io),
                None => Self::config_error("directory walk failed"),
            },
        }
    }
}

/// Digs the offending path out of a (possibly nested) walk error.
fn walk_error_path(err: &ignore::Error) -> Option<PathBuf> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.clone()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            walk_error_path(err)
        }
        ignore::Error::Loop { child, .. } => Some(child.clone()),
        _ => None,
    }
}

/// Category of a recoverable problem reported next to results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    RootNotFound,
    RootUnreadable,
    FileUnreadable,
    BinarySkipped,
    Encoding,
    Other,
}

/// A recoverable problem that caused an entry to be omitted from results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub path: Option<PathBuf>,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn binary_skipped(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let message = format!("binary content skipped: {}", path.display());
        Self {
            path: Some(path),
            kind: DiagnosticKind::BinarySkipped,
            message,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let path = Path::new("test.txt");
        let err = SearchError::root_not_found(path);
        assert!(matches!(err, SearchError::RootNotFound(_)));

        let err = SearchError::file_unreadable(path, "permission denied");
        assert!(matches!(err, SearchError::FileUnreadable { .. }));

        let err = SearchError::invalid_pattern("(", "unclosed group");
        assert!(matches!(err, SearchError::InvalidPattern { .. }));

        let err = SearchError::invalid_glob("{", "unclosed alternate");
        assert!(matches!(err, SearchError::InvalidGlob { .. }));
    }

    #[test]
    fn test_error_messages() {
        let err = SearchError::invalid_pattern("foo(", "unclosed group");
        assert_eq!(err.to_string(), "Invalid pattern 'foo(': unclosed group");

        let err = SearchError::config_error("Missing required field");
        assert_eq!(err.to_string(), "Configuration error: Missing required field");

        let err = SearchError::root_not_found("missing");
        assert_eq!(err.to_string(), "Root not found: missing");

        assert_eq!(SearchError::EmptyPatterns.to_string(), "No search patterns provided");
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(SearchError::root_not_found("a").is_recoverable());
        assert!(SearchError::file_unreadable("a", "gone").is_recoverable());
        assert!(!SearchError::EmptyPatterns.is_recoverable());
        assert!(!SearchError::invalid_pattern("(", "bad").is_recoverable());
        assert!(!SearchError::NoReadableRoot(vec![]).is_recoverable());
    }

    #[test]
    fn test_diagnostic_conversion() {
        let diag = SearchError::root_not_found("nowhere").to_diagnostic();
        assert_eq!(diag.kind, DiagnosticKind::RootNotFound);
        assert_eq!(diag.path, Some(PathBuf::from("nowhere")));
        assert_eq!(diag.message, "Root not found: nowhere");

        let diag = Diagnostic::binary_skipped("blob.bin");
        assert_eq!(diag.kind, DiagnosticKind::BinarySkipped);
        assert!(diag.to_string().contains("blob.bin"));
    }
}
