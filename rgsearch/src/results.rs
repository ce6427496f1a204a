//! Value records returned by search and listing operations.
//!
//! Every record is an owned, immutable value with equality defined by its
//! fields. Line text never includes the line terminator (`\n` or `\r\n`),
//! and all submatch offsets are byte offsets into that text.
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::errors::Diagnostic;
use crate::stats::ScanStatsSnapshot;

/// One contiguous matched span within a line
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchSubmatch {
    /// Byte offset of the first matched byte
    pub start: usize,
    /// Byte offset one past the last matched byte
    pub end: usize,
    /// Exactly `line_text[start..end]`
    pub text: String,
}

impl SearchSubmatch {
    /// Builds a submatch by slicing `line`. Returns `None` when the range is
    /// out of bounds or splits a character.
    pub fn from_line(line: &str, start: usize, end: usize) -> Option<Self> {
        line.get(start..end).map(|text| Self {
            start,
            end,
            text: text.to_string(),
        })
    }
}

/// A neighbouring line attached to a match for context
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextLine {
    pub line_number: u64,
    pub text: String,
}

/// A line that matched at least one pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchMatch {
    /// Path of the matching file, as walked
    pub path: String,
    /// 1-based line number
    pub line_number: u64,
    /// Full line text without its terminator
    pub line_text: String,
    /// Matched spans, left to right, non-overlapping
    pub submatches: Vec<SearchSubmatch>,
    /// Lines preceding the match, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context_before: Vec<ContextLine>,
    /// Lines following the match
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context_after: Vec<ContextLine>,
}

impl SearchMatch {
    /// Renders the match the way grep prints it: `path:line:text` when
    /// `line_number` is set, `path:text` otherwise.
    pub fn to_grep_line(&self, line_number: bool) -> String {
        if line_number {
            format!("{}:{}:{}", self.path, self.line_number, self.line_text)
        } else {
            format!("{}:{}", self.path, self.line_text)
        }
    }

    /// Checks the record invariants: sorted, non-overlapping, in-bounds
    /// submatches whose text equals the slice they point at.
    pub fn is_well_formed(&self) -> bool {
        let mut previous_end = 0;
        for (i, sub) in self.submatches.iter().enumerate() {
            if sub.start > sub.end || sub.end > self.line_text.len() {
                return false;
            }
            if i > 0 && sub.start < previous_end {
                return false;
            }
            if self.line_text.get(sub.start..sub.end) != Some(sub.text.as_str()) {
                return false;
            }
            previous_end = sub.end;
        }
        true
    }
}

/// Kind of filesystem entry described by a [`FileInfo`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    File,
    Directory,
    Symlink,
    Other,
}

impl FileKind {
    pub fn from_file_type(file_type: std::fs::FileType) -> Self {
        if file_type.is_symlink() {
            Self::Symlink
        } else if file_type.is_dir() {
            Self::Directory
        } else if file_type.is_file() {
            Self::File
        } else {
            Self::Other
        }
    }
}

/// A listed file together with its metadata
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    /// Size in bytes
    pub size: u64,
    /// Last modification time, when the platform reports one
    pub modified: Option<SystemTime>,
    pub kind: FileKind,
}

impl FileInfo {
    pub fn from_metadata(path: String, metadata: &std::fs::Metadata) -> Self {
        Self {
            path,
            size: metadata.len(),
            modified: metadata.modified().ok(),
            kind: FileKind::from_file_type(metadata.file_type()),
        }
    }
}

/// Matches from a structured search plus everything the caller needs to
/// tell "no matches" apart from "skipped entries"
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchReport {
    /// Matches in emission order
    pub matches: Vec<SearchMatch>,
    /// Roots and files that were omitted, and why
    pub diagnostics: Vec<Diagnostic>,
    /// True when the `max_total` ceiling was hit
    pub limit_reached: bool,
    /// Number of files with at least one reported match
    pub files_with_matches: usize,
    pub stats: ScanStatsSnapshot,
}

impl SearchReport {
    /// Creates a new empty report
    pub fn new() -> Self {
        Default::default()
    }

    /// Appends the matches of one file, keeping the per-file counters in step
    pub fn add_file_matches(&mut self, matches: Vec<SearchMatch>) {
        if !matches.is_empty() {
            self.files_with_matches += 1;
            self.matches.extend(matches);
        }
    }

    pub fn total_matches(&self) -> usize {
        self.matches.len()
    }
}

/// Result of a listing operation
#[derive(Debug, Clone, Default, Serialize)]
pub struct FileListing<T> {
    pub files: Vec<T>,
    pub diagnostics: Vec<Diagnostic>,
}
