//! Ordering of listed paths.
//!
//! Only the file list is ever sorted. Match results keep discovery order,
//! which becomes deterministic when the file list feeding the scanners is
//! sorted first.
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::path::{Path, PathBuf};

use crate::results::FileInfo;

/// Sort key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortModeKind {
    /// Keep traversal order. That order is unspecified and may differ
    /// between runs and platforms.
    #[default]
    None,
    /// Byte-wise order of the normalized path string
    Path,
}

/// A sort key plus direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortMode {
    #[serde(default)]
    pub kind: SortModeKind,
    /// Descending when set
    #[serde(default)]
    pub reverse: bool,
}

impl SortMode {
    pub fn new(kind: SortModeKind) -> Self {
        Self {
            kind,
            reverse: false,
        }
    }

    pub fn path() -> Self {
        Self::new(SortModeKind::Path)
    }

    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }

    pub fn is_sorted(&self) -> bool {
        self.kind != SortModeKind::None
    }
}

/// Anything that can be ordered by its path
pub trait PathKey {
    fn path_key(&self) -> String;
}

impl PathKey for String {
    fn path_key(&self) -> String {
        normalize_separators(self)
    }
}

impl PathKey for PathBuf {
    fn path_key(&self) -> String {
        normalize_path(self)
    }
}

impl PathKey for FileInfo {
    fn path_key(&self) -> String {
        normalize_separators(&self.path)
    }
}

/// Renders a path with `/` separators and without a leading `./`.
pub fn normalize_path(path: &Path) -> String {
    normalize_separators(&path.to_string_lossy())
}

fn normalize_separators(path: &str) -> String {
    let path = if cfg!(windows) {
        path.replace('\\', "/")
    } else {
        path.to_string()
    };
    match path.strip_prefix("./") {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => path,
    }
}

/// Sorts `items` in place. `SortModeKind::None` leaves the input untouched.
/// The sort is stable in both directions.
pub fn sort_items<T: PathKey>(items: &mut [T], mode: SortMode) {
    match (mode.kind, mode.reverse) {
        (SortModeKind::None, _) => {}
        (SortModeKind::Path, false) => {
            items.sort_by_cached_key(|item| item.path_key().into_bytes())
        }
        (SortModeKind::Path, true) => {
            items.sort_by_cached_key(|item| Reverse(item.path_key().into_bytes()))
        }
    }
}

/// Owned variant of [`sort_items`]
pub fn sort<T: PathKey>(mut items: Vec<T>, mode: SortMode) -> Vec<T> {
    sort_items(&mut items, mode);
    items
}
