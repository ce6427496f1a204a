//! Per-entry include/descend decisions.
//!
//! A [`PathFilter`] combines the caller's ordered glob list with standard
//! ignore-file handling. Globs follow gitignore conventions through
//! `ignore::overrides`:
//!
//! - a plain glob (`*.rs`) whitelists; once any whitelist glob exists, files
//!   matching none of them are excluded
//! - a glob prefixed with `!` excludes
//! - the last matching glob wins
//! - a glob without `/` matches the file name at any depth, a glob with `/`
//!   is anchored at the search root
//!
//! Directories are only pruned by an explicit exclude, never for failing to
//! match a whitelist glob, so `*.rs` still finds `src/deep/mod.rs`.
use ignore::overrides::{Override, OverrideBuilder};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::WalkConfig;
use crate::errors::{SearchError, SearchResult};

/// Filter decisions for one search root
#[derive(Debug, Clone)]
pub struct PathFilter {
    root: PathBuf,
    overrides: Override,
    hidden: bool,
    respect_ignore_files: bool,
    follow_links: bool,
    max_depth: Option<usize>,
}

impl PathFilter {
    /// Compiles `config.globs` relative to `root`. Fails on the first
    /// malformed glob.
    pub fn new(root: &Path, config: &WalkConfig) -> SearchResult<Self> {
        let mut builder = OverrideBuilder::new(root);
        for glob in &config.globs {
            debug!("Adding glob for {}: {}", root.display(), glob);
            builder
                .add(glob)
                .map_err(|e| SearchError::invalid_glob(glob, e))?;
        }
        let overrides = builder
            .build()
            .map_err(|e| SearchError::invalid_glob(config.globs.join(","), e))?;

        Ok(Self {
            root: root.to_path_buf(),
            overrides,
            hidden: config.hidden,
            respect_ignore_files: config.respect_ignore_files,
            follow_links: config.follow_links,
            max_depth: config.max_depth,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Glob decision for a single entry. For directories `true` means
    /// descend, for files it means include. The walker applies the same
    /// overrides while it reads each directory.
    #[cfg(test)]
    fn is_included(&self, path: &Path, is_dir: bool) -> bool {
        !matches!(self.overrides.matched(path, is_dir), ignore::Match::Ignore(_))
    }

    /// Whether any glob was supplied
    pub fn has_globs(&self) -> bool {
        !self.overrides.is_empty()
    }

    /// Creates a walk builder for this root with every filter applied
    pub fn walk_builder(&self) -> WalkBuilder {
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .hidden(!self.hidden)
            .parents(self.respect_ignore_files)
            .ignore(self.respect_ignore_files)
            .git_ignore(self.respect_ignore_files)
            .git_global(self.respect_ignore_files)
            .git_exclude(self.respect_ignore_files)
            .require_git(false)
            .follow_links(self.follow_links)
            .max_depth(self.max_depth);
        if self.has_globs() {
            builder.overrides(self.overrides.clone());
        }
        builder
    }
}
