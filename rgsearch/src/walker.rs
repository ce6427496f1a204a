//! Recursive traversal of the search roots.
//!
//! Roots are validated when the walker is built: a missing or unreadable
//! root becomes a diagnostic, and the build fails only when every supplied
//! root is unusable. Walking happens on a background producer thread that
//! feeds a bounded channel, so callers pull files lazily and see them in
//! completion order. Dropping the stream, or raising the stop flag, makes
//! the producer quit at its next entry.
use crossbeam_channel::{bounded, IntoIter, Sender};
use ignore::{DirEntry, WalkState};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace, warn};

use crate::config::WalkConfig;
use crate::errors::{Diagnostic, SearchError, SearchResult};
use crate::filters::PathFilter;
use crate::results::{FileInfo, FileKind};
use crate::sort::{normalize_path, PathKey};

const WALK_CHANNEL_CAPACITY: usize = 4096;

/// A file produced by the walk
#[derive(Debug, Clone)]
pub struct WalkedFile {
    /// Path as walked, usable for opening the file
    pub path: PathBuf,
    /// Normalized path used in results and for sorting
    pub display: String,
    /// Metadata, when requested
    pub info: Option<FileInfo>,
}

impl PathKey for WalkedFile {
    fn path_key(&self) -> String {
        self.display.clone()
    }
}

/// One entry of the walk: a file or a recoverable error
pub type WalkItem = SearchResult<WalkedFile>;

/// Traversal over validated roots
#[derive(Debug)]
pub struct FileWalker {
    roots: Vec<PathFilter>,
    diagnostics: Vec<Diagnostic>,
    threads: usize,
    with_metadata: bool,
}

impl FileWalker {
    /// Validates every root and compiles its filter.
    ///
    /// Fails with `InvalidGlob` for a malformed glob and with
    /// `NoReadableRoot` when roots were given but none is usable. An empty
    /// root list is valid and walks nothing.
    pub fn new(config: &WalkConfig) -> SearchResult<Self> {
        let mut roots = Vec::with_capacity(config.paths.len());
        let mut diagnostics = Vec::new();

        for root in &config.paths {
            match check_root(root) {
                Ok(()) => roots.push(PathFilter::new(root, config)?),
                Err(err) => {
                    warn!("Skipping root: {}", err);
                    diagnostics.push(err.to_diagnostic());
                }
            }
        }

        if roots.is_empty() && !config.paths.is_empty() {
            return Err(SearchError::NoReadableRoot(config.paths.clone()));
        }

        debug!(
            "Walker ready: {} usable roots, {} skipped",
            roots.len(),
            diagnostics.len()
        );

        Ok(Self {
            roots,
            diagnostics,
            threads: config.threads.get(),
            with_metadata: false,
        })
    }

    /// Attach [`FileInfo`] to every walked file
    pub fn with_metadata(mut self, yes: bool) -> Self {
        self.with_metadata = yes;
        self
    }

    /// Problems found while validating roots
    pub fn root_diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn has_roots(&self) -> bool {
        !self.roots.is_empty()
    }

    /// Starts the walk and returns a lazy stream of files
    pub fn walk(&self) -> WalkStream {
        self.walk_until(Arc::new(AtomicBool::new(false)))
    }

    /// Like [`FileWalker::walk`], but the producer also stops once `stop`
    /// is raised
    pub fn walk_until(&self, stop: Arc<AtomicBool>) -> WalkStream {
        let (tx, rx) = bounded(WALK_CHANNEL_CAPACITY);
        let roots = self.roots.clone();
        let threads = self.threads;
        let with_metadata = self.with_metadata;

        let producer = thread::spawn(move || {
            for filter in roots {
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                debug!("Walking root: {}", filter.root().display());
                let keep_going = if threads > 1 {
                    walk_root_parallel(&filter, threads, with_metadata, &tx, &stop)
                } else {
                    walk_root_sequential(&filter, with_metadata, &tx, &stop)
                };
                if !keep_going {
                    break;
                }
            }
        });

        WalkStream {
            rx: Some(rx.into_iter()),
            producer: Some(producer),
        }
    }

    /// Drains the whole walk, splitting files from diagnostics
    pub fn collect(&self) -> (Vec<WalkedFile>, Vec<Diagnostic>) {
        let mut files = Vec::new();
        let mut diagnostics = self.diagnostics.clone();
        for item in self.walk() {
            match item {
                Ok(file) => files.push(file),
                Err(err) => diagnostics.push(err.to_diagnostic()),
            }
        }
        (files, diagnostics)
    }
}

/// Lazy sequence of walk results
#[derive(Debug)]
pub struct WalkStream {
    rx: Option<IntoIter<WalkItem>>,
    producer: Option<JoinHandle<()>>,
}

impl Iterator for WalkStream {
    type Item = WalkItem;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.as_mut()?.next()
    }
}

impl Drop for WalkStream {
    fn drop(&mut self) {
        // Closing the receiver first makes any blocked send fail, so the
        // producer is guaranteed to finish.
        self.rx.take();
        if let Some(producer) = self.producer.take() {
            if producer.join().is_err() {
                warn!("Walk producer thread panicked");
            }
        }
    }
}

fn check_root(root: &Path) -> SearchResult<()> {
    let metadata = fs::metadata(root).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => SearchError::root_not_found(root),
        _ => SearchError::root_unreadable(root, e),
    })?;
    if metadata.is_dir() {
        fs::read_dir(root).map_err(|e| SearchError::root_unreadable(root, e))?;
    }
    Ok(())
}

/// Converts a walk entry; directories yield `None`.
fn to_item(entry: Result<DirEntry, ignore::Error>, with_metadata: bool) -> Option<WalkItem> {
    let entry = match entry {
        Ok(entry) => entry,
        Err(err) => {
            warn!("Walk error: {}", err);
            return Some(Err(SearchError::from(err)));
        }
    };
    if !entry.file_type().is_some_and(|ft| ft.is_file()) {
        return None;
    }

    let display = normalize_path(entry.path());
    let shown = &display;
    trace!("Walked file: {}", shown);

    let info = if with_metadata {
        match entry.metadata() {
            Ok(metadata) => {
                let mut info = FileInfo::from_metadata(display.clone(), &metadata);
                if entry.path_is_symlink() {
                    info.kind = FileKind::Symlink;
                }
                Some(info)
            }
            Err(err) => {
                let shown = &display;
                warn!("Failed to read metadata for {}: {}", shown, err);
                return Some(Err(SearchError::file_unreadable(entry.path(), err)));
            }
        }
    } else {
        None
    };

    Some(Ok(WalkedFile {
        path: entry.into_path(),
        display,
        info,
    }))
}

/// Returns false once the consumer is gone or a stop was requested
fn walk_root_sequential(
    filter: &PathFilter,
    with_metadata: bool,
    tx: &Sender<WalkItem>,
    stop: &AtomicBool,
) -> bool {
    for entry in filter.walk_builder().build() {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        if let Some(item) = to_item(entry, with_metadata) {
            if tx.send(item).is_err() {
                return false;
            }
        }
    }
    true
}

fn walk_root_parallel(
    filter: &PathFilter,
    threads: usize,
    with_metadata: bool,
    tx: &Sender<WalkItem>,
    stop: &Arc<AtomicBool>,
) -> bool {
    let disconnected = AtomicBool::new(false);
    let mut builder = filter.walk_builder();
    builder.threads(threads);

    builder.build_parallel().run(|| {
        let tx = tx.clone();
        let stop = Arc::clone(stop);
        let disconnected = &disconnected;
        Box::new(move |entry| {
            if stop.load(Ordering::Relaxed) {
                return WalkState::Quit;
            }
            if let Some(item) = to_item(entry, with_metadata) {
                if tx.send(item).is_err() {
                    disconnected.store(true, Ordering::Relaxed);
                    return WalkState::Quit;
                }
            }
            WalkState::Continue
        })
    });

    !disconnected.load(Ordering::Relaxed) && !stop.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DiagnosticKind;
    use std::num::NonZeroUsize;
    use tempfile::tempdir;

    fn make_tree(root: &Path, files: &[&str]) {
        for file in files {
            let path = root.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "content\n").unwrap();
        }
    }

    fn sorted_names(files: &[WalkedFile], root: &Path) -> Vec<String> {
        let mut names: Vec<String> = files
            .iter()
            .map(|f| normalize_path(f.path.strip_prefix(root).unwrap()))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_walk_finds_nested_files() {
        let dir = tempdir().unwrap();
        make_tree(dir.path(), &["a.rs", "src/b.rs", "src/deep/c.txt"]);

        for threads in [1, 4] {
            let config =
                WalkConfig::new([dir.path()]).threads(NonZeroUsize::new(threads).unwrap());
            let (files, diags) = FileWalker::new(&config).unwrap().collect();
            assert!(diags.is_empty());
            assert_eq!(
                sorted_names(&files, dir.path()),
                vec!["a.rs", "src/b.rs", "src/deep/c.txt"]
            );
        }
    }

    #[test]
    fn test_globs_applied_during_walk() {
        let dir = tempdir().unwrap();
        make_tree(dir.path(), &["src/a.rs", "target/gen.rs", "notes.md"]);

        let config = WalkConfig::new([dir.path()]).globs(["*.rs", "!target/*.rs"]);
        let (files, _) = FileWalker::new(&config).unwrap().collect();
        assert_eq!(sorted_names(&files, dir.path()), vec!["src/a.rs"]);
    }

    #[test]
    fn test_missing_root_is_recoverable() {
        let dir = tempdir().unwrap();
        make_tree(dir.path(), &["a.txt"]);
        let missing = dir.path().join("missing");

        let config = WalkConfig::new([dir.path().to_path_buf(), missing.clone()]);
        let walker = FileWalker::new(&config).unwrap();
        assert_eq!(walker.root_diagnostics().len(), 1);
        assert_eq!(walker.root_diagnostics()[0].kind, DiagnosticKind::RootNotFound);

        let (files, diags) = walker.collect();
        assert_eq!(files.len(), 1);
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn test_all_roots_missing_is_fatal() {
        let config = WalkConfig::new(["/definitely/not/here"]);
        let err = FileWalker::new(&config).unwrap_err();
        assert!(matches!(err, SearchError::NoReadableRoot(_)));
    }

    #[test]
    fn test_empty_roots_walk_nothing() {
        let config = WalkConfig::new(Vec::<PathBuf>::new());
        let walker = FileWalker::new(&config).unwrap();
        assert!(!walker.has_roots());
        assert_eq!(walker.walk().count(), 0);
    }

    #[test]
    fn test_file_root_is_yielded() {
        let dir = tempdir().unwrap();
        make_tree(dir.path(), &["single.txt"]);
        let config = WalkConfig::new([dir.path().join("single.txt")]);
        let (files, _) = FileWalker::new(&config).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_metadata_attached() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("sized.txt"), "12345").unwrap();
        let config = WalkConfig::new([dir.path()]);
        let (files, _) = FileWalker::new(&config)
            .unwrap()
            .with_metadata(true)
            .collect();
        let info = files[0].info.as_ref().unwrap();
        assert_eq!(info.size, 5);
        assert_eq!(info.kind, FileKind::File);
        assert!(info.modified.is_some());
    }

    #[test]
    fn test_dropping_stream_early_stops_producer() {
        let dir = tempdir().unwrap();
        let names: Vec<String> = (0..200).map(|i| format!("f{i}.txt")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        make_tree(dir.path(), &refs);

        let config = WalkConfig::new([dir.path()]).threads(NonZeroUsize::new(2).unwrap());
        let walker = FileWalker::new(&config).unwrap();
        let first: Vec<_> = walker.walk().take(3).collect();
        assert_eq!(first.len(), 3);
        // Reaching this point means Drop joined the producer
    }

    #[test]
    fn test_walk_beyond_channel_capacity() {
        let dir = tempdir().unwrap();
        let count = WALK_CHANNEL_CAPACITY + 100;
        for i in 0..count {
            fs::write(dir.path().join(format!("f{i}.txt")), "").unwrap();
        }

        let config = WalkConfig::new([dir.path()]).threads(NonZeroUsize::new(2).unwrap());
        let walker = FileWalker::new(&config).unwrap();
        // Producer blocks on the full channel until the consumer catches up
        let walked = walker.walk().filter(|item| item.is_ok()).count();
        assert_eq!(walked, count);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_cycle_terminates() {
        let dir = tempdir().unwrap();
        make_tree(dir.path(), &["sub/file.txt"]);
        std::os::unix::fs::symlink(dir.path(), dir.path().join("sub/loop")).unwrap();

        let config = WalkConfig::new([dir.path()]).follow_links(true);
        let (files, diags) = FileWalker::new(&config).unwrap().collect();
        assert_eq!(files.len(), 1);
        assert!(!diags.is_empty(), "the loop is reported");

        let config = WalkConfig::new([dir.path()]);
        let (files, diags) = FileWalker::new(&config).unwrap().collect();
        assert_eq!(files.len(), 1);
        assert!(diags.is_empty(), "links are not followed by default");
    }
}
