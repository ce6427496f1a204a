use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::matcher::PatternMatcher;
use super::scanner::{LineScanner, ScanOutcome};
use crate::config::SearchConfig;
use crate::errors::{Diagnostic, SearchError, SearchResult};
use crate::results::{SearchMatch, SearchReport};
use crate::sort::sort;
use crate::walker::{FileWalker, WalkItem, WalkedFile};

/// Searches every file under the configured roots and returns all matches.
///
/// `max_total` is ignored here; use [`search_structured`] for a bounded
/// search. Recoverable problems are logged and the affected entries
/// omitted.
pub fn search(config: &SearchConfig) -> SearchResult<Vec<SearchMatch>> {
    let mut config = config.clone();
    config.max_total = None;
    Ok(search_structured(&config)?.matches)
}

/// Searches every file under the configured roots, enforcing `max_total`
/// and reporting skipped entries alongside the matches.
///
/// Fatal problems (bad pattern, bad glob, no readable root) are returned
/// before any file is scanned. With `SortMode::Path` the output is grouped
/// per file in sorted order and truncation at `max_total` is
/// deterministic; otherwise files appear in completion order.
pub fn search_structured(config: &SearchConfig) -> SearchResult<SearchReport> {
    info!(
        "Starting search with {} patterns over {} roots",
        config.patterns.len(),
        config.walk.paths.len()
    );
    config.validate()?;

    let matcher = PatternMatcher::compile(&config.patterns, config.match_options())?;
    let walker = FileWalker::new(&config.walk)?;
    let scanner = LineScanner::new(matcher, config.scan_options());
    let pool = build_pool(config.walk.threads.get())?;
    let budget = MatchBudget::new(config.max_total);

    let mut report = SearchReport::new();
    report.diagnostics.extend(walker.root_diagnostics().iter().cloned());

    if !walker.has_roots() {
        debug!("No roots to search, returning empty result");
    } else if config.walk.sort.is_sorted() {
        search_sorted(config, &walker, &scanner, &pool, &budget, &mut report);
    } else {
        search_unordered(&walker, &scanner, &pool, &budget, &mut report);
    }

    report.limit_reached = budget.is_exhausted();
    if report.limit_reached {
        debug!("Match limit of {:?} reached", config.max_total);
    }
    report.stats = scanner.stats().snapshot();
    scanner.stats().log_stats();

    info!(
        "Search complete. Found {} matches in {} files ({} skipped entries)",
        report.total_matches(),
        report.files_with_matches,
        report.diagnostics.len()
    );
    Ok(report)
}

fn build_pool(threads: usize) -> SearchResult<ThreadPool> {
    ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("rgsearch-scan-{i}"))
        .build()
        .map_err(|e| SearchError::ThreadPool(e.to_string()))
}

/// Signals that the match ceiling was hit and no further work should start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LimitReached;

/// What one walked entry contributed
enum FileOutcome {
    Matches(Vec<SearchMatch>),
    Skipped(Diagnostic),
}

/// Shared accounting for `max_total`.
///
/// Workers reserve slots before publishing matches, so the total handed
/// out can never exceed the limit no matter how many workers race.
#[derive(Debug)]
struct MatchBudget {
    limit: Option<usize>,
    used: AtomicUsize,
    stop: Arc<AtomicBool>,
}

impl MatchBudget {
    fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            used: AtomicUsize::new(0),
            stop: Arc::new(AtomicBool::new(limit == Some(0))),
        }
    }

    /// Reserves up to `wanted` slots and returns how many were granted
    fn reserve(&self, wanted: usize) -> usize {
        let Some(limit) = self.limit else {
            return wanted;
        };
        let mut granted = 0;
        // The closure always returns Some, so the update cannot fail
        let _ = self
            .used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                granted = wanted.min(limit - used);
                Some(used + granted)
            });
        if self.is_exhausted() {
            self.stop.store(true, Ordering::SeqCst);
        }
        granted
    }

    /// Slots still available, or `None` when unbounded
    fn remaining(&self) -> Option<usize> {
        self.limit
            .map(|limit| limit - self.used.load(Ordering::SeqCst))
    }

    fn is_exhausted(&self) -> bool {
        self.remaining() == Some(0)
    }

    fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }
}

/// Scans one walked entry. Binary files and read failures turn into
/// diagnostics; they never abort the search.
fn scan_entry(
    scanner: &LineScanner,
    item: WalkItem,
    cap: Option<usize>,
    stop: &AtomicBool,
) -> FileOutcome {
    let file = match item {
        Ok(file) => file,
        Err(err) => return FileOutcome::Skipped(walk_skip(scanner, &err)),
    };
    scan_walked(scanner, &file, cap, stop)
}

/// Counts an entry the walker could not read and turns it into a diagnostic
fn walk_skip(scanner: &LineScanner, err: &SearchError) -> Diagnostic {
    if matches!(err, SearchError::FileUnreadable { .. }) {
        scanner.stats().record_unreadable();
    }
    err.to_diagnostic()
}

fn scan_walked(
    scanner: &LineScanner,
    file: &WalkedFile,
    cap: Option<usize>,
    stop: &AtomicBool,
) -> FileOutcome {
    match scanner.scan_file(&file.path, &file.display, cap, stop) {
        Ok(ScanOutcome::Matches(matches)) => FileOutcome::Matches(matches),
        Ok(ScanOutcome::Binary) => FileOutcome::Skipped(Diagnostic::binary_skipped(&file.path)),
        Err(err) => {
            warn!("Skipping file: {}", err);
            if matches!(err, SearchError::FileUnreadable { .. }) {
                scanner.stats().record_unreadable();
            }
            FileOutcome::Skipped(err.to_diagnostic())
        }
    }
}

/// Charges a file's matches against the budget, dropping what does not fit
fn charge(outcome: FileOutcome, budget: &MatchBudget) -> FileOutcome {
    match outcome {
        FileOutcome::Matches(mut matches) => {
            let granted = budget.reserve(matches.len());
            matches.truncate(granted);
            FileOutcome::Matches(matches)
        }
        skipped => skipped,
    }
}

fn record(outcome: FileOutcome, report: &mut SearchReport) {
    match outcome {
        FileOutcome::Matches(matches) => report.add_file_matches(matches),
        FileOutcome::Skipped(diagnostic) => report.diagnostics.push(diagnostic),
    }
}

/// Streams the walk straight into the pool. Each worker reserves its share
/// of the budget as soon as its file is done, so the first files to finish
/// win.
fn search_unordered(
    walker: &FileWalker,
    scanner: &LineScanner,
    pool: &ThreadPool,
    budget: &MatchBudget,
    report: &mut SearchReport,
) {
    let stop = budget.stop_flag();
    let stream = walker.walk_until(budget.stop_flag());

    let outcomes: Vec<FileOutcome> = pool.install(|| {
        stream
            .par_bridge()
            .map(|item| -> Result<FileOutcome, LimitReached> {
                if budget.is_stopped() {
                    return Err(LimitReached);
                }
                let outcome = scan_entry(scanner, item, budget.remaining(), &stop);
                Ok(charge(outcome, budget))
            })
            .filter_map(Result::ok)
            .collect()
    });

    for outcome in outcomes {
        record(outcome, report);
    }
}

/// Walks everything, sorts, then scans in ordered batches. Within a batch
/// files are scanned in parallel against the budget left at the start of
/// the batch; the budget is then charged in file order, so the kept
/// matches are always a prefix of the sorted output.
fn search_sorted(
    config: &SearchConfig,
    walker: &FileWalker,
    scanner: &LineScanner,
    pool: &ThreadPool,
    budget: &MatchBudget,
    report: &mut SearchReport,
) {
    let mut files = Vec::new();
    for item in walker.walk() {
        match item {
            Ok(file) => files.push(file),
            Err(err) => report.diagnostics.push(walk_skip(scanner, &err)),
        }
    }
    let files = sort(files, config.walk.sort);
    debug!("Sorted {} files with {:?}", files.len(), config.walk.sort);

    let thread_count = config.walk.threads.get();
    let chunk_size = (files.len() / thread_count).clamp(16, 256);
    let batch_size = chunk_size * thread_count;
    let never = AtomicBool::new(false);

    for batch in files.chunks(batch_size) {
        if budget.is_stopped() {
            break;
        }
        let cap = budget.remaining();
        let outcomes: Vec<FileOutcome> = pool.install(|| {
            batch
                .par_chunks(chunk_size)
                .flat_map_iter(|chunk| {
                    chunk
                        .iter()
                        .map(|file| scan_walked(scanner, file, cap, &never))
                })
                .collect()
        });
        for outcome in outcomes {
            if budget.is_stopped() {
                break;
            }
            record(charge(outcome, budget), report);
        }
    }
}
