use memmap2::Mmap;
use std::borrow::Cow;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, Read};
use std::ops::Deref;
use std::path::Path;
use std::str::Lines;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{trace, warn};

use super::matcher::PatternMatcher;
use crate::config::{BinaryMode, EncodingMode};
use crate::errors::{SearchError, SearchResult};
use crate::results::{ContextLine, SearchMatch, SearchSubmatch};
use crate::stats::ScanStats;

// Constants for file processing
const BUFFER_CAPACITY: usize = 65536;
pub(crate) const SMALL_FILE_THRESHOLD: u64 = 32 * 1024; // 32KB
pub(crate) const LARGE_FILE_THRESHOLD: u64 = 10 * 1024 * 1024; // 10MB

/// Per-file scanning policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOptions {
    pub binary: BinaryMode,
    pub encoding: EncodingMode,
    pub context_before: usize,
    pub context_after: usize,
    /// Maximum number of matching lines reported for one file
    pub max_per_file: Option<usize>,
}

/// What scanning one file produced
#[derive(Debug)]
pub enum ScanOutcome {
    /// Matching lines in line order; may be empty
    Matches(Vec<SearchMatch>),
    /// The file contains NUL bytes and binary files are skipped
    Binary,
}

/// File contents, either owned or memory-mapped
enum FileBytes {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

impl Deref for FileBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            FileBytes::Owned(bytes) => bytes,
            FileBytes::Mapped(mmap) => mmap,
        }
    }
}

/// Decodes bytes into text according to the encoding mode
fn decode_bytes<'a>(
    bytes: &'a [u8],
    path: &Path,
    encoding_mode: EncodingMode,
) -> SearchResult<Cow<'a, str>> {
    match encoding_mode {
        EncodingMode::FailFast => std::str::from_utf8(bytes)
            .map(Cow::Borrowed)
            .map_err(|e| SearchError::encoding_error(path, e)),
        EncodingMode::Lossy => {
            let cow = String::from_utf8_lossy(bytes);
            // If it's Owned, at least one invalid sequence was replaced.
            if let Cow::Owned(_) = cow {
                warn!("Invalid UTF-8 replaced in file: {}", path.display());
            }
            Ok(cow)
        }
    }
}

/// Turns files into per-line match records.
///
/// A scanner holds no per-file state: every call reads its own buffer and
/// builds its own records, so one scanner can serve many workers.
#[derive(Debug, Clone)]
pub struct LineScanner {
    matcher: PatternMatcher,
    options: ScanOptions,
    stats: ScanStats,
}

impl LineScanner {
    pub fn new(matcher: PatternMatcher, options: ScanOptions) -> Self {
        Self::with_stats(matcher, options, ScanStats::new())
    }

    pub fn with_stats(matcher: PatternMatcher, options: ScanOptions, stats: ScanStats) -> Self {
        Self {
            matcher,
            options,
            stats,
        }
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    /// Scans one file.
    ///
    /// `cap` bounds the number of records returned (the per-file cap is
    /// applied on top of it). `stop` is checked before every line; once it
    /// is raised the matches found so far are returned. I/O and decoding
    /// failures are returned as recoverable errors.
    pub fn scan_file(
        &self,
        path: &Path,
        display: &str,
        cap: Option<usize>,
        stop: &AtomicBool,
    ) -> SearchResult<ScanOutcome> {
        trace!("Scanning file: {}", path.display());
        let bytes = self.read_file(path)?;

        if self.options.binary == BinaryMode::Skip && bytes.contains(&0) {
            self.stats.record_binary_skip();
            warn!("Skipping binary file: {}", path.display());
            return Ok(ScanOutcome::Binary);
        }

        let contents = decode_bytes(&bytes, path, self.options.encoding).map_err(|e| {
            self.stats.record_encoding_skip();
            e
        })?;

        let cap = match (cap, self.options.max_per_file) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let mut matches = Vec::new();
        if cap != Some(0) {
            for m in self.scan_text(display, &contents).with_stop(stop) {
                matches.push(m);
                if Some(matches.len()) == cap {
                    break;
                }
            }
        }

        let shown = display;
        trace!("Found {} matching lines in {}", matches.len(), shown);
        Ok(ScanOutcome::Matches(matches))
    }

    /// Lazily matches `text` line by line. Records carry `display` as
    /// their path. The per-file cap is not applied here.
    pub fn scan_text<'a>(&'a self, display: &'a str, text: &'a str) -> LineMatches<'a> {
        LineMatches {
            matcher: &self.matcher,
            display,
            lines: text.lines(),
            line_number: 0,
            before: VecDeque::with_capacity(self.options.context_before),
            context_before: self.options.context_before,
            context_after: self.options.context_after,
            stop: None,
        }
    }

    /// Reads a file with the strategy its size calls for
    fn read_file(&self, path: &Path) -> SearchResult<FileBytes> {
        let file = File::open(path).map_err(|e| SearchError::from_file_io(path, e))?;
        let size = file
            .metadata()
            .map_err(|e| SearchError::from_file_io(path, e))?
            .len();
        self.stats.record_file_read(size);

        if size < SMALL_FILE_THRESHOLD {
            let mut bytes = Vec::with_capacity(size as usize);
            let mut file = file;
            file.read_to_end(&mut bytes)
                .map_err(|e| SearchError::from_file_io(path, e))?;
            Ok(FileBytes::Owned(bytes))
        } else if size >= LARGE_FILE_THRESHOLD {
            // SAFETY: the mapping is read-only and dropped before this scan
            // returns; a concurrent truncation can at worst surface as an
            // I/O fault on this file only.
            let mmap =
                unsafe { Mmap::map(&file) }.map_err(|e| SearchError::from_file_io(path, e))?;
            Ok(FileBytes::Mapped(mmap))
        } else {
            let mut reader = BufReader::with_capacity(BUFFER_CAPACITY, file);
            let mut bytes = Vec::with_capacity(size as usize);
            reader
                .read_to_end(&mut bytes)
                .map_err(|e| SearchError::from_file_io(path, e))?;
            Ok(FileBytes::Owned(bytes))
        }
    }
}

/// Iterator over the matching lines of one text
pub struct LineMatches<'a> {
    matcher: &'a PatternMatcher,
    display: &'a str,
    lines: Lines<'a>,
    line_number: u64,
    before: VecDeque<(u64, &'a str)>,
    context_before: usize,
    context_after: usize,
    stop: Option<&'a AtomicBool>,
}

impl<'a> LineMatches<'a> {
    /// Ends the iteration at the next line boundary once `stop` is raised
    pub fn with_stop(mut self, stop: &'a AtomicBool) -> Self {
        self.stop = Some(stop);
        self
    }

    fn remember(&mut self, line_number: u64, line: &'a str) {
        if self.context_before == 0 {
            return;
        }
        if self.before.len() == self.context_before {
            self.before.pop_front();
        }
        self.before.push_back((line_number, line));
    }

    fn build_match(&self, line_number: u64, line: &str, spans: Vec<(usize, usize)>) -> SearchMatch {
        let submatches = spans
            .into_iter()
            .filter_map(|(start, end)| SearchSubmatch::from_line(line, start, end))
            .collect();

        let context_before = self
            .before
            .iter()
            .map(|&(n, text)| ContextLine {
                line_number: n,
                text: text.to_string(),
            })
            .collect();

        let context_after = self
            .lines
            .clone()
            .take(self.context_after)
            .zip(line_number + 1..)
            .map(|(text, n)| ContextLine {
                line_number: n,
                text: text.to_string(),
            })
            .collect();

        SearchMatch {
            path: self.display.to_string(),
            line_number,
            line_text: line.to_string(),
            submatches,
            context_before,
            context_after,
        }
    }
}

impl<'a> Iterator for LineMatches<'a> {
    type Item = SearchMatch;

    fn next(&mut self) -> Option<SearchMatch> {
        loop {
            if self.stop.is_some_and(|s| s.load(Ordering::Relaxed)) {
                return None;
            }
            let line = self.lines.next()?;
            self.line_number += 1;
            let line_number = self.line_number;

            let spans = self.matcher.find_matches(line);
            if spans.is_empty() {
                self.remember(line_number, line);
                continue;
            }
            let found = self.build_match(line_number, line, spans);
            // A reported line is never repeated as context of the next match
            self.before.clear();
            return Some(found);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::matcher::MatchOptions;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn scanner(patterns: &[&str], options: ScanOptions) -> LineScanner {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        let matcher = PatternMatcher::compile(&patterns, MatchOptions::default()).unwrap();
        LineScanner::new(matcher, options)
    }

    fn matches(outcome: ScanOutcome) -> Vec<SearchMatch> {
        match outcome {
            ScanOutcome::Matches(m) => m,
            ScanOutcome::Binary => panic!("unexpected binary outcome"),
        }
    }

    #[test]
    fn test_submatch_offsets() {
        let s = scanner(&["def"], ScanOptions::default());
        let text = "use x;\n\nfn def_helper() {\n}\n";
        let found: Vec<_> = s.scan_text("src/a.rs", text).collect();
        assert_eq!(found.len(), 1);
        let m = &found[0];
        assert_eq!(m.line_number, 3);
        assert_eq!(m.line_text, "fn def_helper() {");
        assert_eq!(
            m.submatches,
            vec![SearchSubmatch {
                start: 3,
                end: 6,
                text: "def".to_string()
            }]
        );
        assert!(m.is_well_formed());
    }

    #[test]
    fn test_every_occurrence_on_a_line() {
        let s = scanner(&["ab"], ScanOptions::default());
        let found: Vec<_> = s.scan_text("f", "ab ab xab\nnone\n").collect();
        assert_eq!(found.len(), 1);
        let starts: Vec<usize> = found[0].submatches.iter().map(|m| m.start).collect();
        assert_eq!(starts, vec![0, 3, 7]);
    }

    #[test]
    fn test_crlf_terminator_excluded() {
        let s = scanner(&["x$"], ScanOptions::default());
        let found: Vec<_> = s.scan_text("f", "ax\r\nbx\r\n").collect();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].line_text, "ax");
        assert_eq!(found[1].line_number, 2);
    }

    #[test]
    fn test_context_lines() {
        let options = ScanOptions {
            context_before: 2,
            context_after: 1,
            ..Default::default()
        };
        let s = scanner(&["hit"], options);
        let found: Vec<_> = s.scan_text("f", "one\ntwo\nthree\nhit\nfive\nsix\n").collect();
        assert_eq!(found.len(), 1);
        let before: Vec<_> = found[0].context_before.iter().map(|c| c.line_number).collect();
        assert_eq!(before, vec![2, 3]);
        assert_eq!(found[0].context_after.len(), 1);
        assert_eq!(found[0].context_after[0].text, "five");
        assert_eq!(found[0].context_after[0].line_number, 5);
    }

    #[test]
    fn test_context_skips_earlier_matches() {
        let options = ScanOptions {
            context_before: 2,
            ..Default::default()
        };
        let s = scanner(&["hit"], options);
        let found: Vec<_> = s.scan_text("f", "a\nhit1\nhit2\nb\nhit3\n").collect();
        assert_eq!(found.len(), 3);

        let before = |m: &SearchMatch| -> Vec<String> {
            m.context_before.iter().map(|c| c.text.clone()).collect()
        };
        assert_eq!(before(&found[0]), vec!["a"]);
        assert!(found[1].context_before.is_empty());
        assert_eq!(before(&found[2]), vec!["b"]);
        assert_eq!(found[2].context_before[0].line_number, 4);
    }

    #[test]
    fn test_scan_file_and_per_file_cap() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("many.txt");
        let mut file = File::create(&path).unwrap();
        for i in 0..10 {
            writeln!(file, "match {}", i).unwrap();
        }

        let stop = AtomicBool::new(false);
        let s = scanner(&["match"], ScanOptions::default());
        assert_eq!(matches(s.scan_file(&path, "many.txt", None, &stop).unwrap()).len(), 10);
        assert_eq!(matches(s.scan_file(&path, "many.txt", Some(4), &stop).unwrap()).len(), 4);

        let capped = scanner(
            &["match"],
            ScanOptions {
                max_per_file: Some(3),
                ..Default::default()
            },
        );
        let found = matches(capped.scan_file(&path, "many.txt", Some(5), &stop).unwrap());
        assert_eq!(found.len(), 3);
        assert_eq!(found[2].line_number, 3);
    }

    #[test]
    fn test_stop_flag_ends_scan() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "hit\nhit\n").unwrap();
        let stop = AtomicBool::new(true);
        let s = scanner(&["hit"], ScanOptions::default());
        assert!(matches(s.scan_file(&path, "f.txt", None, &stop).unwrap()).is_empty());
    }

    #[test]
    fn test_binary_skipped_by_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        std::fs::write(&path, b"hit\0hit\n").unwrap();
        let stop = AtomicBool::new(false);

        let s = scanner(&["hit"], ScanOptions::default());
        assert!(matches!(
            s.scan_file(&path, "blob.bin", None, &stop).unwrap(),
            ScanOutcome::Binary
        ));
        assert_eq!(s.stats().snapshot().binary_skipped, 1);

        let text = scanner(
            &["hit"],
            ScanOptions {
                binary: BinaryMode::Text,
                ..Default::default()
            },
        );
        let found = matches(text.scan_file(&path, "blob.bin", None, &stop).unwrap());
        assert_eq!(found[0].submatches.len(), 2);
    }

    #[test]
    fn test_invalid_utf8_policies() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("latin1.txt");
        std::fs::write(&path, b"caf\xe9 hit\n").unwrap();
        let stop = AtomicBool::new(false);

        let strict = scanner(&["hit"], ScanOptions::default());
        let err = strict.scan_file(&path, "latin1.txt", None, &stop).unwrap_err();
        assert!(matches!(err, SearchError::EncodingError { .. }));

        let lossy = scanner(
            &["hit"],
            ScanOptions {
                encoding: EncodingMode::Lossy,
                ..Default::default()
            },
        );
        let found = matches(lossy.scan_file(&path, "latin1.txt", None, &stop).unwrap());
        assert_eq!(found.len(), 1);
        assert!(found[0].is_well_formed());
        assert_eq!(found[0].submatches[0].text, "hit");
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        let stop = AtomicBool::new(false);
        let s = scanner(&["x"], ScanOptions::default());
        let err = s
            .scan_file(Path::new("/no/such/file"), "file", None, &stop)
            .unwrap_err();
        assert!(matches!(err, SearchError::FileUnreadable { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_large_file_read_paths() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("large_test.txt");
        let mut file = File::create(&path).unwrap();
        let line = "This is a test line with pattern_123 and another pattern_456\n";
        // ~61 bytes per line, enough to exceed the buffered threshold
        for _ in 0..1000 {
            file.write_all(line.as_bytes()).unwrap();
        }
        drop(file);

        let stop = AtomicBool::new(false);
        let s = scanner(&[r"pattern_\d+"], ScanOptions::default());
        let found = matches(s.scan_file(&path, "large_test.txt", None, &stop).unwrap());
        assert_eq!(found.len(), 1000);
        assert!(found.iter().all(|m| m.submatches.len() == 2));
        assert_eq!(found[999].line_number, 1000);
        assert_eq!(s.stats().snapshot().buffered_reads, 1);
    }
}
