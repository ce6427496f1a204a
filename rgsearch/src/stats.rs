use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::search::scanner::{LARGE_FILE_THRESHOLD, SMALL_FILE_THRESHOLD};

/// Counters shared by every scanner worker of a single search call
#[derive(Debug, Clone, Default)]
pub struct ScanStats {
    files_scanned: Arc<AtomicU64>,
    bytes_scanned: Arc<AtomicU64>,
    binary_skipped: Arc<AtomicU64>,
    encoding_skipped: Arc<AtomicU64>,
    unreadable: Arc<AtomicU64>,

    // Read strategy
    whole_reads: Arc<AtomicU64>,
    buffered_reads: Arc<AtomicU64>,
    mmap_reads: Arc<AtomicU64>,
}

impl ScanStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a file that was read, bucketed by the strategy its size selects
    pub fn record_file_read(&self, size: u64) {
        self.files_scanned.fetch_add(1, Ordering::Relaxed);
        self.bytes_scanned.fetch_add(size, Ordering::Relaxed);
        if size < SMALL_FILE_THRESHOLD {
            self.whole_reads.fetch_add(1, Ordering::Relaxed);
        } else if size >= LARGE_FILE_THRESHOLD {
            self.mmap_reads.fetch_add(1, Ordering::Relaxed);
        } else {
            self.buffered_reads.fetch_add(1, Ordering::Relaxed);
        }
        debug!("Read {} bytes", size);
    }

    pub fn record_binary_skip(&self) {
        self.binary_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_encoding_skip(&self) {
        self.encoding_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unreadable(&self) {
        self.unreadable.fetch_add(1, Ordering::Relaxed);
    }

    /// Gets a point-in-time copy of every counter
    pub fn snapshot(&self) -> ScanStatsSnapshot {
        ScanStatsSnapshot {
            files_scanned: self.files_scanned.load(Ordering::Relaxed),
            bytes_scanned: self.bytes_scanned.load(Ordering::Relaxed),
            binary_skipped: self.binary_skipped.load(Ordering::Relaxed),
            encoding_skipped: self.encoding_skipped.load(Ordering::Relaxed),
            unreadable: self.unreadable.load(Ordering::Relaxed),
            whole_reads: self.whole_reads.load(Ordering::Relaxed),
            buffered_reads: self.buffered_reads.load(Ordering::Relaxed),
            mmap_reads: self.mmap_reads.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.snapshot();
        info!(
            "Scan stats:\n\
             Files scanned: {} ({} bytes)\n\
             Skipped (binary/encoding/unreadable): {}/{}/{}\n\
             Reads (whole/buffered/mmap): {}/{}/{}",
            stats.files_scanned,
            stats.bytes_scanned,
            stats.binary_skipped,
            stats.encoding_skipped,
            stats.unreadable,
            stats.whole_reads,
            stats.buffered_reads,
            stats.mmap_reads
        );
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStatsSnapshot {
    pub files_scanned: u64,
    pub bytes_scanned: u64,
    pub binary_skipped: u64,
    pub encoding_skipped: u64,
    pub unreadable: u64,
    pub whole_reads: u64,
    pub buffered_reads: u64,
    pub mmap_reads: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_read_tracking() {
        let stats = ScanStats::new();

        stats.record_file_read(1000); // Whole read
        stats.record_file_read(100_000); // Buffered
        stats.record_file_read(20_000_000); // Memory mapped

        let snap = stats.snapshot();
        assert_eq!(snap.files_scanned, 3);
        assert_eq!(snap.bytes_scanned, 20_101_000);
        assert_eq!(snap.whole_reads, 1);
        assert_eq!(snap.buffered_reads, 1);
        assert_eq!(snap.mmap_reads, 1);
    }

    #[test]
    fn test_clones_share_counters() {
        let stats = ScanStats::new();
        let worker = stats.clone();
        worker.record_binary_skip();
        worker.record_encoding_skip();
        worker.record_unreadable();

        let snap = stats.snapshot();
        assert_eq!(snap.binary_skipped, 1);
        assert_eq!(snap.encoding_skipped, 1);
        assert_eq!(snap.unreadable, 1);
    }
}
