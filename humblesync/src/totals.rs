//! Run counters for end-of-run reporting.
//!
//! [`Totals`] uses lock-free atomic counters so every queue task can record
//! events without coordination; [`TotalsSnapshot`] is the point-in-time copy
//! handed to callers for display and to tests for exact assertions. The
//! counters are pure observability - no correctness decision reads them.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Shared atomic counters for one synchronization run.
#[derive(Debug, Default)]
pub struct Totals {
    bundles: AtomicU64,
    checksums_loaded: AtomicU64,
    checksums_computed: AtomicU64,
    pre_filtered: AtomicU64,
    filtered: AtomicU64,
    removed_files: AtomicU64,
    removed_checksums: AtomicU64,
    downloads_started: AtomicU64,
    downloads_done: AtomicU64,
}

impl Totals {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_bundles(&self, count: u64) {
        self.bundles.store(count, Ordering::SeqCst);
    }

    pub fn set_checksums_loaded(&self, count: u64) {
        self.checksums_loaded.store(count, Ordering::SeqCst);
    }

    pub fn add_checksum_computed(&self) {
        self.checksums_computed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn add_pre_filtered(&self) {
        self.pre_filtered.fetch_add(1, Ordering::SeqCst);
    }

    pub fn set_filtered(&self, count: u64) {
        self.filtered.store(count, Ordering::SeqCst);
    }

    pub fn add_removed_file(&self) {
        self.removed_files.fetch_add(1, Ordering::SeqCst);
    }

    pub fn add_removed_checksum(&self) {
        self.removed_checksums.fetch_add(1, Ordering::SeqCst);
    }

    pub fn add_download_started(&self) {
        self.downloads_started.fetch_add(1, Ordering::SeqCst);
    }

    pub fn add_download_done(&self) {
        self.downloads_done.fetch_add(1, Ordering::SeqCst);
    }

    /// Takes a point-in-time copy of all counters.
    pub fn snapshot(&self) -> TotalsSnapshot {
        TotalsSnapshot {
            bundles: self.bundles.load(Ordering::SeqCst),
            checksums_loaded: self.checksums_loaded.load(Ordering::SeqCst),
            checksums_computed: self.checksums_computed.load(Ordering::SeqCst),
            pre_filtered: self.pre_filtered.load(Ordering::SeqCst),
            filtered: self.filtered.load(Ordering::SeqCst),
            removed_files: self.removed_files.load(Ordering::SeqCst),
            removed_checksums: self.removed_checksums.load(Ordering::SeqCst),
            downloads_started: self.downloads_started.load(Ordering::SeqCst),
            downloads_done: self.downloads_done.load(Ordering::SeqCst),
        }
    }
}

/// Point-in-time copy of [`Totals`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TotalsSnapshot {
    pub bundles: u64,
    pub checksums_loaded: u64,
    pub checksums_computed: u64,
    pub pre_filtered: u64,
    pub filtered: u64,
    pub removed_files: u64,
    pub removed_checksums: u64,
    pub downloads_started: u64,
    pub downloads_done: u64,
}

impl std::fmt::Display for TotalsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "bundles: {}, items: {}/{} (kept/seen), downloads: {}/{} (done/started), \
             checksums: {} computed ({} loaded), removed: {} files, {} checksums",
            self.bundles,
            self.filtered,
            self.pre_filtered,
            self.downloads_done,
            self.downloads_started,
            self.checksums_computed,
            self.checksums_loaded,
            self.removed_files,
            self.removed_checksums,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_start_at_zero() {
        let totals = Totals::new();
        assert_eq!(totals.snapshot(), TotalsSnapshot::default());
    }

    #[test]
    fn test_totals_accumulate() {
        let totals = Totals::new();
        totals.set_bundles(3);
        totals.add_pre_filtered();
        totals.add_pre_filtered();
        totals.set_filtered(1);
        totals.add_download_started();
        totals.add_download_done();
        totals.add_removed_file();
        totals.add_removed_checksum();
        totals.add_checksum_computed();

        let snapshot = totals.snapshot();
        assert_eq!(snapshot.bundles, 3);
        assert_eq!(snapshot.pre_filtered, 2);
        assert_eq!(snapshot.filtered, 1);
        assert_eq!(snapshot.downloads_started, 1);
        assert_eq!(snapshot.downloads_done, 1);
        assert_eq!(snapshot.removed_files, 1);
        assert_eq!(snapshot.removed_checksums, 1);
        assert_eq!(snapshot.checksums_computed, 1);
    }

    #[test]
    fn test_snapshot_display_names_all_counts() {
        let totals = Totals::new();
        totals.set_bundles(2);
        let line = totals.snapshot().to_string();
        assert!(line.contains("bundles: 2"));
        assert!(line.contains("removed"));
    }
}
