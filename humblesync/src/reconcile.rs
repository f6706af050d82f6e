//! Reconciliation: delete what the canonical set no longer references.
//!
//! Two independent passes. First the download root is walked and every
//! file not claimed by a canonical item (compared by full path,
//! case-insensitively, since the storefront re-cases names freely) is
//! deleted. Then checksum-cache entries without a corresponding item are
//! dropped. A failed deletion is logged and counted against neither pass;
//! reconciliation always runs to the end.
//!
//! The walk skips `.json` files, which keeps the persisted cache and
//! options snapshot out of reach.

use std::collections::HashSet;
use std::path::Path;

use tracing::{info, warn};

use crate::cache::SharedCache;
use crate::fsutil;
use crate::item::DownloadInfo;
use crate::totals::Totals;

/// Result of one reconciliation run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub removed_files: u64,
    pub removed_checksums: u64,
}

/// Brings disk and checksum cache into correspondence with `items`.
pub async fn reconcile(
    items: &[DownloadInfo],
    cache: &SharedCache,
    root: &Path,
    totals: &Totals,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    let keep_paths: HashSet<String> = items
        .iter()
        .map(|item| item.file_path.to_string_lossy().to_lowercase())
        .collect();

    info!("Removing files not in the download set");
    let files = match fsutil::walk_files(root) {
        Ok(files) => files,
        Err(e) => {
            warn!(root = %root.display(), error = %e, "Could not walk download folder");
            Vec::new()
        }
    };
    for path in files {
        if keep_paths.contains(&path.to_string_lossy().to_lowercase()) {
            continue;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(path = %path.display(), "Deleted extra file");
                totals.add_removed_file();
                report.removed_files += 1;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not delete extra file");
            }
        }
    }

    info!("Removing stale checksum cache entries");
    let keep_names: HashSet<String> = items
        .iter()
        .map(|item| item.file_name.to_lowercase())
        .collect();
    let dropped = cache.retain_keys(|key| keep_names.contains(&key.to_lowercase()));
    for key in &dropped {
        info!(file = %key, "Removed checksum from cache");
        totals.add_removed_checksum();
    }
    report.removed_checksums = dropped.len() as u64;

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Checksums;
    use crate::item::test_support::item_with_hashes;
    use tempfile::TempDir;

    fn seed_file(root: &Path, name: &str) {
        std::fs::write(root.join(name), b"data").unwrap();
    }

    fn seed_cache(cache: &SharedCache, name: &str) {
        cache.insert(
            name,
            Checksums {
                sha1: "aa".to_string(),
                md5: "bb".to_string(),
            },
        );
    }

    #[tokio::test]
    async fn test_deletes_exactly_the_orphan() {
        let temp = TempDir::new().unwrap();
        for name in ["a.pdf", "b.pdf", "c.pdf"] {
            seed_file(temp.path(), name);
        }
        let cache = SharedCache::load(temp.path());
        for name in ["a.pdf", "b.pdf", "c.pdf"] {
            seed_cache(&cache, name);
        }

        let items = vec![
            item_with_hashes(temp.path(), "a.pdf", None, None),
            item_with_hashes(temp.path(), "c.pdf", None, None),
        ];

        let totals = Totals::default();
        let report = reconcile(&items, &cache, temp.path(), &totals).await;

        assert_eq!(report.removed_files, 1);
        assert_eq!(report.removed_checksums, 1);
        assert!(!temp.path().join("b.pdf").exists());
        assert!(temp.path().join("a.pdf").exists());
        assert!(temp.path().join("c.pdf").exists());
        assert!(cache.get("b.pdf").is_none());
        assert!(cache.get("a.pdf").is_some());
        assert_eq!(totals.snapshot().removed_files, 1);
        assert_eq!(totals.snapshot().removed_checksums, 1);
    }

    #[tokio::test]
    async fn test_path_matching_is_case_insensitive() {
        let temp = TempDir::new().unwrap();
        seed_file(temp.path(), "Book.PDF");
        let cache = SharedCache::load(temp.path());

        let items = vec![item_with_hashes(temp.path(), "book.pdf", None, None)];
        let report = reconcile(&items, &cache, temp.path(), &Totals::default()).await;

        assert_eq!(report.removed_files, 0);
        assert!(temp.path().join("Book.PDF").exists());
    }

    #[tokio::test]
    async fn test_json_state_files_are_never_touched() {
        let temp = TempDir::new().unwrap();
        seed_file(temp.path(), "checksums.json");
        seed_file(temp.path(), "options.json");
        let cache = SharedCache::load(temp.path());

        let report = reconcile(&[], &cache, temp.path(), &Totals::default()).await;

        assert_eq!(report.removed_files, 0);
        assert!(temp.path().join("checksums.json").exists());
        assert!(temp.path().join("options.json").exists());
    }

    #[tokio::test]
    async fn test_second_run_removes_nothing() {
        let temp = TempDir::new().unwrap();
        seed_file(temp.path(), "keep.pdf");
        seed_file(temp.path(), "drop.pdf");
        let cache = SharedCache::load(temp.path());
        seed_cache(&cache, "drop.pdf");

        let items = vec![item_with_hashes(temp.path(), "keep.pdf", None, None)];
        let first = reconcile(&items, &cache, temp.path(), &Totals::default()).await;
        assert_eq!(first.removed_files, 1);

        let second = reconcile(&items, &cache, temp.path(), &Totals::default()).await;
        assert_eq!(second, ReconcileReport::default());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_undeletable_file_is_skipped_not_fatal() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let locked_dir = temp.path().join("locked");
        std::fs::create_dir(&locked_dir).unwrap();
        seed_file(&locked_dir, "stuck.pdf");
        seed_file(temp.path(), "orphan.pdf");
        // Read-only directory: unlink inside it fails with EACCES.
        std::fs::set_permissions(&locked_dir, std::fs::Permissions::from_mode(0o555)).unwrap();

        let cache = SharedCache::load(temp.path());
        let report = reconcile(&[], &cache, temp.path(), &Totals::default()).await;

        // Restore so TempDir can clean up.
        std::fs::set_permissions(&locked_dir, std::fs::Permissions::from_mode(0o755)).unwrap();

        // The orphan outside the locked directory was removed regardless.
        assert!(!temp.path().join("orphan.pdf").exists());
        if locked_dir.join("stuck.pdf").exists() {
            assert_eq!(report.removed_files, 1);
        } else {
            // Elevated privileges ignore the directory permissions.
            assert_eq!(report.removed_files, 2);
        }
    }
}
