//! Persistent checksum cache.
//!
//! Hashing a multi-gigabyte library on every run would dominate the total
//! runtime, so digest pairs are remembered across runs in a `checksums.json`
//! file at the download root, keyed by the item's sanitized file name.
//!
//! The in-memory map uses `parking_lot::RwLock`; all operations are short
//! (map lookups and inserts), so the lock is never held across an await
//! point and cannot block the Tokio runtime.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::debug;

use crate::checksum::Checksums;
use crate::fsutil;

/// File name of the persisted cache, relative to the download root.
pub const CHECKSUM_FILE: &str = "checksums.json";

/// Thread-safe checksum cache backed by `checksums.json`.
///
/// Loading is tolerant: a missing or malformed cache file yields an empty
/// cache, never an error. Mutations only touch memory; callers persist
/// explicitly via [`SharedCache::save`] once a run settles.
pub struct SharedCache {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, Checksums>>,
}

impl SharedCache {
    /// Loads the cache from `checksums.json` under `root`.
    pub fn load(root: &Path) -> Self {
        let path = root.join(CHECKSUM_FILE);
        let entries: BTreeMap<String, Checksums> = fsutil::read_json_file(&path);
        debug!(entries = entries.len(), path = %path.display(), "Loaded checksum cache");
        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    /// Looks up the digest pair cached under `file_name`.
    pub fn get(&self, file_name: &str) -> Option<Checksums> {
        self.entries.read().get(file_name).cloned()
    }

    /// Stores a digest pair under `file_name`, replacing any previous entry.
    pub fn insert(&self, file_name: &str, checksums: Checksums) {
        self.entries
            .write()
            .insert(file_name.to_string(), checksums);
    }

    /// Drops the entry for `file_name`. Returns whether an entry existed.
    pub fn remove(&self, file_name: &str) -> bool {
        self.entries.write().remove(file_name).is_some()
    }

    /// Retains only entries whose key satisfies the predicate; returns the
    /// keys that were dropped.
    pub fn retain_keys<F>(&self, mut keep: F) -> Vec<String>
    where
        F: FnMut(&str) -> bool,
    {
        let mut entries = self.entries.write();
        let dropped: Vec<String> = entries
            .keys()
            .filter(|key| !keep(key))
            .cloned()
            .collect();
        for key in &dropped {
            entries.remove(key);
        }
        dropped
    }

    /// Number of cached digest pairs.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when no digest pairs are cached.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Writes the cache back to `checksums.json`.
    pub fn save(&self) -> io::Result<()> {
        let entries = self.entries.read().clone();
        fsutil::write_json_file(&self.path, &entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sums(sha1: &str, md5: &str) -> Checksums {
        Checksums {
            sha1: sha1.to_string(),
            md5: md5.to_string(),
        }
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let temp = TempDir::new().unwrap();
        let cache = SharedCache::load(temp.path());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_malformed_file_loads_empty() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(CHECKSUM_FILE), "{not json").unwrap();
        let cache = SharedCache::load(temp.path());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_roundtrip_through_disk() {
        let temp = TempDir::new().unwrap();
        {
            let cache = SharedCache::load(temp.path());
            cache.insert("book.pdf", sums("aa", "bb"));
            cache.insert("book.epub", sums("cc", "dd"));
            cache.save().unwrap();
        }
        let reloaded = SharedCache::load(temp.path());
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("book.pdf").unwrap().sha1, "aa");
        assert_eq!(reloaded.get("book.epub").unwrap().md5, "dd");
    }

    #[test]
    fn test_insert_replaces() {
        let temp = TempDir::new().unwrap();
        let cache = SharedCache::load(temp.path());
        cache.insert("book.pdf", sums("aa", "bb"));
        cache.insert("book.pdf", sums("ee", "ff"));
        assert_eq!(cache.get("book.pdf").unwrap().sha1, "ee");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove() {
        let temp = TempDir::new().unwrap();
        let cache = SharedCache::load(temp.path());
        cache.insert("book.pdf", sums("aa", "bb"));
        assert!(cache.remove("book.pdf"));
        assert!(!cache.remove("book.pdf"));
        assert!(cache.get("book.pdf").is_none());
    }

    #[test]
    fn test_retain_keys_reports_dropped() {
        let temp = TempDir::new().unwrap();
        let cache = SharedCache::load(temp.path());
        cache.insert("keep.pdf", sums("aa", "bb"));
        cache.insert("drop.pdf", sums("cc", "dd"));
        cache.insert("drop.epub", sums("ee", "ff"));

        let mut dropped = cache.retain_keys(|key| key.starts_with("keep"));
        dropped.sort();
        assert_eq!(dropped, vec!["drop.epub".to_string(), "drop.pdf".to_string()]);
        assert_eq!(cache.len(), 1);
    }
}
