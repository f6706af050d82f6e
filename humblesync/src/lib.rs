//! humblesync - downloader and synchronizer for Humble Bundle purchases.
//!
//! This library contains the full synchronization pipeline: fetching the
//! purchased orders and the subscription catalog from the storefront API,
//! normalizing them into canonical download items, deduplicating across
//! overlapping purchases, downloading missing or changed files with
//! dual-hash integrity verification, and reconciling the local download
//! folder against the filtered set.
//!
//! # Architecture
//!
//! ```text
//! ApiClient ──► raw orders / catalog entries
//!                     │
//!                     ▼
//!          filter (build + dedup + collision guard)
//!                     │
//!                     ▼
//!          Downloader ──► WorkQueues ──► checksum engine
//!                     │                        │
//!                     ▼                        ▼
//!               filesystem ◄──────── SharedCache (checksums.json)
//!                     │
//!                     ▼
//!          reconcile (orphan files, stale cache keys)
//! ```
//!
//! The CLI crate (`humblesync-cli`) owns argument parsing, progress bar
//! rendering, and signal handling; everything here is UI-agnostic and
//! reports progress through the [`progress::ProgressSink`] trait.

pub mod api;
pub mod app;
pub mod cache;
pub mod checksum;
pub mod download;
pub mod filter;
pub mod format;
pub mod fsutil;
pub mod item;
pub mod progress;
pub mod queue;
pub mod reconcile;
pub mod retry;
pub mod totals;

pub use app::{Command, Options, Session, SyncError};
pub use item::DownloadInfo;
pub use totals::{Totals, TotalsSnapshot};
