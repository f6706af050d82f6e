//! Deduplicating filter: raw records in, canonical item list out.
//!
//! Three call sites, one parameterized pipeline:
//! - [`filter_bundles`] handles general purchases with first-seen dedup by
//!   file name or digest pair.
//! - [`filter_ebooks`] handles format-priority selection, keeping one
//!   variant per product according to the user's preference order.
//! - [`filter_catalog`] flattens subscription catalog entries per platform.
//!
//! Output is deterministic and input-order-independent: candidates are
//! sorted on a total key before any first-seen decision is made, and the
//! final list is sorted by display name. Reconciliation depends on this;
//! a reordered API response must never change which files survive.
//!
//! Regardless of the dedup setting, two distinct items resolving to the
//! same destination path is always an anomaly: the first is kept and the
//! loss of the second is logged, never a silent overwrite.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use tracing::{info, warn};

use crate::api::{CatalogEntry, Order};
use crate::app::Options;
use crate::format::{self, Platform};
use crate::item::{self, DownloadInfo};
use crate::totals::Totals;

/// Filters general purchases into the canonical download set.
pub fn filter_bundles(orders: &[Order], options: &Options, totals: &Totals) -> Vec<DownloadInfo> {
    info!(bundles = orders.len(), "Bundles containing downloadable items");

    let mut candidates = Vec::new();
    for order in orders {
        for sub in &order.subproducts {
            for entry in &sub.downloads {
                if !options.platform.contains(&entry.platform) {
                    continue;
                }
                for dl in &entry.download_struct {
                    if let Some(item) = item::from_order_struct(order, sub, dl, options) {
                        totals.add_pre_filtered();
                        candidates.push(item);
                    }
                }
            }
        }
    }

    let kept = dedup_candidates(candidates, options.dedup);
    finish(kept, totals)
}

/// Filters ebook purchases, keeping at most one format variant per product.
///
/// For each product, the user's format preference list is walked in
/// priority order; among candidates of the winning format the newest
/// upload is kept. With dedup disabled every format variant is kept.
pub fn filter_ebooks(orders: &[Order], options: &Options, totals: &Totals) -> Vec<DownloadInfo> {
    info!(bundles = orders.len(), "Bundles containing ebooks");

    // (priority rank, candidate) pairs; rank is the index into the
    // user's format preference list.
    let mut candidates: Vec<(usize, DownloadInfo)> = Vec::new();
    for order in orders {
        for sub in &order.subproducts {
            for entry in &sub.downloads {
                if entry.platform != Platform::Ebook {
                    continue;
                }
                for dl in &entry.download_struct {
                    let Some(name) = dl.name.as_deref() else {
                        continue;
                    };
                    let canonical = format::normalize_format(name);
                    let Some(rank) = options.format.iter().position(|f| *f == canonical) else {
                        continue;
                    };
                    if let Some(item) = item::from_ebook_struct(order, sub, dl, options) {
                        totals.add_pre_filtered();
                        candidates.push((rank, item));
                    }
                }
            }
        }
    }

    // Highest-priority format first, then newest upload, then a stable
    // name order so ties cannot depend on input order.
    candidates.sort_by(|(rank_a, a), (rank_b, b)| {
        (rank_a, Reverse(a.uploaded_at), &a.struct_name, &a.bundle_name).cmp(&(
            rank_b,
            Reverse(b.uploaded_at),
            &b.struct_name,
            &b.bundle_name,
        ))
    });

    let kept = if options.dedup {
        let mut by_machine: HashSet<String> = HashSet::new();
        let mut kept = Vec::new();
        for (_, item) in candidates {
            if by_machine.insert(item.machine_name.clone()) {
                kept.push(item);
            }
        }
        kept
    } else {
        candidates.into_iter().map(|(_, item)| item).collect()
    };

    finish(guard_path_collisions(kept), totals)
}

/// Flattens catalog entries into items, one per requested platform.
pub fn filter_catalog(
    entries: &[CatalogEntry],
    options: &Options,
    totals: &Totals,
) -> Vec<DownloadInfo> {
    info!(entries = entries.len(), "Catalog entries");

    let mut kept = Vec::new();
    for platform in &options.platform {
        for entry in entries {
            if let Some(dl) = entry.downloads.get(platform.as_str()) {
                totals.add_pre_filtered();
                kept.push(item::from_catalog_download(entry, dl, options));
            }
        }
    }

    sort_candidates(&mut kept);
    finish(guard_path_collisions(kept), totals)
}

/// Total pre-sort applied before any first-seen decision, so the kept
/// set cannot depend on API response order.
fn sort_candidates(candidates: &mut [DownloadInfo]) {
    candidates.sort_by(|a, b| {
        (
            &a.item_name,
            &a.bundle_name,
            &a.file_name,
            Reverse(a.uploaded_at),
            &a.struct_name,
            &a.machine_name,
        )
            .cmp(&(
                &b.item_name,
                &b.bundle_name,
                &b.file_name,
                Reverse(b.uploaded_at),
                &b.struct_name,
                &b.machine_name,
            ))
    });
}

/// First-seen dedup for general purchases.
///
/// Two items are duplicates when their file names match, or when both
/// digest pairs are present and equal. Candidates are pre-sorted on a
/// total key so "first seen" does not depend on input order.
fn dedup_candidates(mut candidates: Vec<DownloadInfo>, dedup: bool) -> Vec<DownloadInfo> {
    sort_candidates(&mut candidates);

    let mut by_file_name: HashMap<String, usize> = HashMap::new();
    let mut by_digests: HashMap<(String, String), usize> = HashMap::new();
    let mut kept: Vec<DownloadInfo> = Vec::new();

    for item in candidates {
        if dedup {
            let name_hit = by_file_name.get(&item.file_name);
            let digest_hit = match (&item.sha1, &item.md5) {
                (Some(sha1), Some(md5)) => by_digests.get(&(sha1.clone(), md5.clone())),
                _ => None,
            };
            if let Some(&idx) = name_hit.or(digest_hit) {
                let existing = &kept[idx];
                warn!(
                    file = %item.file_name,
                    bundle = %item.bundle_name,
                    kept_bundle = %existing.bundle_name,
                    kept_file = %existing.file_name,
                    "Potential duplicate purchase"
                );
                continue;
            }
        }

        let idx = kept.len();
        by_file_name.insert(item.file_name.clone(), idx);
        if let (Some(sha1), Some(md5)) = (&item.sha1, &item.md5) {
            by_digests.insert((sha1.clone(), md5.clone()), idx);
        }
        kept.push(item);
    }

    guard_path_collisions(kept)
}

/// Drops later items claiming an already-taken destination path.
fn guard_path_collisions(items: Vec<DownloadInfo>) -> Vec<DownloadInfo> {
    let mut taken: HashSet<PathBuf> = HashSet::new();
    let mut kept = Vec::new();
    for item in items {
        if taken.insert(item.file_path.clone()) {
            kept.push(item);
        } else {
            warn!(
                path = %item.file_path.display(),
                bundle = %item.bundle_name,
                "Destination path collision, keeping first item"
            );
        }
    }
    kept
}

/// Final sort by display name and totals bookkeeping.
fn finish(mut kept: Vec<DownloadInfo>, totals: &Totals) -> Vec<DownloadInfo> {
    kept.sort_by(|a, b| {
        (&a.item_name, &a.file_path).cmp(&(&b.item_name, &b.file_path))
    });
    totals.set_filtered(kept.len() as u64);
    kept
}
