//! Canonical download items.
//!
//! Raw order and catalog records arrive in wildly different shapes; this
//! module folds one record into a [`DownloadInfo`], the single normalized
//! representation the rest of the pipeline works with. Items are built once
//! and never mutated; the filter replaces an item by removing and
//! re-inserting, not by editing in place.
//!
//! Path construction is security-relevant: every segment that originates in
//! vendor data is run through [`fsutil::sanitize_file_name`] before joining,
//! so a hostile record cannot escape the download root.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Url;

use crate::api::{CatalogDownload, CatalogEntry, DownloadStruct, Order, SubProduct};
use crate::app::Options;
use crate::checksum::Checksums;
use crate::format;
use crate::fsutil;

/// Where the bytes for an item come from.
///
/// Order items carry a stable direct URL. Catalog items only carry a file
/// reference; the real URL is signed just in time because signed URLs
/// expire between enumeration and transfer.
#[derive(Debug, Clone)]
pub enum Source {
    Direct(Url),
    Signed {
        machine_name: String,
        file_name: String,
    },
}

/// One file to be materialized locally.
#[derive(Debug, Clone)]
pub struct DownloadInfo {
    /// Human-readable parent collection name.
    pub bundle_name: String,
    /// Human-readable product name.
    pub item_name: String,
    /// Vendor-stable product identifier; the dedup identity for
    /// format-priority filtering.
    pub machine_name: String,
    /// Sanitized leaf name; also the checksum-cache key.
    pub file_name: String,
    /// Destination directory.
    pub download_path: PathBuf,
    /// Always `download_path.join(file_name)`.
    pub file_path: PathBuf,
    pub source: Source,
    pub sha1: Option<String>,
    pub md5: Option<String>,
    /// Vendor-reported format label, used for tie-breaking.
    pub struct_name: String,
    pub uploaded_at: DateTime<Utc>,
    /// Fallback size when the transport sends no content length.
    pub expected_size: Option<u64>,
}

impl DownloadInfo {
    /// Whether a computed digest pair satisfies this item's vendor digests.
    ///
    /// Either algorithm matching suffices; records often carry only one.
    /// An item without any vendor digest is unverifiable and never matches.
    pub fn matches_checksums(&self, computed: &Checksums) -> bool {
        let matches = |expected: &Option<String>, actual: &str| {
            expected
                .as_deref()
                .is_some_and(|e| e.eq_ignore_ascii_case(actual))
        };
        matches(&self.sha1, &computed.sha1) || matches(&self.md5, &computed.md5)
    }

    /// True when neither vendor digest is present.
    pub fn is_unverifiable(&self) -> bool {
        self.sha1.is_none() && self.md5.is_none()
    }
}

/// Builds an item from a general-purchase download struct.
///
/// Returns `None` when the struct has no usable web URL (external links and
/// stream-only entries).
pub fn from_order_struct(
    order: &Order,
    sub: &SubProduct,
    dl: &DownloadStruct,
    options: &Options,
) -> Option<DownloadInfo> {
    let web = dl.url.as_ref()?.web.as_str();
    let url = Url::parse(web).ok()?;
    let file_name = fsutil::sanitize_file_name(&url_basename(&url));

    let (download_path, file_path) = destination(order, sub, &file_name, options);

    Some(DownloadInfo {
        bundle_name: order.product.human_name.clone(),
        item_name: sub.human_name.clone(),
        machine_name: sub.machine_name.clone(),
        struct_name: dl.name.clone().unwrap_or_else(|| file_name.clone()),
        file_name,
        download_path,
        file_path,
        source: Source::Direct(url),
        sha1: dl.sha1.clone(),
        md5: dl.md5.clone(),
        uploaded_at: struct_date(dl, order),
        expected_size: dl.file_size,
    })
}

/// Builds an item from an ebook download struct in a specific canonical
/// format.
///
/// The file name is composed from the machine name plus the format's
/// extension rather than taken from the URL, so re-uploads of the same
/// logical book under a different vendor filename keep one stable local
/// name.
///
/// Returns `None` when the struct has no name or URL, or when the vendor's
/// "download" sentinel label points at something other than a PDF (the
/// label is overloaded; only the PDF case is a real file).
pub fn from_ebook_struct(
    order: &Order,
    sub: &SubProduct,
    dl: &DownloadStruct,
    options: &Options,
) -> Option<DownloadInfo> {
    let name = dl.name.as_deref()?;
    let web = dl.url.as_ref()?.web.as_str();
    if name.eq_ignore_ascii_case("download") && !web.to_lowercase().contains(".pdf") {
        return None;
    }
    let url = Url::parse(web).ok()?;

    let canonical = format::normalize_format(name);
    let file_name = fsutil::sanitize_file_name(&format!(
        "{}{}",
        sub.machine_name,
        format::extension_for(&canonical)
    ));

    let (download_path, file_path) = destination(order, sub, &file_name, options);

    Some(DownloadInfo {
        bundle_name: order.product.human_name.clone(),
        item_name: sub.human_name.clone(),
        machine_name: sub.machine_name.clone(),
        struct_name: name.to_string(),
        file_name,
        download_path,
        file_path,
        source: Source::Direct(url),
        sha1: dl.sha1.clone(),
        md5: dl.md5.clone(),
        uploaded_at: struct_date(dl, order),
        expected_size: dl.file_size,
    })
}

/// Builds an item from one platform's catalog download record.
///
/// The source stays unresolved; the downloader signs a fresh URL per
/// attempt.
pub fn from_catalog_download(
    entry: &CatalogEntry,
    dl: &CatalogDownload,
    options: &Options,
) -> DownloadInfo {
    let file_name = fsutil::sanitize_file_name(&web_basename(&dl.url.web));
    let download_path = options
        .download_folder
        .join(fsutil::sanitize_file_name(&entry.human_name));
    let file_path = download_path.join(&file_name);

    DownloadInfo {
        bundle_name: entry.human_name.clone(),
        item_name: entry.human_name.clone(),
        machine_name: dl.machine_name.clone(),
        struct_name: dl.name.clone().unwrap_or_else(|| file_name.clone()),
        source: Source::Signed {
            machine_name: dl.machine_name.clone(),
            file_name: dl.url.web.clone(),
        },
        file_name,
        download_path,
        file_path,
        sha1: dl.sha1.clone(),
        md5: dl.md5.clone(),
        uploaded_at: catalog_date(entry, dl),
        expected_size: dl.file_size,
    }
}

fn destination(
    order: &Order,
    sub: &SubProduct,
    file_name: &str,
    options: &Options,
) -> (PathBuf, PathBuf) {
    let mut download_path = options.download_folder.clone();
    if options.bundle_folders {
        download_path.push(fsutil::sanitize_file_name(&order.product.human_name));
    }
    download_path.push(fsutil::sanitize_file_name(&sub.human_name));
    let file_path = download_path.join(file_name);
    (download_path, file_path)
}

/// Upload date of a struct, falling back to the order's purchase date and
/// finally the epoch.
fn struct_date(dl: &DownloadStruct, order: &Order) -> DateTime<Utc> {
    dl.uploaded_at
        .as_deref()
        .and_then(parse_timestamp)
        .or_else(|| order.created.as_deref().and_then(parse_timestamp))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Upload date of a catalog record. Newer records carry millisecond
/// `uploaded_at`, older ones a seconds `timestamp`; the entry's own
/// added date is the last resort.
fn catalog_date(entry: &CatalogEntry, dl: &CatalogDownload) -> DateTime<Utc> {
    dl.uploaded_at
        .and_then(|ms| DateTime::from_timestamp_millis(ms))
        .or_else(|| dl.timestamp.and_then(|s| DateTime::from_timestamp(s, 0)))
        .or_else(|| entry.date_added.and_then(|s| DateTime::from_timestamp(s, 0)))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parses the API's ISO-8601 timestamps, which come without a timezone
/// suffix. RFC 3339 is accepted too in case the API grows one.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        })
}

/// Last path segment of a parsed URL, without query or fragment.
fn url_basename(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .unwrap_or("download")
        .to_string()
}

/// Last segment of a raw file reference, which may be a bare file name or
/// a full URL.
fn web_basename(web: &str) -> String {
    let without_query = web.split(['?', '#']).next().unwrap_or(web);
    without_query
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("download")
        .to_string()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::path::Path;

    /// Builds a minimal item pointing at `dir/file_name` with the given
    /// vendor digests.
    pub(crate) fn item_with_hashes(
        dir: &Path,
        file_name: &str,
        sha1: Option<&str>,
        md5: Option<&str>,
    ) -> DownloadInfo {
        DownloadInfo {
            bundle_name: "Test Bundle".to_string(),
            item_name: file_name.to_string(),
            machine_name: file_name.replace('.', "_"),
            file_name: file_name.to_string(),
            download_path: dir.to_path_buf(),
            file_path: dir.join(file_name),
            source: Source::Direct(Url::parse("https://dl.example.com/x").unwrap()),
            sha1: sha1.map(str::to_string),
            md5: md5.map(str::to_string),
            struct_name: file_name.to_string(),
            uploaded_at: DateTime::UNIX_EPOCH,
            expected_size: None,
        }
    }
}
