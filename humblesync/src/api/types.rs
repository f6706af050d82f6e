//! Serde types for the storefront's JSON payloads.
//!
//! The API is generous with fields; these types keep only what the pipeline
//! consumes and let serde drop the rest. Most leaf fields are optional
//! because real payloads omit them freely (a struct may carry only one of
//! its two digests, or no upload date at all).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::format::Platform;

/// One entry of the purchased-orders listing; just the key used to fetch
/// the full order.
#[derive(Debug, Clone, Deserialize)]
pub struct GameKey {
    pub gamekey: String,
}

/// A purchased bundle with all of its sub-products.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub product: Product,
    pub gamekey: String,
    /// Purchase timestamp, used as the fallback upload date for structs
    /// that carry none.
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub subproducts: Vec<SubProduct>,
}

/// Naming information for a bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub human_name: String,
    pub machine_name: String,
}

/// One purchasable product inside a bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubProduct {
    pub human_name: String,
    pub machine_name: String,
    #[serde(default)]
    pub downloads: Vec<DownloadEntry>,
}

/// A platform grouping of download structs for one sub-product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadEntry {
    pub platform: Platform,
    #[serde(default)]
    pub download_struct: Vec<DownloadStruct>,
}

/// One concrete file offering: a format/platform variant with its own URL
/// and digests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadStruct {
    /// Vendor format label, e.g. "PDF (HD)" or ".cbz".
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<WebUrl>,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub md5: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    /// Upload timestamp, ISO-8601 without a timezone suffix.
    #[serde(default)]
    pub uploaded_at: Option<String>,
}

/// Download location pair; only the web URL is used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebUrl {
    pub web: String,
    #[serde(default)]
    pub bittorrent: Option<String>,
}

/// One rotating-subscription catalog entry.
///
/// The catalog API uses kebab-case for its display fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub machine_name: String,
    #[serde(rename = "human-name")]
    pub human_name: String,
    /// Per-platform download records, keyed by platform token.
    #[serde(default)]
    pub downloads: BTreeMap<String, CatalogDownload>,
    /// Seconds since the epoch; last-resort upload date fallback.
    #[serde(rename = "date-added", default)]
    pub date_added: Option<i64>,
}

/// One platform's download record for a catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogDownload {
    pub machine_name: String,
    #[serde(default)]
    pub name: Option<String>,
    pub url: WebUrl,
    /// Milliseconds since the epoch when present.
    #[serde(default)]
    pub uploaded_at: Option<i64>,
    /// Seconds since the epoch; older records carry this instead.
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub md5: Option<String>,
}

/// Response of the signing endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SignedUrl {
    pub signed_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_deserializes_with_unknown_fields() {
        let json = r#"{
            "product": {"human_name": "Book Bundle", "machine_name": "book_bundle", "category": "bundle"},
            "gamekey": "abc123",
            "created": "2023-01-15T10:00:00",
            "uid": "ignored",
            "subproducts": [{
                "human_name": "Some Book",
                "machine_name": "somebook",
                "payee": {"human_name": "P", "machine_name": "p"},
                "downloads": [{
                    "platform": "ebook",
                    "machine_name": "somebook_ebook",
                    "download_struct": [{
                        "name": "PDF",
                        "url": {"web": "https://dl.example.com/somebook.pdf?key=1"},
                        "sha1": "aabb",
                        "file_size": 1048576,
                        "uploaded_at": "2023-01-10T08:30:00.123456"
                    }]
                }]
            }]
        }"#;

        let order: Order = serde_json::from_str(json).unwrap();
        assert_eq!(order.product.human_name, "Book Bundle");
        assert_eq!(order.subproducts.len(), 1);
        let entry = &order.subproducts[0].downloads[0];
        assert_eq!(entry.platform, Platform::Ebook);
        let s = &entry.download_struct[0];
        assert_eq!(s.sha1.as_deref(), Some("aabb"));
        assert!(s.md5.is_none());
        assert_eq!(s.file_size, Some(1048576));
    }

    #[test]
    fn test_unknown_platform_maps_to_other() {
        let json = r#"{"platform": "vr-headset", "download_struct": []}"#;
        let entry: DownloadEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.platform, Platform::Other);
    }

    #[test]
    fn test_catalog_entry_kebab_case() {
        let json = r#"{
            "machine_name": "fun_game",
            "human-name": "Fun Game",
            "date-added": 1600000000,
            "downloads": {
                "linux": {
                    "machine_name": "fun_game_linux",
                    "name": "Download",
                    "url": {"web": "fun_game.tar.gz"},
                    "timestamp": 1599990000,
                    "md5": "ccdd"
                }
            }
        }"#;

        let entry: CatalogEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.human_name, "Fun Game");
        assert_eq!(entry.date_added, Some(1600000000));
        let dl = entry.downloads.get("linux").unwrap();
        assert_eq!(dl.timestamp, Some(1599990000));
        assert!(dl.uploaded_at.is_none());
    }
}
