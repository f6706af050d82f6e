//! Vendor format and platform normalization.
//!
//! The storefront reports download formats as free-form labels ("PDF (HD)",
//! ".CBZ", "Download", ...). This module maps those labels onto a small set
//! of canonical tokens used for format-priority filtering, and maps canonical
//! tokens back to file extensions for stable ebook file naming.
//!
//! All functions are pure; unrecognized labels pass through lower-cased
//! rather than failing, so new vendor formats degrade gracefully.

use serde::{Deserialize, Serialize};

/// Canonical ebook formats in the default priority order.
pub const SUPPORTED_FORMATS: [&str; 5] = ["cbz", "epub", "pdf_hd", "pdf", "mobi"];

/// Platforms eligible for general-purchase downloads by default.
pub const SUPPORTED_PLATFORMS: [Platform; 3] = [Platform::Linux, Platform::Mac, Platform::Windows];

/// Maps a vendor format label to its canonical token.
///
/// Matching is case-insensitive. The vendor overloads the literal
/// `"download"` label for several format families; it canonicalizes to
/// `pdf` here, and the item builder rejects the non-PDF cases by URL.
pub fn normalize_format(raw: &str) -> String {
    match raw.to_lowercase().as_str() {
        ".cbz" => "cbz".to_string(),
        "pdf (hq)" | "pdf (hd)" => "pdf_hd".to_string(),
        "download" => "pdf".to_string(),
        other => other.to_string(),
    }
}

/// Returns the file extension (with leading dot) for a canonical format.
///
/// The high-definition PDF format gets a distinct extension so that an
/// item kept in both `pdf` and `pdf_hd` variants never collides on disk.
pub fn extension_for(format: &str) -> String {
    match format.to_lowercase().as_str() {
        "pdf_hd" => ".hd.pdf".to_string(),
        other => format!(".{}", other),
    }
}

/// Download platform as reported by the storefront API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Asmjs,
    Audio,
    Comedy,
    Ebook,
    Linux,
    Mac,
    Video,
    Windows,
    /// Anything the API reports that we do not know about.
    #[serde(other)]
    Other,
}

impl Platform {
    /// Returns the lower-case wire name of the platform.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Asmjs => "asmjs",
            Platform::Audio => "audio",
            Platform::Comedy => "comedy",
            Platform::Ebook => "ebook",
            Platform::Linux => "linux",
            Platform::Mac => "mac",
            Platform::Video => "video",
            Platform::Windows => "windows",
            Platform::Other => "other",
        }
    }

    /// Parses a platform from its wire name (case-insensitive).
    ///
    /// Returns `None` for names outside the known set, unlike serde
    /// deserialization which folds them into [`Platform::Other`].
    pub fn parse(raw: &str) -> Option<Platform> {
        match raw.to_lowercase().as_str() {
            "android" => Some(Platform::Android),
            "asmjs" => Some(Platform::Asmjs),
            "audio" => Some(Platform::Audio),
            "comedy" => Some(Platform::Comedy),
            "ebook" => Some(Platform::Ebook),
            "linux" => Some(Platform::Linux),
            "mac" => Some(Platform::Mac),
            "video" => Some(Platform::Video),
            "windows" => Some(Platform::Windows),
            _ => None,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_format_table() {
        let cases = [
            (".cbz", "cbz"),
            (".CBZ", "cbz"),
            ("PDF (HD)", "pdf_hd"),
            ("PDF (HQ)", "pdf_hd"),
            ("pdf (hd)", "pdf_hd"),
            ("Download", "pdf"),
            ("EPUB", "epub"),
            ("MOBI", "mobi"),
            ("Supplement", "supplement"),
        ];
        for (input, expected) in cases {
            assert_eq!(normalize_format(input), expected, "input: {}", input);
        }
    }

    #[test]
    fn test_extension_for_table() {
        assert_eq!(extension_for("pdf_hd"), ".hd.pdf");
        assert_eq!(extension_for("pdf"), ".pdf");
        assert_eq!(extension_for("cbz"), ".cbz");
        assert_eq!(extension_for("epub"), ".epub");
    }

    #[test]
    fn test_pdf_hd_extension_distinct_from_pdf() {
        assert_ne!(extension_for("pdf_hd"), extension_for("pdf"));
    }

    #[test]
    fn test_platform_parse_roundtrip() {
        for platform in SUPPORTED_PLATFORMS {
            assert_eq!(Platform::parse(platform.as_str()), Some(platform));
        }
        assert_eq!(Platform::parse("EBOOK"), Some(Platform::Ebook));
        assert_eq!(Platform::parse("amiga"), None);
    }

    #[test]
    fn test_platform_serde_wire_names() {
        let platform: Platform = serde_json::from_str("\"ebook\"").unwrap();
        assert_eq!(platform, Platform::Ebook);

        // Unknown wire names fold into Other rather than failing the
        // whole order record.
        let platform: Platform = serde_json::from_str("\"vic20\"").unwrap();
        assert_eq!(platform, Platform::Other);
    }
}
