//! Run configuration and the persisted options snapshot.
//!
//! [`Options`] is the validated configuration the whole run reads from.
//! A subset of it (everything except the auth token and the download
//! folder itself) is snapshotted to `options.json` inside the download
//! root, so the next run can detect settings drift. Detecting and
//! prompting about drift is the CLI's job; this module only loads, diffs,
//! and saves.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::format::{Platform, SUPPORTED_FORMATS, SUPPORTED_PLATFORMS};
use crate::fsutil;

/// File name of the options snapshot, relative to the download root.
pub const OPTIONS_FILE: &str = "options.json";

/// Validation errors for run configuration.
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("unsupported format {0:?}, supported formats are {}", SUPPORTED_FORMATS.join(", "))]
    UnsupportedFormat(String),

    #[error("no download formats selected")]
    NoFormats,

    #[error("no platforms selected")]
    NoPlatforms,

    #[error("download folder is not set")]
    MissingDownloadFolder,

    #[error("auth token is not set")]
    MissingAuthToken,
}

/// Validated configuration for one run.
#[derive(Debug, Clone)]
pub struct Options {
    /// Keep only one item per identity across overlapping purchases.
    pub dedup: bool,
    /// Group downloads under a per-bundle directory.
    pub bundle_folders: bool,
    /// Concurrency bound for the check and download queues.
    pub parallel: usize,
    /// Canonical format tokens in preference order.
    pub format: Vec<String>,
    /// Platforms eligible for download.
    pub platform: Vec<Platform>,
    /// Session cookie value.
    pub auth_token: String,
    /// Root directory all downloads land under.
    pub download_folder: PathBuf,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dedup: true,
            bundle_folders: true,
            parallel: 1,
            format: SUPPORTED_FORMATS.iter().map(|s| s.to_string()).collect(),
            platform: SUPPORTED_PLATFORMS.to_vec(),
            auth_token: String::new(),
            download_folder: PathBuf::new(),
        }
    }
}

impl Options {
    /// Checks invariants the rest of the run assumes.
    ///
    /// `needs_auth` is false for commands that never talk to the API.
    pub fn validate(&self, needs_auth: bool) -> Result<(), OptionsError> {
        if self.download_folder.as_os_str().is_empty() {
            return Err(OptionsError::MissingDownloadFolder);
        }
        if needs_auth && self.auth_token.trim().is_empty() {
            return Err(OptionsError::MissingAuthToken);
        }
        if self.format.is_empty() {
            return Err(OptionsError::NoFormats);
        }
        if self.platform.is_empty() {
            return Err(OptionsError::NoPlatforms);
        }
        for format in &self.format {
            if !SUPPORTED_FORMATS.contains(&format.as_str()) {
                return Err(OptionsError::UnsupportedFormat(format.clone()));
            }
        }
        Ok(())
    }

    /// The persistable subset of these options.
    pub fn snapshot(&self) -> SavedOptions {
        SavedOptions {
            dedup: self.dedup,
            bundle_folders: self.bundle_folders,
            parallel: self.parallel,
            format: self.format.clone(),
            platform: self
                .platform
                .iter()
                .map(|p| p.as_str().to_string())
                .collect(),
        }
    }
}

/// The options subset persisted in `options.json`.
///
/// The auth token never touches disk, and the download folder is implied
/// by where the file lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedOptions {
    pub dedup: bool,
    pub bundle_folders: bool,
    pub parallel: usize,
    pub format: Vec<String>,
    pub platform: Vec<String>,
}

/// One setting that differs between the saved snapshot and the current
/// run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionDiff {
    pub name: &'static str,
    pub saved: String,
    pub current: String,
}

impl SavedOptions {
    /// Loads the snapshot from the download root. First run (no file) or
    /// a malformed file yields `None`.
    pub fn load(root: &Path) -> Option<SavedOptions> {
        let value: serde_json::Value = fsutil::read_json_file(&root.join(OPTIONS_FILE));
        serde_json::from_value(value).ok()
    }

    /// Writes the snapshot into the download root.
    pub fn save(&self, root: &Path) -> io::Result<()> {
        fsutil::write_json_file(&root.join(OPTIONS_FILE), self)
    }

    /// Settings that changed since this snapshot was taken.
    pub fn diff(&self, current: &SavedOptions) -> Vec<OptionDiff> {
        let mut diffs = Vec::new();
        let mut push = |name: &'static str, saved: String, now: String| {
            if saved != now {
                diffs.push(OptionDiff {
                    name,
                    saved,
                    current: now,
                });
            }
        };
        push("dedup", self.dedup.to_string(), current.dedup.to_string());
        push(
            "bundleFolders",
            self.bundle_folders.to_string(),
            current.bundle_folders.to_string(),
        );
        push(
            "parallel",
            self.parallel.to_string(),
            current.parallel.to_string(),
        );
        push("format", self.format.join(","), current.format.join(","));
        push(
            "platform",
            self.platform.join(","),
            current.platform.join(","),
        );
        diffs
    }
}
