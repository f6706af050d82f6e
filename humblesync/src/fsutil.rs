//! Filesystem helpers: sanitized file names, tolerant JSON state files,
//! and the download-root walk used by the reconciler and the checksums
//! command.
//!
//! Every path segment that originates from vendor data (bundle names, item
//! names, URL basenames) passes through [`sanitize_file_name`] before it is
//! joined onto the download root. This is a security invariant, not
//! cosmetics: vendor strings must never traverse out of the download folder
//! or produce names the filesystem rejects.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

/// Characters rejected by at least one supported filesystem.
const ILLEGAL_CHARS: [char; 9] = ['/', '\\', '<', '>', ':', '"', '|', '?', '*'];

/// Sanitizes a single path segment for safe joining under the download root.
///
/// Strips path separators, characters illegal on common filesystems, and
/// control characters; trims trailing dots and whitespace; and collapses
/// traversal-only names (`.`, `..`) and empty results to `"_"`.
pub fn sanitize_file_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !ILLEGAL_CHARS.contains(c) && !c.is_control())
        .collect();
    let trimmed = cleaned.trim().trim_end_matches(['.', ' ']);

    if trimmed.is_empty() || trimmed.chars().all(|c| c == '.') {
        return "_".to_string();
    }
    trimmed.to_string()
}

/// Reads a JSON state file, tolerating absence and damage.
///
/// A missing or unparsable file yields `T::default()` so that first runs
/// and corrupted state files both degrade to "empty" rather than failing
/// the whole invocation.
pub fn read_json_file<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(value) => value,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "State file is malformed, treating as empty");
                T::default()
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "State file not found, treating as empty");
            T::default()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read state file, treating as empty");
            T::default()
        }
    }
}

/// Writes a JSON state file, creating its parent folder if needed.
pub fn write_json_file<T>(path: &Path, value: &T) -> io::Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(value).map_err(io::Error::from)?;
    fs::write(path, contents)
}

/// Recursively collects regular files under `root`, skipping symlinks and
/// any `.json` file (the persisted state files live in the download root).
///
/// A missing root yields an empty list; nothing has been downloaded yet.
pub fn walk_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !root.exists() {
        return Ok(files);
    }
    collect_files(root, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            continue;
        }
        if file_type.is_dir() {
            collect_files(&path, files)?;
        } else if path.extension().is_none_or(|ext| ext != "json") {
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_passes_ordinary_names() {
        assert_eq!(sanitize_file_name("book.pdf"), "book.pdf");
        assert_eq!(sanitize_file_name("My Bundle Vol. 2"), "My Bundle Vol. 2");
    }

    #[test]
    fn test_sanitize_strips_separators_and_illegal_chars() {
        assert_eq!(sanitize_file_name("a/b\\c"), "abc");
        assert_eq!(sanitize_file_name("what?.pdf"), "what.pdf");
        assert_eq!(sanitize_file_name("a<b>c:d\"e|f*g"), "abcdefg");
    }

    #[test]
    fn test_sanitize_blocks_traversal() {
        assert_eq!(sanitize_file_name(".."), "_");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "....etcpasswd");
        assert_eq!(sanitize_file_name(""), "_");
        assert_eq!(sanitize_file_name("   "), "_");
    }

    #[test]
    fn test_sanitize_trims_trailing_dots() {
        assert_eq!(sanitize_file_name("name..."), "name");
    }

    #[test]
    fn test_read_json_file_missing_is_empty() {
        let temp = TempDir::new().unwrap();
        let value: HashMap<String, String> = read_json_file(&temp.path().join("missing.json"));
        assert!(value.is_empty());
    }

    #[test]
    fn test_read_json_file_malformed_is_empty() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("bad.json"), "{not json").unwrap();
        let value: HashMap<String, String> = read_json_file(&temp.path().join("bad.json"));
        assert!(value.is_empty());
    }

    #[test]
    fn test_write_then_read_json_file() {
        let temp = TempDir::new().unwrap();
        let folder = temp.path().join("nested");
        let mut value = HashMap::new();
        value.insert("key".to_string(), "value".to_string());

        write_json_file(&folder.join("state.json"), &value).unwrap();
        let loaded: HashMap<String, String> = read_json_file(&folder.join("state.json"));
        assert_eq!(loaded, value);
    }

    #[test]
    fn test_walk_skips_json_and_recurses() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("checksums.json"), "{}").unwrap();
        fs::write(temp.path().join("a.pdf"), b"a").unwrap();
        fs::create_dir_all(temp.path().join("Bundle/Item")).unwrap();
        fs::write(temp.path().join("Bundle/Item/b.epub"), b"b").unwrap();

        let files = walk_files(temp.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|p| p.extension().unwrap() != "json"));
    }

    #[test]
    fn test_walk_missing_root_is_empty() {
        let temp = TempDir::new().unwrap();
        let files = walk_files(&temp.path().join("nope")).unwrap();
        assert!(files.is_empty());
    }
}
