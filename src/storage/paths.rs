use std::path::PathBuf;

use unicode_normalization::UnicodeNormalization;

use crate::error::{AppResult, StoreError};

use super::FileStore;

/// Normalize a UTF-8 string to NFC.
pub fn normalize_nfc(input: &str) -> String {
    input.nfc().collect::<String>()
}

/// Validate and normalize a logical filename (or bucket id) to one safe path
/// segment. Rules:
/// - non-empty, NUL ("\u{0000}") not allowed
/// - no separators ('/' or '\'), so the name cannot address a subdirectory
/// - '.' and '..' are rejected, so the name cannot escape the bucket subtree
/// Returns the NFC-normalized name on success.
pub fn sanitize_name(name: &str) -> AppResult<String> {
    if name.is_empty() {
        return Err(StoreError::InvalidName("name cannot be empty".into()));
    }
    if name.chars().any(|c| c == '\u{0000}') {
        return Err(StoreError::InvalidName("name cannot contain NUL characters".into()));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(StoreError::InvalidName(format!("name cannot contain separators: '{}'", name)));
    }
    if name == "." || name == ".." {
        return Err(StoreError::InvalidName("'.' and '..' are not allowed as names".into()));
    }
    Ok(normalize_nfc(name))
}

/// Validate a relative path from a folder upload and split it into
/// NFC-normalized segments. Both '/' and '\' act as separators since browsers
/// send either. Rules per segment are the same as `sanitize_name`; empty
/// segments (leading/trailing separator or doubled separators) are rejected.
pub fn split_relative_path(path: &str) -> AppResult<Vec<String>> {
    if path.is_empty() {
        return Err(StoreError::InvalidName("relative path cannot be empty".into()));
    }
    let normalized = path.replace('\\', "/");
    if normalized.starts_with('/') || normalized.ends_with('/') {
        return Err(StoreError::InvalidName(format!(
            "leading or trailing separator is not allowed: '{}'",
            path
        )));
    }
    let mut segments: Vec<String> = Vec::new();
    for seg in normalized.split('/') {
        segments.push(sanitize_name(seg)?);
    }
    Ok(segments)
}

impl FileStore {
    /// Directory that owns everything belonging to one bucket. Created lazily
    /// by the operations that need it; resolving never touches the disk.
    pub(crate) fn bucket_dir(&self, bucket: &str) -> AppResult<PathBuf> {
        let b = sanitize_name(bucket)?;
        Ok(self.root.join("buckets").join(b))
    }

    /// Content area holding only the bucket's current files.
    pub(crate) fn content_dir(&self, bucket: &str) -> AppResult<PathBuf> {
        Ok(self.bucket_dir(bucket)?.join("files"))
    }

    /// On-disk location of one current file.
    pub(crate) fn content_path(&self, bucket: &str, name: &str) -> AppResult<PathBuf> {
        let n = sanitize_name(name)?;
        Ok(self.content_dir(bucket)?.join(n))
    }

    /// Per-file history directory holding timestamped archived blobs.
    pub(crate) fn history_dir(&self, bucket: &str, name: &str) -> AppResult<PathBuf> {
        let n = sanitize_name(name)?;
        Ok(self.bucket_dir(bucket)?.join("history").join(n))
    }

    /// The bucket's ledger record file.
    pub(crate) fn ledger_path(&self, bucket: &str) -> AppResult<PathBuf> {
        Ok(self.bucket_dir(bucket)?.join("ledger.json"))
    }

    /// Transient staging area for folder bundling, keyed by bucket. Lives
    /// outside the bucket directory so the content area never sees partial
    /// folder trees.
    pub(crate) fn scratch_dir(&self, bucket: &str) -> AppResult<PathBuf> {
        let b = sanitize_name(bucket)?;
        Ok(self.root.join("scratch").join(b))
    }
}
