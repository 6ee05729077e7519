//!
//! filedock storage module
//! -----------------------
//! This module implements the on-disk versioned file store. Each bucket is an
//! isolated namespace under the store root with a simple layout:
//!
//! `buckets/<bucket>/files/<name>`          current file content
//! `buckets/<bucket>/ledger.json`           name -> upload record mapping
//! `buckets/<bucket>/history/<name>/<tag>`  archived historical blobs
//! `scratch/<bucket>/`                      transient staging for folder bundles
//!
//! Key responsibilities:
//! - Ingesting uploads with archive-before-overwrite versioning.
//! - A durable per-bucket ledger kept consistent with the content directory.
//! - Folder bundling into a single zip artifact and batch zip export.
//! - Per-bucket serialization of all mutating operations.
//!
//! The public API centers around the `FileStore` type, which is cheap to clone
//! and shares one bucket-lock registry across all handles.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppResult, StoreError};

mod paths;
pub mod ledger;
pub mod versions;
pub mod ingest;
pub mod bundle;
pub mod export;

pub use ingest::{FailedItem, IngestItem, IngestReport};
pub use bundle::BundleItem;
pub use export::ExportResult;
pub use versions::VersionEntry;

/// Upload record for one currently present file. A record exists in the
/// ledger if and only if its file exists in the content directory; `load`
/// filters out entries whose backing file was removed out-of-band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// When the current content of this file was written.
    pub upload_time: DateTime<Utc>,
    /// Peer address the upload (or restore) came from.
    pub origin: String,
}

/// Registry of per-bucket mutexes. Every mutating operation on a bucket runs
/// under that bucket's mutex so concurrent mutations apply as a linear
/// sequence; different buckets are fully independent.
#[derive(Clone)]
pub(crate) struct BucketLocks {
    inner: Arc<RwLock<HashMap<String, Arc<Mutex<()>>>>>,
}

impl BucketLocks {
    fn new() -> Self {
        Self { inner: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub(crate) fn for_bucket(&self, bucket: &str) -> Arc<Mutex<()>> {
        // Fast path read
        if let Some(m) = self.inner.read().get(bucket).cloned() {
            return m;
        }
        let mut w = self.inner.write();
        w.entry(bucket.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

/// Core on-disk store handle for all buckets under one root folder.
///
/// FileStore exposes methods to ingest uploads (archiving any file that is
/// about to be overwritten), bundle folder trees into zip artifacts, list and
/// restore historical versions, export selections as zip, and delete or clear
/// current content. Buckets are created lazily on first access and are never
/// destroyed; `clear` only empties content.
#[derive(Clone)]
pub struct FileStore {
    /// Root folder for all buckets and staging areas.
    root: PathBuf,
    locks: BucketLocks,
}

impl FileStore {
    /// Create a new FileStore rooted at the given filesystem path.
    /// The directory is created if it does not already exist.
    pub fn new<P: AsRef<Path>>(root: P) -> AppResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| StoreError::io(&root, e))?;
        Ok(Self { root, locks: BucketLocks::new() })
    }

    /// Return the configured root folder for this store.
    pub fn root_path(&self) -> &PathBuf {
        &self.root
    }

    pub(crate) fn bucket_mutex(&self, bucket: &str) -> Arc<Mutex<()>> {
        self.locks.for_bucket(bucket)
    }

    /// Read the current bytes of a file. `NotFound` when the bucket has no
    /// current file under that name.
    pub fn read_file(&self, bucket: &str, name: &str) -> AppResult<Vec<u8>> {
        let path = self.content_path(bucket, name)?;
        if !path.is_file() {
            return Err(StoreError::NotFound(format!("{}/{}", bucket, name)));
        }
        fs::read(&path).map_err(|e| StoreError::io(&path, e))
    }

    /// Delete one current file: its bytes move into the version history
    /// before the ledger entry is pruned, so a deletion is recoverable via
    /// `restore`. `NotFound` when no current file exists under `name`.
    pub fn delete(&self, bucket: &str, name: &str) -> AppResult<()> {
        let mutex = self.bucket_mutex(bucket);
        let _guard = mutex.lock();
        let path = self.content_path(bucket, name)?;
        if !path.is_file() {
            return Err(StoreError::NotFound(format!("{}/{}", bucket, name)));
        }
        let tag = self.archive_locked(bucket, name)?;
        self.ledger_remove_locked(bucket, name)?;
        debug!(target: "filedock::storage", "delete: bucket='{}' name='{}' archived_tag={:?}", bucket, name, tag);
        Ok(())
    }

    /// Discard all current files of a bucket and its ledger. Each file is
    /// archived into history first, so a clear is recoverable per file. The
    /// bucket identity and its history survive. Returns the number of files
    /// removed from the content directory.
    pub fn clear(&self, bucket: &str) -> AppResult<usize> {
        let mutex = self.bucket_mutex(bucket);
        let _guard = mutex.lock();
        let dir = self.content_dir(bucket)?;
        let mut removed = 0usize;
        if dir.is_dir() {
            let mut files: Vec<(PathBuf, String)> = Vec::new();
            for entry in fs::read_dir(&dir).map_err(|e| StoreError::io(&dir, e))? {
                let entry = entry.map_err(|e| StoreError::io(&dir, e))?;
                if entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                    files.push((entry.path(), entry.file_name().to_string_lossy().to_string()));
                }
            }
            files.sort_by(|a, b| a.1.cmp(&b.1));
            for (path, name) in files {
                if self.archive_locked(bucket, &name)?.is_some() {
                    removed += 1;
                } else {
                    // The lossy name did not resolve back to this entry (a
                    // non-UTF-8 filename dropped in out-of-band). It cannot be
                    // archived under a usable name, but content must still end
                    // up empty, so remove it directly.
                    fs::remove_file(&path).map_err(|e| StoreError::io(&path, e))?;
                    removed += 1;
                }
            }
        }
        self.ledger_clear_locked(bucket)?;
        debug!(target: "filedock::storage", "clear: bucket='{}' removed={}", bucket, removed);
        Ok(removed)
    }
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod storage_tests;
