//! Ingest pipeline: accepts one or many named byte payloads, archives any
//! current file about to be overwritten, writes content atomically and
//! upserts the ledger. Items are processed independently in input order;
//! a failed item aborts only itself (partial success is the documented
//! behavior, not a bug).

use std::fs;
use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{AppResult, StoreError};

use super::{FileRecord, FileStore};

/// One named payload to ingest.
#[derive(Debug, Clone)]
pub struct IngestItem {
    /// Declared filename; single-file ingestion stores under this name,
    /// overwriting (and archiving) any current file with the same name.
    pub name: String,
    pub bytes: Vec<u8>,
}

/// A per-item failure surfaced in the partial-result report.
#[derive(Debug, Clone, Serialize)]
pub struct FailedItem {
    pub name: String,
    pub code: String,
    pub message: String,
}

/// Outcome of one ingest call: stored names in input order plus the items
/// that failed, with reasons.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub stored: Vec<String>,
    pub failed: Vec<FailedItem>,
}

/// Write bytes to `path` with write-to-temp-then-rename discipline. The temp
/// file lives next to the final path's parent so the rename stays on one
/// filesystem; a crash mid-write never leaves a truncated file visible.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> AppResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::InvalidName(format!("no parent for '{}'", path.display())))?;
    fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| StoreError::InvalidName(format!("no file name in '{}'", path.display())))?
        .to_string_lossy()
        .to_string();
    let tmp = parent.join(format!(".{}.part", file_name));
    fs::write(&tmp, bytes).map_err(|e| StoreError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))?;
    Ok(())
}

impl FileStore {
    /// Ingest a batch of named payloads into a bucket. An empty item list is
    /// a `NoInput` error surfaced to the caller. Each item, independently and
    /// in input order: the current file of the same name (if any) is archived
    /// into history, the payload is written atomically, and a ledger record
    /// `{now, origin}` is upserted. A failure on one item leaves its ledger
    /// entry untouched and the remaining items are still attempted.
    pub fn ingest(&self, bucket: &str, items: Vec<IngestItem>, origin: &str) -> AppResult<IngestReport> {
        if items.is_empty() {
            return Err(StoreError::NoInput("empty upload set".into()));
        }
        let mutex = self.bucket_mutex(bucket);
        let _guard = mutex.lock();

        let mut report = IngestReport::default();
        for item in items {
            match self.ingest_one_locked(bucket, &item.name, &item.bytes, origin) {
                Ok(stored) => report.stored.push(stored),
                Err(e) => {
                    warn!(target: "filedock::storage", "ingest item failed: bucket='{}' name='{}' err={}", bucket, item.name, e);
                    report.failed.push(FailedItem {
                        name: item.name,
                        code: e.code_str().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    /// Archive-overwrite-record for a single payload. Caller must hold the
    /// bucket mutex.
    pub(crate) fn ingest_one_locked(
        &self,
        bucket: &str,
        name: &str,
        bytes: &[u8],
        origin: &str,
    ) -> AppResult<String> {
        let stored = super::paths::sanitize_name(name)?;
        let target = self.content_path(bucket, &stored)?;
        if target.is_file() {
            self.archive_locked(bucket, &stored)?;
        }
        write_atomic(&target, bytes)?;
        self.ledger_put_locked(
            bucket,
            &stored,
            FileRecord { upload_time: Utc::now(), origin: origin.to_string() },
        )?;
        debug!(target: "filedock::storage", "ingest: bucket='{}' name='{}' size={}", bucket, stored, bytes.len());
        Ok(stored)
    }
}
