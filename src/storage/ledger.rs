//! Per-bucket metadata ledger: a durable name -> FileRecord mapping kept
//! consistent with the content directory. Persistence is whole-file rewrite
//! with atomic replace, so readers never observe a half-written ledger.

use std::collections::BTreeMap;
use std::fs;

use tracing::debug;

use crate::error::{AppResult, StoreError};

use super::{FileRecord, FileStore};

impl FileStore {
    /// Load the bucket's ledger. A missing ledger file yields an empty map,
    /// not an error. Entries whose backing file no longer exists in the
    /// content directory are filtered out, never surfaced; the filter is
    /// lazy and side-effect-free so `load` is safe to call concurrently.
    pub fn load_ledger(&self, bucket: &str) -> AppResult<BTreeMap<String, FileRecord>> {
        let mut map = self.ledger_load_raw(bucket)?;
        map.retain(|name, _| {
            self.content_path(bucket, name).map(|p| p.is_file()).unwrap_or(false)
        });
        Ok(map)
    }

    /// Upsert one ledger entry. Serialized with all other mutations on the
    /// same bucket.
    pub fn ledger_put(&self, bucket: &str, name: &str, record: FileRecord) -> AppResult<()> {
        let mutex = self.bucket_mutex(bucket);
        let _guard = mutex.lock();
        self.ledger_put_locked(bucket, name, record)
    }

    /// Remove one ledger entry if present; no-op otherwise.
    pub fn ledger_remove(&self, bucket: &str, name: &str) -> AppResult<()> {
        let mutex = self.bucket_mutex(bucket);
        let _guard = mutex.lock();
        self.ledger_remove_locked(bucket, name)
    }

    /// Discard the whole ledger for a bucket.
    pub fn ledger_clear(&self, bucket: &str) -> AppResult<()> {
        let mutex = self.bucket_mutex(bucket);
        let _guard = mutex.lock();
        self.ledger_clear_locked(bucket)
    }

    /// Read the ledger file as-is, without the existence filter. Internal:
    /// mutators read-modify-write through this so an entry whose file was
    /// removed out-of-band still gets dropped on the next rewrite.
    pub(crate) fn ledger_load_raw(&self, bucket: &str) -> AppResult<BTreeMap<String, FileRecord>> {
        let path = self.ledger_path(bucket)?;
        if !path.is_file() {
            return Ok(BTreeMap::new());
        }
        let text = fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
        let map = serde_json::from_str::<BTreeMap<String, FileRecord>>(&text).map_err(|e| {
            StoreError::io(&path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        Ok(map)
    }

    pub(crate) fn ledger_put_locked(&self, bucket: &str, name: &str, record: FileRecord) -> AppResult<()> {
        let mut map = self.ledger_load_raw(bucket)?;
        map.insert(name.to_string(), record);
        self.ledger_write(bucket, &map)?;
        debug!(target: "filedock::storage", "ledger_put: bucket='{}' name='{}' entries={}", bucket, name, map.len());
        Ok(())
    }

    pub(crate) fn ledger_remove_locked(&self, bucket: &str, name: &str) -> AppResult<()> {
        let mut map = self.ledger_load_raw(bucket)?;
        if map.remove(name).is_some() {
            self.ledger_write(bucket, &map)?;
            debug!(target: "filedock::storage", "ledger_remove: bucket='{}' name='{}' entries={}", bucket, name, map.len());
        }
        Ok(())
    }

    pub(crate) fn ledger_clear_locked(&self, bucket: &str) -> AppResult<()> {
        let path = self.ledger_path(bucket)?;
        if path.is_file() {
            fs::remove_file(&path).map_err(|e| StoreError::io(&path, e))?;
        }
        debug!(target: "filedock::storage", "ledger_clear: bucket='{}'", bucket);
        Ok(())
    }

    /// Persist the full mapping with write-to-temp-then-rename so a crash
    /// mid-write never leaves a truncated ledger visible at the final path.
    fn ledger_write(&self, bucket: &str, map: &BTreeMap<String, FileRecord>) -> AppResult<()> {
        let path = self.ledger_path(bucket)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let tmp = path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(map).map_err(|e| {
            StoreError::io(&path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        fs::write(&tmp, text).map_err(|e| StoreError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| StoreError::io(&path, e))?;
        Ok(())
    }
}
