//! Version archive: on overwrite or delete, the current blob of a file moves
//! into a per-file history directory under a second-resolution timestamp tag.
//! Entries are append-only; the only removal path is `restore`, which moves a
//! blob back out to the content directory.

use std::fs;

use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::{AppResult, StoreError};

use super::{FileRecord, FileStore};

/// Timestamp layout for version tags, second resolution. Same-second
/// collisions get a `_<n>` suffix so no archive operation can overwrite an
/// earlier blob.
const TAG_FORMAT: &str = "%Y%m%d_%H%M%S";
const TAG_BASE_LEN: usize = 15;

/// One historical entry for a filename.
#[derive(Debug, Clone, Serialize)]
pub struct VersionEntry {
    /// The filename this entry is a prior version of.
    pub name: String,
    /// Timestamp tag (plus disambiguator) identifying the entry.
    pub tag: String,
    /// Size of the archived blob in bytes.
    pub size: u64,
}

/// Split a tag into its parseable timestamp base and disambiguator sequence.
/// Unparseable tags sort oldest so foreign files in a history directory never
/// shadow real versions.
fn tag_sort_key(tag: &str) -> (NaiveDateTime, u32) {
    let epoch = NaiveDateTime::UNIX_EPOCH;
    // get() also refuses names where a multibyte character straddles the
    // slice point; plain byte-slicing would panic on those.
    let base_str = match tag.get(..TAG_BASE_LEN) {
        Some(s) => s,
        None => return (epoch, 0),
    };
    let base = match NaiveDateTime::parse_from_str(base_str, TAG_FORMAT) {
        Ok(dt) => dt,
        Err(_) => return (epoch, 0),
    };
    let seq = tag[TAG_BASE_LEN..]
        .strip_prefix('_')
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(0);
    (base, seq)
}

impl FileStore {
    /// Archive the current file for `name`: move its bytes into a freshly
    /// tagged history entry, leaving no file at the current path. Returns the
    /// new tag, or None (no-op) when no current file exists; a first upload
    /// of a name is never archived.
    pub fn archive(&self, bucket: &str, name: &str) -> AppResult<Option<String>> {
        let mutex = self.bucket_mutex(bucket);
        let _guard = mutex.lock();
        self.archive_locked(bucket, name)
    }

    pub(crate) fn archive_locked(&self, bucket: &str, name: &str) -> AppResult<Option<String>> {
        let current = self.content_path(bucket, name)?;
        if !current.is_file() {
            return Ok(None);
        }
        let dir = self.history_dir(bucket, name)?;
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        // Pick the first free tag for this second; the suffix counter keeps
        // two archives of the same file within one second from colliding.
        let base = Utc::now().format(TAG_FORMAT).to_string();
        let mut tag = base.clone();
        let mut seq = 1u32;
        while dir.join(&tag).exists() {
            tag = format!("{}_{}", base, seq);
            seq += 1;
        }
        let dest = dir.join(&tag);
        fs::rename(&current, &dest).map_err(|e| StoreError::io(&dest, e))?;
        debug!(target: "filedock::storage", "archive: bucket='{}' name='{}' tag='{}'", bucket, name, tag);
        Ok(Some(tag))
    }

    /// List the historical entries for a filename, newest first. An empty
    /// sequence (not an error) when no history exists.
    pub fn list_versions(&self, bucket: &str, name: &str) -> AppResult<Vec<VersionEntry>> {
        let dir = self.history_dir(bucket, name)?;
        let mut out: Vec<VersionEntry> = Vec::new();
        if dir.is_dir() {
            for entry in fs::read_dir(&dir).map_err(|e| StoreError::io(&dir, e))? {
                let entry = entry.map_err(|e| StoreError::io(&dir, e))?;
                if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                    continue;
                }
                let tag = entry.file_name().to_string_lossy().to_string();
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                out.push(VersionEntry { name: name.to_string(), tag, size });
            }
        }
        out.sort_by(|a, b| tag_sort_key(&b.tag).cmp(&tag_sort_key(&a.tag)));
        Ok(out)
    }

    /// Restore a historical version to be the current content of `name`.
    ///
    /// Whatever is currently live under `name` is archived first, so a
    /// restore never silently destroys the pre-restore state. The historical
    /// blob moves back to the current path and a fresh ledger record is
    /// written with the restore's time and requesting origin. Fails with
    /// `VersionNotFound` when the tag matches no entry.
    pub fn restore(&self, bucket: &str, name: &str, tag: &str, origin: &str) -> AppResult<()> {
        let mutex = self.bucket_mutex(bucket);
        let _guard = mutex.lock();

        let tag_safe = super::paths::sanitize_name(tag)
            .map_err(|_| StoreError::VersionNotFound(tag.to_string()))?;
        let source = self.history_dir(bucket, name)?.join(&tag_safe);
        if !source.is_file() {
            return Err(StoreError::VersionNotFound(format!("{}/{} @ {}", bucket, name, tag)));
        }

        self.archive_locked(bucket, name)?;

        let dest = self.content_path(bucket, name)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        fs::rename(&source, &dest).map_err(|e| StoreError::io(&dest, e))?;
        self.ledger_put_locked(
            bucket,
            &super::paths::sanitize_name(name)?,
            FileRecord { upload_time: Utc::now(), origin: origin.to_string() },
        )?;
        debug!(target: "filedock::storage", "restore: bucket='{}' name='{}' tag='{}'", bucket, name, tag_safe);
        Ok(())
    }
}
