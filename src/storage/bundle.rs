//! Folder bundler: a client-submitted folder tree (relative-pathed payloads)
//! is staged under a per-bucket scratch area, packed into one zip artifact
//! named after the folder, and fed through the ingest pipeline as a single
//! item, so a same-named prior bundle is archived, not silently replaced.

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::error::{AppResult, StoreError};

use super::paths::split_relative_path;
use super::FileStore;

/// One relative-pathed payload from an uploaded folder tree.
#[derive(Debug, Clone)]
pub struct BundleItem {
    /// Path relative to the chosen upload root, e.g. "proj/docs/a.txt".
    /// '/' and '\' both act as separators.
    pub rel_path: String,
    pub bytes: Vec<u8>,
}

/// Removes the staging directory on every exit path, including packing
/// failure.
struct ScratchGuard(PathBuf);

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        if self.0.exists() {
            if let Err(e) = fs::remove_dir_all(&self.0) {
                warn!(target: "filedock::storage", "scratch cleanup failed: '{}': {}", self.0.display(), e);
            }
        }
    }
}

/// Pack every file under `dir` into an in-memory zip, entry names relative
/// to `dir`. Traversal order is made deterministic by sorting on file name.
fn pack_dir_to_zip(dir: &Path) -> AppResult<Vec<u8>> {
    let mut zw = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            StoreError::io(dir, std::io::Error::new(std::io::ErrorKind::Other, e))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| {
                StoreError::io(entry.path(), std::io::Error::new(std::io::ErrorKind::Other, e))
            })?
            .to_string_lossy()
            .replace('\\', "/");
        zw.start_file(rel, opts).map_err(|e| {
            StoreError::io(entry.path(), std::io::Error::new(std::io::ErrorKind::Other, e))
        })?;
        let bytes = fs::read(entry.path()).map_err(|e| StoreError::io(entry.path(), e))?;
        zw.write_all(&bytes).map_err(|e| StoreError::io(entry.path(), e))?;
    }
    let cursor = zw
        .finish()
        .map_err(|e| StoreError::io(dir, std::io::Error::new(std::io::ErrorKind::Other, e)))?;
    Ok(cursor.into_inner())
}

impl FileStore {
    /// Bundle an uploaded folder tree into one zip artifact and ingest it.
    ///
    /// The bundle name derives from the top-level path segment all items
    /// share (the folder's own name); items with no common top segment are an
    /// `InvalidBundle` error. Entries inside the artifact are stored relative
    /// to that common root, so a bundle of `proj/a.txt` unpacks to `a.txt`.
    /// Returns the stored bundle name, `<folder>_<timestamp>.zip`.
    pub fn bundle_and_ingest(
        &self,
        bucket: &str,
        items: Vec<BundleItem>,
        origin: &str,
    ) -> AppResult<String> {
        if items.is_empty() {
            return Err(StoreError::NoInput("empty folder upload".into()));
        }

        // Validate paths and derive the common top segment before touching
        // the disk; a bundle-level error must not leave staging behind.
        let mut split: Vec<(Vec<String>, Vec<u8>)> = Vec::new();
        for item in items {
            let segs = split_relative_path(&item.rel_path)?;
            if segs.len() < 2 {
                return Err(StoreError::InvalidBundle(format!(
                    "item '{}' is not inside a folder",
                    item.rel_path
                )));
            }
            split.push((segs, item.bytes));
        }
        let folder = split[0].0[0].clone();
        if split.iter().any(|(segs, _)| segs[0] != folder) {
            return Err(StoreError::InvalidBundle(
                "folder items share no common top-level segment".into(),
            ));
        }

        let mutex = self.bucket_mutex(bucket);
        let _guard = mutex.lock();

        let scratch = self.scratch_dir(bucket)?;
        // A crashed earlier run may have left staging behind; start clean.
        if scratch.exists() {
            fs::remove_dir_all(&scratch).map_err(|e| StoreError::io(&scratch, e))?;
        }
        let _cleanup = ScratchGuard(scratch.clone());

        for (segs, bytes) in &split {
            let mut path = scratch.clone();
            for seg in segs {
                path.push(seg);
            }
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
            }
            fs::write(&path, bytes).map_err(|e| StoreError::io(&path, e))?;
        }

        let zip_bytes = pack_dir_to_zip(&scratch.join(&folder))?;
        let bundle_name = format!("{}_{}.zip", folder, Utc::now().format("%Y%m%d_%H%M%S"));
        let stored = self.ingest_one_locked(bucket, &bundle_name, &zip_bytes, origin)?;
        debug!(
            target: "filedock::storage",
            "bundle_and_ingest: bucket='{}' folder='{}' files={} stored='{}'",
            bucket, folder, split.len(), stored
        );
        Ok(stored)
    }
}
