//! Batch exporter: packs the current content of a selection of files into one
//! in-memory zip for download. Read-only: it never touches the ledger or the
//! version history.

use std::fs;
use std::io::{Cursor, Write};

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::error::{AppResult, StoreError};

use super::FileStore;

/// Result of a batch export. `matched` being empty signals a zero-matched
/// selection to the caller; the archive itself is still valid (and empty).
#[derive(Debug, Clone)]
pub struct ExportResult {
    /// The packed zip archive.
    pub bytes: Vec<u8>,
    /// Names included in the archive, in input order.
    pub matched: Vec<String>,
    /// Requested names that did not resolve to an existing current file.
    pub missing: Vec<String>,
}

impl FileStore {
    /// Export a selection of current files as one zip archive. Names that do
    /// not resolve to an existing current file are silently skipped and
    /// reported in `missing`; a partially-missing selection is not an error.
    /// The whole archive is built in memory, which is fine for the bucket
    /// sizes this store serves.
    pub fn export_batch(&self, bucket: &str, names: &[String]) -> AppResult<ExportResult> {
        let mut zw = ZipWriter::new(Cursor::new(Vec::new()));
        let opts = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        let mut matched: Vec<String> = Vec::new();
        let mut missing: Vec<String> = Vec::new();

        for name in names {
            // An unsafe name cannot resolve to a current file; treat it the
            // same as a missing one.
            let path = match self.content_path(bucket, name) {
                Ok(p) => p,
                Err(_) => {
                    missing.push(name.clone());
                    continue;
                }
            };
            if !path.is_file() {
                missing.push(name.clone());
                continue;
            }
            if matched.iter().any(|m| m == name) {
                continue; // duplicate selection entry
            }
            let bytes = fs::read(&path).map_err(|e| StoreError::io(&path, e))?;
            zw.start_file(name.clone(), opts).map_err(|e| {
                StoreError::io(&path, std::io::Error::new(std::io::ErrorKind::Other, e))
            })?;
            zw.write_all(&bytes).map_err(|e| StoreError::io(&path, e))?;
            matched.push(name.clone());
        }

        let cursor = zw.finish().map_err(|e| {
            StoreError::io("<export>", std::io::Error::new(std::io::ErrorKind::Other, e))
        })?;
        debug!(
            target: "filedock::storage",
            "export_batch: bucket='{}' matched={} missing={}",
            bucket, matched.len(), missing.len()
        );
        Ok(ExportResult { bytes: cursor.into_inner(), matched, missing })
    }
}
