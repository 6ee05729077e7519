use super::*;
use std::io::Read;

fn new_store() -> (tempfile::TempDir, FileStore) {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileStore::new(tmp.path()).unwrap();
    (tmp, store)
}

fn ingest_one(store: &FileStore, bucket: &str, name: &str, bytes: &[u8]) -> String {
    let report = store
        .ingest(bucket, vec![IngestItem { name: name.into(), bytes: bytes.to_vec() }], "10.0.0.1")
        .unwrap();
    assert!(report.failed.is_empty(), "unexpected failures: {:?}", report.failed);
    report.stored[0].clone()
}

fn unzip_names_and_contents(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut za = zip::ZipArchive::new(std::io::Cursor::new(bytes.to_vec())).unwrap();
    let mut out = Vec::new();
    for i in 0..za.len() {
        let mut f = za.by_index(i).unwrap();
        let mut buf = Vec::new();
        f.read_to_end(&mut buf).unwrap();
        out.push((f.name().to_string(), buf));
    }
    out.sort();
    out
}

#[test]
fn test_ingest_and_ledger_roundtrip() {
    let (_tmp, store) = new_store();
    let stored = ingest_one(&store, "alice", "notes.txt", b"hello");
    assert_eq!(stored, "notes.txt");
    assert_eq!(store.read_file("alice", "notes.txt").unwrap(), b"hello");
    let ledger = store.load_ledger("alice").unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger["notes.txt"].origin, "10.0.0.1");
}

#[test]
fn test_upload_time_monotonic_across_overwrites() {
    let (_tmp, store) = new_store();
    let mut last = None;
    for i in 0..3 {
        ingest_one(&store, "alice", "f.txt", format!("v{}", i).as_bytes());
        let t = store.load_ledger("alice").unwrap()["f.txt"].upload_time;
        if let Some(prev) = last {
            assert!(t >= prev, "upload_time went backwards");
        }
        last = Some(t);
    }
}

#[test]
fn test_first_upload_is_never_archived() {
    let (_tmp, store) = new_store();
    ingest_one(&store, "alice", "f.txt", b"v1");
    assert!(store.list_versions("alice", "f.txt").unwrap().is_empty());
}

#[test]
fn test_archive_is_noop_without_current_file() {
    let (_tmp, store) = new_store();
    let tag = store.archive("alice", "ghost.txt").unwrap();
    assert!(tag.is_none());
    assert!(store.list_versions("alice", "ghost.txt").unwrap().is_empty());
}

#[test]
fn test_overwrite_then_restore_roundtrip() {
    let (_tmp, store) = new_store();
    ingest_one(&store, "alice", "f.txt", b"AAAA");
    ingest_one(&store, "alice", "f.txt", b"BBBB");

    let versions = store.list_versions("alice", "f.txt").unwrap();
    assert_eq!(versions.len(), 1);
    let a_tag = versions[0].tag.clone();

    store.restore("alice", "f.txt", &a_tag, "10.0.0.9").unwrap();
    assert_eq!(store.read_file("alice", "f.txt").unwrap(), b"AAAA");

    // The pre-restore state (B) must now live in history.
    let versions = store.list_versions("alice", "f.txt").unwrap();
    assert_eq!(versions.len(), 1);
    let b_tag = &versions[0].tag;
    assert_ne!(b_tag, &a_tag);
    let ledger = store.load_ledger("alice").unwrap();
    assert_eq!(ledger["f.txt"].origin, "10.0.0.9");
}

#[test]
fn test_restore_unknown_tag_fails() {
    let (_tmp, store) = new_store();
    ingest_one(&store, "alice", "f.txt", b"v1");
    let err = store.restore("alice", "f.txt", "19700101_000000", "10.0.0.1").unwrap_err();
    assert_eq!(err.code_str(), "version_not_found");
    // The live file must be untouched by the failed restore.
    assert_eq!(store.read_file("alice", "f.txt").unwrap(), b"v1");
}

#[test]
fn test_three_overwrites_list_newest_first_each_restorable() {
    let (_tmp, store) = new_store();
    for v in ["v1", "v2", "v3", "v4"] {
        ingest_one(&store, "alice", "f.txt", v.as_bytes());
    }
    let versions = store.list_versions("alice", "f.txt").unwrap();
    assert_eq!(versions.len(), 3);
    // Newest first: tags must be strictly descending by sort order.
    for w in versions.windows(2) {
        assert!(w[0].tag >= w[1].tag || w[0].tag.starts_with(&w[1].tag));
    }
    // The oldest entry is v1; restoring it brings v1 back.
    let oldest = versions.last().unwrap().tag.clone();
    store.restore("alice", "f.txt", &oldest, "10.0.0.1").unwrap();
    assert_eq!(store.read_file("alice", "f.txt").unwrap(), b"v1");
    // v4 joined the history when it was displaced by the restore.
    assert_eq!(store.list_versions("alice", "f.txt").unwrap().len(), 3);
}

#[test]
fn test_same_second_archives_get_distinct_tags() {
    let (_tmp, store) = new_store();
    // Several overwrites back-to-back land in the same timestamp second;
    // every archived blob must keep a distinct tag.
    for v in ["v1", "v2", "v3", "v4", "v5"] {
        ingest_one(&store, "alice", "f.txt", v.as_bytes());
    }
    let versions = store.list_versions("alice", "f.txt").unwrap();
    assert_eq!(versions.len(), 4);
    let mut tags: Vec<String> = versions.iter().map(|v| v.tag.clone()).collect();
    crate::tprintln!("archive tags: {:?}", tags);
    tags.sort();
    tags.dedup();
    assert_eq!(tags.len(), 4, "same-second tags collided");
}

#[test]
fn test_list_versions_tolerates_multibyte_history_filenames() {
    let (_tmp, store) = new_store();
    ingest_one(&store, "alice", "f.txt", b"v1");
    ingest_one(&store, "alice", "f.txt", b"v2");
    // A hand-dropped file whose name has a multibyte character straddling the
    // timestamp width must sort oldest, not break the listing.
    let foreign = "aaaaaaaaaaaaaaéxx";
    let dir = store.history_dir("alice", "f.txt").unwrap();
    std::fs::write(dir.join(foreign), b"junk").unwrap();

    let versions = store.list_versions("alice", "f.txt").unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions.last().unwrap().tag, foreign);
}

#[test]
fn test_ingest_empty_set_is_no_input() {
    let (_tmp, store) = new_store();
    let err = store.ingest("alice", Vec::new(), "10.0.0.1").unwrap_err();
    assert_eq!(err.code_str(), "no_input");
}

#[test]
fn test_ingest_partial_success_on_bad_name() {
    let (_tmp, store) = new_store();
    let report = store
        .ingest(
            "alice",
            vec![
                IngestItem { name: "ok.txt".into(), bytes: b"fine".to_vec() },
                IngestItem { name: "../evil".into(), bytes: b"nope".to_vec() },
                IngestItem { name: "also-ok.txt".into(), bytes: b"fine2".to_vec() },
            ],
            "10.0.0.1",
        )
        .unwrap();
    assert_eq!(report.stored, vec!["ok.txt".to_string(), "also-ok.txt".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].name, "../evil");
    // A failed item leaves no ledger entry behind.
    let ledger = store.load_ledger("alice").unwrap();
    assert_eq!(ledger.len(), 2);
}

#[test]
fn test_stale_ledger_entries_are_filtered_on_load() {
    let (_tmp, store) = new_store();
    ingest_one(&store, "alice", "keep.txt", b"a");
    ingest_one(&store, "alice", "gone.txt", b"b");
    // Remove one file out-of-band, bypassing the store.
    let path = store.content_path("alice", "gone.txt").unwrap();
    std::fs::remove_file(path).unwrap();

    let ledger = store.load_ledger("alice").unwrap();
    assert_eq!(ledger.len(), 1);
    assert!(ledger.contains_key("keep.txt"));
    // load is side-effect-free: the raw ledger still has both entries.
    assert_eq!(store.ledger_load_raw("alice").unwrap().len(), 2);
}

#[test]
fn test_delete_archives_and_prunes_ledger() {
    let (_tmp, store) = new_store();
    ingest_one(&store, "alice", "f.txt", b"v1");
    store.delete("alice", "f.txt").unwrap();

    assert!(store.read_file("alice", "f.txt").is_err());
    assert!(store.load_ledger("alice").unwrap().is_empty());
    // The deleted content is recoverable from history.
    let versions = store.list_versions("alice", "f.txt").unwrap();
    assert_eq!(versions.len(), 1);
    store.restore("alice", "f.txt", &versions[0].tag, "10.0.0.1").unwrap();
    assert_eq!(store.read_file("alice", "f.txt").unwrap(), b"v1");
}

#[test]
fn test_delete_absent_file_is_not_found() {
    let (_tmp, store) = new_store();
    let err = store.delete("alice", "ghost.txt").unwrap_err();
    assert_eq!(err.code_str(), "not_found");
}

#[test]
fn test_clear_empties_content_and_ledger_keeps_history() {
    let (_tmp, store) = new_store();
    ingest_one(&store, "alice", "a.txt", b"a");
    ingest_one(&store, "alice", "b.txt", b"b");
    let removed = store.clear("alice").unwrap();
    assert_eq!(removed, 2);
    assert!(store.load_ledger("alice").unwrap().is_empty());
    assert!(store.read_file("alice", "a.txt").is_err());
    // Cleared files are archived, not destroyed.
    assert_eq!(store.list_versions("alice", "a.txt").unwrap().len(), 1);
    assert_eq!(store.list_versions("alice", "b.txt").unwrap().len(), 1);
}

#[cfg(unix)]
#[test]
fn test_clear_count_matches_files_actually_removed() {
    use std::os::unix::ffi::OsStrExt;
    let (_tmp, store) = new_store();
    ingest_one(&store, "alice", "ok.txt", b"a");
    // A non-UTF-8 filename dropped in out-of-band cannot be archived under a
    // usable name but must still be cleared, and counted exactly once.
    let dir = store.content_dir("alice").unwrap();
    std::fs::write(dir.join(std::ffi::OsStr::from_bytes(b"bad\xFFname")), b"junk").unwrap();

    let removed = store.clear("alice").unwrap();
    assert_eq!(removed, 2);
    assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    // Only the resolvable file got a history entry.
    assert_eq!(store.list_versions("alice", "ok.txt").unwrap().len(), 1);
}

#[test]
fn test_buckets_are_isolated() {
    let (_tmp, store) = new_store();
    ingest_one(&store, "alice", "f.txt", b"alice data");
    ingest_one(&store, "bob", "f.txt", b"bob data");
    assert_eq!(store.read_file("alice", "f.txt").unwrap(), b"alice data");
    assert_eq!(store.read_file("bob", "f.txt").unwrap(), b"bob data");
    store.clear("alice").unwrap();
    assert_eq!(store.read_file("bob", "f.txt").unwrap(), b"bob data");
}

#[test]
fn test_bundle_and_ingest_produces_named_zip() {
    let (_tmp, store) = new_store();
    let stored = store
        .bundle_and_ingest(
            "alice",
            vec![
                BundleItem { rel_path: "proj/a.txt".into(), bytes: b"alpha".to_vec() },
                BundleItem { rel_path: "proj/b.txt".into(), bytes: b"beta".to_vec() },
            ],
            "10.0.0.1",
        )
        .unwrap();
    assert!(stored.starts_with("proj_"), "unexpected bundle name '{}'", stored);
    assert!(stored.ends_with(".zip"));

    let bytes = store.read_file("alice", &stored).unwrap();
    let entries = unzip_names_and_contents(&bytes);
    assert_eq!(
        entries,
        vec![
            ("a.txt".to_string(), b"alpha".to_vec()),
            ("b.txt".to_string(), b"beta".to_vec()),
        ]
    );
    // The bundle went through the ingest pipeline: ledger records it.
    assert!(store.load_ledger("alice").unwrap().contains_key(&stored));
    // Staging must be gone afterwards.
    assert!(!store.scratch_dir("alice").unwrap().exists());
}

#[test]
fn test_bundle_preserves_nested_subfolders() {
    let (_tmp, store) = new_store();
    let stored = store
        .bundle_and_ingest(
            "alice",
            vec![
                BundleItem { rel_path: "proj/docs/deep/x.txt".into(), bytes: b"x".to_vec() },
                BundleItem { rel_path: "proj\\top.txt".into(), bytes: b"t".to_vec() },
            ],
            "10.0.0.1",
        )
        .unwrap();
    let bytes = store.read_file("alice", &stored).unwrap();
    let entries = unzip_names_and_contents(&bytes);
    let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["docs/deep/x.txt", "top.txt"]);
}

#[test]
fn test_bundle_without_common_root_is_invalid() {
    let (_tmp, store) = new_store();
    let err = store
        .bundle_and_ingest(
            "alice",
            vec![
                BundleItem { rel_path: "proj/a.txt".into(), bytes: b"a".to_vec() },
                BundleItem { rel_path: "other/b.txt".into(), bytes: b"b".to_vec() },
            ],
            "10.0.0.1",
        )
        .unwrap_err();
    assert_eq!(err.code_str(), "invalid_bundle");
    // A rejected bundle must leave no staging and no stored artifact.
    assert!(!store.scratch_dir("alice").unwrap().exists());
    assert!(store.load_ledger("alice").unwrap().is_empty());
}

#[test]
fn test_bundle_empty_set_is_no_input() {
    let (_tmp, store) = new_store();
    let err = store.bundle_and_ingest("alice", Vec::new(), "10.0.0.1").unwrap_err();
    assert_eq!(err.code_str(), "no_input");
}

#[test]
fn test_same_named_bundle_is_archived_not_replaced() {
    let (_tmp, store) = new_store();
    // Two bundles of the same folder within one second share the stored name,
    // so the second must archive the first.
    let items = || vec![BundleItem { rel_path: "proj/a.txt".into(), bytes: b"a".to_vec() }];
    let first = store.bundle_and_ingest("alice", items(), "10.0.0.1").unwrap();
    let second = store.bundle_and_ingest("alice", items(), "10.0.0.1").unwrap();
    if first == second {
        assert_eq!(store.list_versions("alice", &first).unwrap().len(), 1);
    }
}

#[test]
fn test_export_batch_skips_missing_names() {
    let (_tmp, store) = new_store();
    ingest_one(&store, "alice", "present.txt", b"payload");
    let result = store
        .export_batch("alice", &["present.txt".to_string(), "missing.txt".to_string()])
        .unwrap();
    assert_eq!(result.matched, vec!["present.txt".to_string()]);
    assert_eq!(result.missing, vec!["missing.txt".to_string()]);
    let entries = unzip_names_and_contents(&result.bytes);
    assert_eq!(entries, vec![("present.txt".to_string(), b"payload".to_vec())]);
}

#[test]
fn test_export_batch_zero_matched_is_flagged_not_error() {
    let (_tmp, store) = new_store();
    let result = store.export_batch("alice", &["nope.txt".to_string()]).unwrap();
    assert!(result.matched.is_empty());
    assert_eq!(result.missing.len(), 1);
    // Still a structurally valid (empty) archive.
    let za = zip::ZipArchive::new(std::io::Cursor::new(result.bytes)).unwrap();
    assert_eq!(za.len(), 0);
}

#[test]
fn test_export_batch_is_read_only() {
    let (_tmp, store) = new_store();
    ingest_one(&store, "alice", "f.txt", b"v1");
    let before = store.load_ledger("alice").unwrap();
    store.export_batch("alice", &["f.txt".to_string()]).unwrap();
    let after = store.load_ledger("alice").unwrap();
    assert_eq!(before.len(), after.len());
    assert!(store.list_versions("alice", "f.txt").unwrap().is_empty());
}

#[test]
fn test_no_partial_file_visible_after_ingest() {
    let (_tmp, store) = new_store();
    ingest_one(&store, "alice", "f.txt", b"final");
    // The temp-then-rename discipline leaves no *.part files behind.
    let dir = store.content_dir("alice").unwrap();
    for entry in std::fs::read_dir(dir).unwrap() {
        let name = entry.unwrap().file_name().to_string_lossy().to_string();
        assert!(!name.ends_with(".part"), "leftover temp file '{}'", name);
    }
}
