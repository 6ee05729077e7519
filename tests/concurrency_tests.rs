//! Cross-thread properties of the store: mutations on one bucket apply as a
//! linear sequence with no lost ledger updates.

use std::thread;

use filedock::storage::{FileStore, IngestItem};

fn ingest(store: &FileStore, bucket: &str, name: &str, bytes: &[u8]) {
    let report = store
        .ingest(bucket, vec![IngestItem { name: name.into(), bytes: bytes.to_vec() }], "10.0.0.1")
        .unwrap();
    assert!(report.failed.is_empty());
}

#[test]
fn concurrent_ingest_of_two_files_loses_no_ledger_update() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileStore::new(tmp.path()).unwrap();

    let s1 = store.clone();
    let s2 = store.clone();
    let t1 = thread::spawn(move || ingest(&s1, "alice", "one.txt", b"first"));
    let t2 = thread::spawn(move || ingest(&s2, "alice", "two.txt", b"second"));
    t1.join().unwrap();
    t2.join().unwrap();

    let ledger = store.load_ledger("alice").unwrap();
    assert_eq!(ledger.len(), 2, "a concurrent ledger update was lost");
    assert!(ledger.contains_key("one.txt"));
    assert!(ledger.contains_key("two.txt"));
    assert_eq!(store.read_file("alice", "one.txt").unwrap(), b"first");
    assert_eq!(store.read_file("alice", "two.txt").unwrap(), b"second");
}

#[test]
fn hammering_one_file_from_many_threads_keeps_history_complete() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileStore::new(tmp.path()).unwrap();

    let threads = 4;
    let writes_per_thread = 5;
    let mut handles = Vec::new();
    for t in 0..threads {
        let s = store.clone();
        handles.push(thread::spawn(move || {
            for i in 0..writes_per_thread {
                ingest(&s, "alice", "hot.txt", format!("t{}-w{}", t, i).as_bytes());
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    // Every overwrite except the very first archived a predecessor, and no
    // same-second tag collision may have swallowed one.
    let versions = store.list_versions("alice", "hot.txt").unwrap();
    assert_eq!(versions.len(), threads * writes_per_thread - 1);
    let ledger = store.load_ledger("alice").unwrap();
    assert!(ledger.contains_key("hot.txt"));
}

#[test]
fn different_buckets_do_not_serialize_against_each_other() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileStore::new(tmp.path()).unwrap();

    let mut handles = Vec::new();
    for b in 0..4 {
        let s = store.clone();
        handles.push(thread::spawn(move || {
            let bucket = format!("user{}", b);
            for i in 0..10 {
                ingest(&s, &bucket, &format!("f{}.txt", i), b"payload");
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    for b in 0..4 {
        let ledger = store.load_ledger(&format!("user{}", b)).unwrap();
        assert_eq!(ledger.len(), 10);
    }
}
