//! Custom test assertions for harvest runs

use feedsnap::Snapshot;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Relative path → file contents (`None` for directories)
pub type DirTree = BTreeMap<PathBuf, Option<Vec<u8>>>;

/// Read a whole directory tree into memory
pub fn dir_tree(dir: &Path) -> DirTree {
    WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .map(|entry| {
            let entry = entry.expect("walk output directory");
            let relative = entry
                .path()
                .strip_prefix(dir)
                .expect("entry below root")
                .to_path_buf();
            let contents = entry
                .file_type()
                .is_file()
                .then(|| std::fs::read(entry.path()).expect("read file"));
            (relative, contents)
        })
        .collect()
}

/// Backup directories left next to `output_dir`
pub fn leftover_backups(output_dir: &Path) -> Vec<PathBuf> {
    let parent = output_dir.parent().expect("output dir has a parent");
    std::fs::read_dir(parent)
        .expect("read parent dir")
        .map(|entry| entry.expect("dir entry").path())
        .filter(|p| p.to_string_lossy().contains("(backup "))
        .collect()
}

/// Assert the snapshot's key sets line up and every failure is accounted for
pub fn assert_exclusive(snapshot: &Snapshot, expected_ok: &[&str], expected_failed: &[&str]) {
    assert!(snapshot.is_consistent(), "inconsistent snapshot: {snapshot:#?}");

    let mut channels: Vec<&str> = snapshot.channels.keys().map(String::as_str).collect();
    channels.sort_unstable();
    let mut ok = expected_ok.to_vec();
    ok.sort_unstable();
    assert_eq!(channels, ok, "recorded sources");

    let mut failed: Vec<&str> = snapshot.errors.iter().map(|e| e.key.as_str()).collect();
    failed.sort_unstable();
    let mut expected = expected_failed.to_vec();
    expected.sort_unstable();
    assert_eq!(failed, expected, "failed sources");

    for key in expected_failed {
        assert!(!snapshot.load_order.iter().any(|k| k == key));
        assert!(!snapshot.episodes_in_2weeks.iter().any(|e| e.key == *key));
    }
}

/// Error code recorded for `key`
pub fn error_code<'a>(snapshot: &'a Snapshot, key: &str) -> Option<&'a str> {
    snapshot
        .errors
        .iter()
        .find(|e| e.key == key)
        .and_then(|e| e.error.as_ref())
        .map(|cause| cause.code.as_str())
}
