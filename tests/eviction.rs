mod common;

use std::fs::{self, File};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use common::*;
use courier::artifact::ArtifactRegistry;
use courier::cache::ArtifactCache;
use courier::defaults::CacheConfig;
use tempfile::TempDir;

fn cache_at(root: &std::path::Path, max: usize) -> ArtifactCache {
    let mut config = CacheConfig::rooted_at(root);
    config.max_cached_artifacts = max;
    ArtifactCache::new(&config, Arc::new(ArtifactRegistry::new())).unwrap()
}

/// Write `name` with an mtime `age_secs` in the past.
fn aged_file(root: &std::path::Path, name: &str, age_secs: u64) {
    let path = root.join(name);
    fs::write(&path, name.as_bytes()).unwrap();
    let file = File::options().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
        .unwrap();
}

#[test]
fn oldest_entries_are_deleted_down_to_max() {
    let dir = TempDir::new().unwrap();
    for i in 0..12 {
        // entry-00 is the oldest
        aged_file(dir.path(), &format!("entry-{:02}", i), 1_000 - i * 10);
    }

    let report = cache_at(dir.path(), 10).evict().unwrap();

    assert_eq!(report.scanned, 12);
    assert_eq!(report.deleted, vec!["entry-00", "entry-01"]);
    assert!(report.failed.is_empty());
    assert!(!dir.path().join("entry-00").exists());
    assert!(!dir.path().join("entry-01").exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 10);
}

#[test]
fn one_entry_over_max_is_left_alone() {
    let dir = TempDir::new().unwrap();
    for i in 0..11 {
        aged_file(dir.path(), &format!("entry-{:02}", i), 100 + i);
    }

    let report = cache_at(dir.path(), 10).evict().unwrap();

    assert!(report.deleted.is_empty());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 11);
}

#[test]
fn missing_root_is_an_empty_sweep() {
    let dir = TempDir::new().unwrap();
    let report = cache_at(&dir.path().join("absent"), 10).evict().unwrap();
    assert_eq!(report.scanned, 0);
}

#[test]
fn recently_used_entry_survives() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new("build.zip", b"fresh"));
    let mut config = CacheConfig::rooted_at(dir.path());
    config.max_cached_artifacts = 3;
    let registry = Arc::new(ArtifactRegistry::new().register(source.clone()));
    let cache = ArtifactCache::new(&config, registry).unwrap();
    let params = task(Some(artifact_config("build.zip")));

    // Downloading creates the scratch directory and the entry.
    let entry = cache.obtain(&resolved_context(&params, &source)).unwrap().path;
    for i in 0..4 {
        aged_file(dir.path(), &format!("old-{}", i), 1_000 + i);
    }

    let report = cache.evict().unwrap();

    assert!(entry.exists());
    assert_eq!(report.deleted.len(), 3);
    assert!(dir.path().join("old-0").exists());
}
