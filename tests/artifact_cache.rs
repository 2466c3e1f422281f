mod common;

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use common::*;
use courier::artifact::ArtifactRegistry;
use courier::cache::{cache_key, entry_file_name, ArtifactCache};
use courier::defaults::CacheConfig;
use tempfile::TempDir;

const LIMIT: u64 = 1024 * 1024;

fn read_all(mut cached: courier::cache::CachedArtifact) -> Vec<u8> {
    let mut body = Vec::new();
    cached.file.read_to_end(&mut body).unwrap();
    body
}

#[test]
fn concurrent_obtains_download_once() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new("build.zip", b"artifact-body").with_delay(Duration::from_millis(50)));
    let cache = cache_with(dir.path(), source.clone(), LIMIT);
    let params = task(Some(artifact_config("build.zip")));

    let workers = 50;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let cache = cache.clone();
            let barrier = barrier.clone();
            let ctx = resolved_context(&params, &source);
            thread::spawn(move || {
                barrier.wait();
                read_all(cache.obtain(&ctx).unwrap())
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), b"artifact-body");
    }
    assert_eq!(source.fetch_count(), 1);
}

#[test]
fn slow_download_is_shared_with_waiting_caller() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new("build.zip", b"slow-bytes").with_delay(Duration::from_millis(200)));
    let cache = cache_with(dir.path(), source.clone(), LIMIT);
    let params = task(Some(artifact_config("build.zip")));
    let config = params.artifact.clone().unwrap();
    assert_eq!(cache_key(&config, "build.zip"), "_id123-build.zip");

    let first = {
        let cache = cache.clone();
        let ctx = resolved_context(&params, &source);
        thread::spawn(move || cache.obtain(&ctx).unwrap())
    };
    thread::sleep(Duration::from_millis(20));
    let second = cache.obtain(&resolved_context(&params, &source)).unwrap();
    let first = first.join().unwrap();

    assert_eq!(first.path, second.path);
    assert_eq!(
        first.path,
        dir.path().join(entry_file_name("_id123-build.zip", "build.zip"))
    );
    assert!(!first.hit);
    assert!(second.hit);
    assert_eq!(read_all(first), read_all(second));
    assert_eq!(source.fetch_count(), 1);
}

#[test]
fn oversized_artifact_is_rejected_without_fetching() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new("build.zip", b"tiny").declaring_size(5_000));
    let cache = cache_with(dir.path(), source.clone(), 4_096);
    let params = task(Some(artifact_config("build.zip")));

    let err = cache
        .obtain(&resolved_context(&params, &source))
        .unwrap_err();

    assert_eq!(err.code, courier::ErrorCode::ArtifactSizeExceeded);
    assert_eq!(source.fetch_count(), 0);
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[test]
fn sequential_obtain_hits_cache() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new("libs/build.zip", b"cached"));
    let cache = cache_with(dir.path(), source.clone(), LIMIT);
    let params = task(Some(artifact_config("build.zip")));

    let first = cache.obtain(&resolved_context(&params, &source)).unwrap();
    let second = cache.obtain(&resolved_context(&params, &source)).unwrap();

    assert!(!first.hit);
    assert!(second.hit);
    assert_eq!(second.file_name, "build.zip");
    assert_eq!(second.size, 6);
    assert_eq!(source.fetch_count(), 1);
}

#[test]
fn obtain_survives_concurrent_eviction() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new("build.zip", b"hot-artifact"));
    let registry = Arc::new(ArtifactRegistry::new().register(source.clone()));
    let mut config = CacheConfig::rooted_at(dir.path());
    config.max_cached_artifacts = 0;
    let cache = Arc::new(ArtifactCache::new(&config, registry).unwrap());
    let params = task(Some(artifact_config("build.zip")));
    let ctx = resolved_context(&params, &source);

    let done = Arc::new(AtomicBool::new(false));
    let sweeper = {
        let cache = cache.clone();
        let done = done.clone();
        thread::spawn(move || {
            while !done.load(Ordering::SeqCst) {
                cache.evict().unwrap();
            }
        })
    };

    let mut failures = Vec::new();
    for _ in 0..5_000 {
        match cache.obtain(&ctx) {
            Ok(cached) => assert_eq!(read_all(cached), b"hot-artifact"),
            Err(err) => failures.push(err.code),
        }
    }
    done.store(true, Ordering::SeqCst);
    sweeper.join().unwrap();

    assert!(failures.is_empty(), "obtain failed while evicting: {:?}", failures);
    assert!(source.fetch_count() >= 1);
}
