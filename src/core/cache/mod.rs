//! Local artifact cache.
//!
//! Artifacts are stored flat under the cache root, one regular file per cache key.
//! A file's presence is the entry and its mtime is the recency signal; nothing else
//! is persisted. Downloads go to the scratch directory first and are renamed into
//! place, so the final path never holds a partial file.
//!
//! Two lock registries exist with the same expiry policy: `download_locks` is keyed
//! by cache key and serializes `obtain`, `eviction_locks` is keyed by raw file name
//! and serializes deletes. Evicting one artifact never waits on another's download.

mod locks;

pub use locks::{KeyGuard, LockRegistry};

use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use crate::artifact::{
    file_name_of, ArtifactConfig, ArtifactRegistry, ARTIFACT_FILE_NAME, ARTIFACT_NAME,
};
use crate::context::ExecutionContext;
use crate::defaults::CacheConfig;
use crate::error::{Error, Result};

/// A readable cache entry handed back by [`ArtifactCache::obtain`].
#[derive(Debug)]
pub struct CachedArtifact {
    pub key: String,
    pub path: PathBuf,
    /// Name the artifact should have at its destination.
    pub file_name: String,
    pub size: u64,
    /// True when no download was needed.
    pub hit: bool,
    pub file: File,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvictionReport {
    pub scanned: usize,
    pub deleted: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub root_dir: String,
    pub scratch_dir: String,
    pub entries: usize,
    pub total_bytes: u64,
    pub max_cached_artifacts: usize,
    pub artifact_file_size_limit: u64,
}

struct Sweeper {
    stop: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct ArtifactCache {
    root: PathBuf,
    scratch: PathBuf,
    size_limit: u64,
    max_entries: usize,
    eviction_period: Duration,
    registry: Arc<ArtifactRegistry>,
    download_locks: LockRegistry,
    eviction_locks: LockRegistry,
    sweeper: Mutex<Option<Sweeper>>,
}

/// The literal cache key: identifier, a dash, then the resolved artifact name.
pub fn cache_key(config: &ArtifactConfig, artifact_name: &str) -> String {
    format!("{}-{}", config.identifier, artifact_name)
}

/// Flat on-disk name for a key: `<sha256(key)>-<file name>`.
pub fn entry_file_name(key: &str, artifact_file_name: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    format!("{:x}-{}", digest, sanitize_file_name(artifact_file_name))
}

fn sanitize_file_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = sanitized.trim_start_matches('.');
    if trimmed.is_empty() {
        "artifact".to_string()
    } else {
        trimmed.to_string()
    }
}

fn io_error(err: io::Error, context: String) -> Error {
    Error::internal_io(err.to_string(), Some(context))
}

impl ArtifactCache {
    pub fn new(config: &CacheConfig, registry: Arc<ArtifactRegistry>) -> Result<Self> {
        let ttl = Duration::from_secs(config.lock_ttl_secs);
        Ok(Self {
            root: config.root_dir()?,
            scratch: config.scratch_dir()?,
            size_limit: config.artifact_file_size_limit,
            max_entries: config.max_cached_artifacts,
            eviction_period: Duration::from_secs(config.eviction_period_secs.max(1)),
            registry,
            download_locks: LockRegistry::new("download", ttl),
            eviction_locks: LockRegistry::new("eviction", ttl),
            sweeper: Mutex::new(None),
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch
    }

    pub fn registry(&self) -> &Arc<ArtifactRegistry> {
        &self.registry
    }

    /// Fail with `ArtifactSizeExceeded` when the declared size is over the limit.
    pub fn check_size(&self, ctx: &ExecutionContext) -> Result<()> {
        let Some(size) = ctx.declared_artifact_size() else {
            return Ok(());
        };
        if size > self.size_limit {
            let subject = ctx
                .metadata(ARTIFACT_NAME)
                .or_else(|| ctx.artifact.as_ref().map(|a| a.identifier.as_str()))
                .unwrap_or("artifact");
            return Err(Error::artifact_size_exceeded(subject, size, self.size_limit));
        }
        Ok(())
    }

    /// Return a stream over the context's artifact, downloading it at most once per key.
    ///
    /// The context must already carry the resolved `artifactName` (and usually
    /// `artifactSize`) from a size query.
    pub fn obtain(&self, ctx: &ExecutionContext) -> Result<CachedArtifact> {
        let config = ctx
            .artifact
            .as_ref()
            .ok_or_else(|| Error::artifact_not_configured("any", None))?;

        self.check_size(ctx)?;

        let artifact_name = ctx
            .metadata(ARTIFACT_NAME)
            .ok_or_else(|| Error::artifact_path_missing(ARTIFACT_NAME))?;
        let file_name = ctx
            .metadata(ARTIFACT_FILE_NAME)
            .map(str::to_string)
            .unwrap_or_else(|| file_name_of(artifact_name));

        let key = cache_key(config, artifact_name);
        let path = self.root.join(entry_file_name(&key, &file_name));

        let guard = self.download_locks.lock(&key);

        // Open before refreshing: a concurrent eviction may remove the entry at
        // any point, and an open handle keeps the bytes readable.
        let (file, hit) = match open_entry(&path)? {
            Some(file) => {
                tracing::debug!(key = %key, path = %path.display(), "artifact cache hit");
                if let Err(e) = file.set_modified(SystemTime::now()) {
                    tracing::debug!(path = %path.display(), error = %e, "could not refresh cache entry mtime");
                }
                (file, true)
            }
            None => {
                tracing::info!(key = %key, "artifact cache miss, downloading");
                let file = self.download(ctx, config, artifact_name, &path)?;
                match fs::symlink_metadata(&path) {
                    Ok(metadata) if metadata.is_file() => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        tracing::debug!(key = %key, "entry evicted right after download, serving downloaded copy");
                    }
                    _ => return Err(Error::artifact_not_found(path.display().to_string())),
                }
                (file, false)
            }
        };
        drop(guard);

        let size = file
            .metadata()
            .map(|m| m.len())
            .map_err(|e| io_error(e, format!("stat {}", path.display())))?;

        Ok(CachedArtifact {
            key,
            path,
            file_name,
            size,
            hit,
            file,
        })
    }

    fn download(
        &self,
        ctx: &ExecutionContext,
        config: &ArtifactConfig,
        artifact_name: &str,
        final_path: &Path,
    ) -> Result<File> {
        for dir in [&self.root, &self.scratch] {
            fs::create_dir_all(dir)
                .map_err(|e| io_error(e, format!("create {}", dir.display())))?;
        }

        let handler = self.registry.resolve(config)?;
        let outcome = handler.fetch(ctx)?;
        let mut stream = outcome.stream.ok_or_else(|| {
            Error::artifact_download_failed(
                artifact_name,
                Some("repository returned no content".to_string()),
            )
        })?;

        let temp_path = self.scratch.join(format!(
            "{}.part",
            uuid::Uuid::new_v4().simple()
        ));

        let (mut file, written) = File::options()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .and_then(|mut temp| {
                let written = io::copy(&mut stream, &mut temp)?;
                temp.sync_all()?;
                Ok((temp, written))
            })
            .map_err(|e| {
                discard(&temp_path);
                Error::artifact_download_failed(artifact_name, Some(e.to_string()))
            })?;

        if written == 0 {
            discard(&temp_path);
            return Err(Error::artifact_download_failed(
                artifact_name,
                Some("repository returned an empty stream".to_string()),
            ));
        }

        fs::rename(&temp_path, final_path).map_err(|e| {
            discard(&temp_path);
            io_error(
                e,
                format!("move {} to {}", temp_path.display(), final_path.display()),
            )
        })?;

        tracing::info!(
            artifact = artifact_name,
            bytes = written,
            path = %final_path.display(),
            "artifact cached"
        );
        file.seek(SeekFrom::Start(0))
            .map_err(|e| io_error(e, format!("rewind {}", final_path.display())))?;
        Ok(file)
    }

    /// Delete the oldest entries once the root holds more than `max + 1` entries
    /// (the extra slot is the scratch directory).
    pub fn evict(&self) -> Result<EvictionReport> {
        self.evict_with(|path| fs::remove_file(path))
    }

    fn evict_with(&self, remove: impl Fn(&Path) -> io::Result<()>) -> Result<EvictionReport> {
        let listing = match fs::read_dir(&self.root) {
            Ok(listing) => listing,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(EvictionReport::default()),
            Err(e) => return Err(io_error(e, format!("list {}", self.root.display()))),
        };

        let mut entries: Vec<(String, SystemTime)> = Vec::new();
        for entry in listing.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            entries.push((name, modified));
        }

        let mut report = EvictionReport {
            scanned: entries.len(),
            ..EvictionReport::default()
        };
        if entries.len() <= self.max_entries + 1 {
            return Ok(report);
        }

        entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        let excess = entries.len() - self.max_entries;

        for (name, listed_mtime) in entries.into_iter().take(excess) {
            let _guard = self.eviction_locks.lock(&name);
            let path = self.root.join(&name);

            let still_stale = fs::symlink_metadata(&path)
                .map(|m| m.is_file() && m.modified().map(|t| t <= listed_mtime).unwrap_or(true))
                .unwrap_or(false);
            if !still_stale {
                report.skipped.push(name);
                continue;
            }

            match remove(&path) {
                Ok(()) => {
                    tracing::debug!(file = %name, "evicted cached artifact");
                    report.deleted.push(name);
                }
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "failed to evict cached artifact");
                    report.failed.push(name);
                }
            }
        }

        tracing::info!(
            scanned = report.scanned,
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "eviction sweep finished"
        );
        Ok(report)
    }

    fn sweep(&self) {
        if let Err(e) = self.evict() {
            tracing::warn!(error = %e, "eviction sweep failed");
        }
        self.download_locks.purge_expired();
        self.eviction_locks.purge_expired();
    }

    /// Start the background eviction sweeper. Calling it twice is a no-op.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            return Ok(());
        }

        let (stop, stopped) = mpsc::channel::<()>();
        let cache = Arc::downgrade(self);
        let period = self.eviction_period;

        let handle = thread::Builder::new()
            .name("courier-cache-eviction".to_string())
            .spawn(move || loop {
                match stopped.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => match cache.upgrade() {
                        Some(cache) => cache.sweep(),
                        None => break,
                    },
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|e| io_error(e, "spawn eviction sweeper".to_string()))?;

        tracing::info!(period_secs = period.as_secs(), root = %self.root.display(), "eviction sweeper started");
        *sweeper = Some(Sweeper { stop, handle });
        Ok(())
    }

    /// Stop the sweeper and wait for it to exit.
    pub fn stop(&self) {
        let Some(sweeper) = self.sweeper.lock().take() else {
            return;
        };
        let _ = sweeper.stop.send(());
        if sweeper.handle.join().is_err() {
            tracing::warn!("eviction sweeper panicked");
        }
    }

    pub fn is_running(&self) -> bool {
        self.sweeper.lock().is_some()
    }

    pub fn status(&self) -> Result<CacheStatus> {
        let mut entries = 0;
        let mut total_bytes = 0;
        match fs::read_dir(&self.root) {
            Ok(listing) => {
                for entry in listing.flatten() {
                    if let Ok(metadata) = entry.metadata() {
                        if metadata.is_file() {
                            entries += 1;
                            total_bytes += metadata.len();
                        }
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_error(e, format!("list {}", self.root.display()))),
        }

        Ok(CacheStatus {
            root_dir: self.root.display().to_string(),
            scratch_dir: self.scratch.display().to_string(),
            entries,
            total_bytes,
            max_cached_artifacts: self.max_entries,
            artifact_file_size_limit: self.size_limit,
        })
    }
}

impl Drop for ArtifactCache {
    fn drop(&mut self) {
        // Signal only; the sweeper may be the thread running this drop.
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            let _ = sweeper.stop.send(());
        }
    }
}

/// Open a cached entry for reading; `None` when it is absent or not a regular file.
fn open_entry(path: &Path) -> Result<Option<File>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error(e, format!("open {}", path.display()))),
    };
    match file.metadata() {
        Ok(metadata) if metadata.is_file() => Ok(Some(file)),
        Ok(_) => Ok(None),
        Err(e) => Err(io_error(e, format!("stat {}", path.display()))),
    }
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove partial download");
        }
    }
}
