use dashmap::DashMap;
use parking_lot::{Mutex, RawMutex};
use parking_lot::lock_api::ArcMutexGuard;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub type KeyGuard = ArcMutexGuard<RawMutex, ()>;

/// Acquisitions between passive purges, so the registry stays bounded without a sweeper.
const PURGE_EVERY: usize = 256;

struct LockEntry {
    lock: Arc<Mutex<()>>,
    last_access: Instant,
}

/// Per-key mutexes created on first use and expired after `ttl` of inactivity.
///
/// An entry is only dropped while nobody holds or waits on its mutex, so every
/// caller contending on a key shares one mutex for as long as any of them needs it.
pub struct LockRegistry {
    name: &'static str,
    ttl: Duration,
    entries: DashMap<String, LockEntry>,
    acquisitions: AtomicUsize,
}

impl LockRegistry {
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            entries: DashMap::new(),
            acquisitions: AtomicUsize::new(0),
        }
    }

    /// Block until `key` is held by this caller.
    pub fn lock(&self, key: &str) -> KeyGuard {
        if (self.acquisitions.fetch_add(1, Ordering::Relaxed) + 1) % PURGE_EVERY == 0 {
            self.purge_expired();
        }
        let lock = {
            let mut entry = self
                .entries
                .entry(key.to_string())
                .or_insert_with(|| LockEntry {
                    lock: Arc::new(Mutex::new(())),
                    last_access: Instant::now(),
                });
            entry.last_access = Instant::now();
            Arc::clone(&entry.lock)
        };
        // The shard guard is released above; waiting here never blocks other keys.
        lock.lock_arc()
    }

    /// Drop idle entries past their TTL. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            Arc::strong_count(&entry.lock) > 1 || entry.last_access.elapsed() < self.ttl
        });
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(registry = self.name, removed, "expired idle locks");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
