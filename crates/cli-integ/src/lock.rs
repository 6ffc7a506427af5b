//! Named exclusive locks that serialize tests contending for a scarce
//! shared resource.
//!
//! A lock is held in two layers: an async mutex shared by every task in this
//! process, then an advisory file lock shared by every process using the same
//! lock directory. Guards release on drop.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use fs2::FileExt;
use tokio::sync::OwnedMutexGuard;

use crate::error::{HarnessError, Result};

type LocalLocks = Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>;

static LOCAL_LOCKS: OnceLock<LocalLocks> = OnceLock::new();

fn local_lock(path: &Path) -> Arc<tokio::sync::Mutex<()>> {
    let registry = LOCAL_LOCKS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut map = registry.lock().unwrap_or_else(|p| p.into_inner());
    Arc::clone(map.entry(path.to_path_buf()).or_default())
}

/// A held named lock.
#[derive(Debug)]
pub struct LockGuard {
    name: String,
    file: File,
    acquired_at: Instant,
    _local: OwnedMutexGuard<()>,
}

impl LockGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        tracing::debug!(
            lock = %self.name,
            held_ms = self.acquired_at.elapsed().as_millis() as u64,
            "lock released"
        );
    }
}

/// Wait for exclusive ownership of `name` under `lock_dir`.
pub async fn acquire(lock_dir: &Path, name: &str) -> Result<LockGuard> {
    let path = integ_core::paths::lock_file(lock_dir, name)?;
    integ_core::io::ensure_dir(lock_dir)?;

    let waiting_since = Instant::now();
    let local = local_lock(&path).lock_owned().await;

    let lock_path = path.clone();
    let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        file.lock_exclusive()?;
        Ok(file)
    })
    .await
    .map_err(|e| HarnessError::Lock {
        name: name.to_string(),
        source: std::io::Error::other(e),
    })?
    .map_err(|source| HarnessError::Lock {
        name: name.to_string(),
        source,
    })?;

    tracing::debug!(
        lock = %name,
        waited_ms = waiting_since.elapsed().as_millis() as u64,
        "lock acquired"
    );
    Ok(LockGuard {
        name: name.to_string(),
        file,
        acquired_at: Instant::now(),
        _local: local,
    })
}

/// Several held locks, released in reverse acquisition order.
#[derive(Debug, Default)]
pub struct LockSet {
    guards: Vec<LockGuard>,
}

impl LockSet {
    /// Acquire every lock in sorted order, so overlapping sets cannot deadlock.
    pub async fn acquire_all(lock_dir: &Path, names: &[String]) -> Result<Self> {
        let mut sorted: Vec<&String> = names.iter().collect();
        sorted.sort();
        sorted.dedup();

        let mut set = Self::default();
        for name in sorted {
            set.guards.push(acquire(lock_dir, name).await?);
        }
        Ok(set)
    }

    pub fn names(&self) -> Vec<&str> {
        self.guards.iter().map(LockGuard::name).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

impl Drop for LockSet {
    fn drop(&mut self) {
        while let Some(guard) = self.guards.pop() {
            drop(guard);
        }
    }
}
