//! A pool of interchangeable resources (regions) handed out exclusively.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{HarnessError, Result};

struct PoolInner {
    free: Mutex<Vec<String>>,
    permits: Arc<Semaphore>,
    size: usize,
}

/// Hands out each resource to at most one holder at a time.
#[derive(Clone)]
pub struct ResourcePool {
    inner: Arc<PoolInner>,
}

impl ResourcePool {
    pub fn new<I, S>(resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut free: Vec<String> = resources
            .into_iter()
            .map(Into::into)
            .filter(|r: &String| seen.insert(r.clone()))
            .collect();
        // Leases are popped from the back; keep the first-listed resource first out.
        free.reverse();
        let size = free.len();
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(free),
                permits: Arc::new(Semaphore::new(size)),
                size,
            }),
        }
    }

    pub fn size(&self) -> usize {
        self.inner.size
    }

    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Wait for a free resource.
    pub async fn take(&self) -> Result<Lease> {
        if self.inner.size == 0 {
            return Err(HarnessError::EmptyPool);
        }
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| HarnessError::EmptyPool)?;
        let value = self
            .inner
            .free
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop()
            .ok_or(HarnessError::EmptyPool)?;
        tracing::debug!(resource = %value, "leased");
        Ok(Lease {
            value,
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }
}

/// Exclusive use of one pooled resource; returned to the pool on drop.
pub struct Lease {
    value: String,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl Lease {
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Lease").field(&self.value).finish()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        // Runs before the permit field drops, so the value is back in the
        // free list by the time a waiter wakes.
        if let Ok(mut free) = self.pool.free.lock() {
            free.push(std::mem::take(&mut self.value));
        }
    }
}

static REGION_POOL: OnceLock<ResourcePool> = OnceLock::new();

/// Process-wide region pool, built from the first caller's region list.
pub fn region_pool(regions: &[String]) -> &'static ResourcePool {
    REGION_POOL.get_or_init(|| {
        tracing::debug!(regions = ?regions, "initialising region pool");
        ResourcePool::new(regions.iter().cloned())
    })
}
