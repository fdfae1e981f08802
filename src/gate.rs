use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::foundation::{
    core::ItemId,
    error::{OverlayError, OverlayResult},
};

/// `max(1, round(cpus * multiplier))`.
pub fn permits_for(cpus: usize, multiplier: f64) -> usize {
    let n = (cpus as f64 * multiplier).round();
    if n.is_finite() && n >= 1.0 {
        n as usize
    } else {
        1
    }
}

/// Process-wide bound on compositing plus one exclusive lock per item.
pub struct ConcurrencyGate {
    global: Arc<Semaphore>,
    permits: usize,
    items: DashMap<ItemId, Arc<Mutex<()>>>,
}

/// Both gates held. Fields drop in order: item lock first, then the global permit.
#[must_use = "dropping the guard releases the gate"]
pub struct GateGuard {
    _item: OwnedMutexGuard<()>,
    _global: OwnedSemaphorePermit,
    item: ItemId,
}

impl GateGuard {
    pub fn item(&self) -> ItemId {
        self.item
    }
}

impl std::fmt::Debug for GateGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateGuard").field("item", &self.item).finish()
    }
}

impl ConcurrencyGate {
    pub fn new(permits: usize) -> Self {
        let permits = permits.max(1);
        Self {
            global: Arc::new(Semaphore::new(permits)),
            permits,
            items: DashMap::new(),
        }
    }

    /// Sized from the machine's logical CPUs.
    pub fn with_multiplier(multiplier: f64) -> Self {
        Self::new(permits_for(num_cpus::get(), multiplier))
    }

    /// Global permit, then the item's lock. Cancellation while waiting holds nothing.
    pub async fn acquire(&self, item: ItemId, cancel: &CancellationToken) -> OverlayResult<GateGuard> {
        let global = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(OverlayError::Cancelled),
            permit = self.global.clone().acquire_owned() => permit
                .map_err(|_| OverlayError::render("concurrency gate closed"))?,
        };

        let lock = self.items.entry(item).or_default().value().clone();
        let item_guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(OverlayError::Cancelled),
            g = lock.lock_owned() => g,
        };
        tracing::trace!(%item, available = self.global.available_permits(), "gate acquired");
        Ok(GateGuard {
            _item: item_guard,
            _global: global,
            item,
        })
    }

    pub fn permits(&self) -> usize {
        self.permits
    }

    pub fn available_permits(&self) -> usize {
        self.global.available_permits()
    }

    /// Number of per-item locks currently in the table.
    pub fn item_locks(&self) -> usize {
        self.items.len()
    }

    /// Drop per-item locks nobody holds or waits on. Returns how many went.
    pub fn prune_idle(&self) -> usize {
        let before = self.items.len();
        self.items.retain(|_, lock| Arc::strong_count(lock) > 1);
        before.saturating_sub(self.items.len())
    }
}

#[cfg(test)]
#[path = "../tests/unit/gate.rs"]
mod tests;
