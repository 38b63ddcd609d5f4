use crate::error::{DispatchError, Result};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// Bounds concurrent in-flight operations for one adapter instance.
///
/// Waiters are granted slots strictly in arrival order (the underlying
/// semaphore is fair). There is no acquire timeout: the backlog is
/// memory-bounded, not time-bounded.
pub struct Gate {
    semaphore: Arc<Semaphore>,
    limit: usize,
    running: Arc<AtomicUsize>,
    pending: Arc<AtomicUsize>,
}

/// One slot held by an in-progress operation. Dropping it releases the slot,
/// so the acquire/release counts balance on every exit path, including
/// cancellation mid-await.
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    running: Arc<AtomicUsize>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Gate {
    pub fn new(limit: usize) -> Result<Self> {
        if limit < 1 {
            return Err(DispatchError::Config(
                "concurrency limit must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            running: Arc::new(AtomicUsize::new(0)),
            pending: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Suspend until fewer than `limit` operations are active, then claim a
    /// slot. FIFO with respect to other callers on the same gate.
    ///
    /// A free slot is claimed without ever registering as pending, so
    /// `pending() > 0` only while the gate is actually saturated.
    pub async fn acquire(&self) -> GatePermit {
        let permit = match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => permit,
            // The semaphore is owned by the gate and never closed.
            Err(TryAcquireError::Closed) => unreachable!("gate semaphore closed"),
            Err(TryAcquireError::NoPermits) => return self.acquire_slow().await,
        };

        self.running.fetch_add(1, Ordering::SeqCst);
        GatePermit {
            _permit: permit,
            running: Arc::clone(&self.running),
        }
    }

    async fn acquire_slow(&self) -> GatePermit {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let pending_guard = PendingGuard(Arc::clone(&self.pending));

        let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => unreachable!("gate semaphore closed"),
        };

        self.running.fetch_add(1, Ordering::SeqCst);
        drop(pending_guard);

        GatePermit {
            _permit: permit,
            running: Arc::clone(&self.running),
        }
    }

    /// Acquire, run `task`, release — on both normal return and error.
    pub async fn run_exclusive<T, F, Fut>(&self, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _permit = self.acquire().await;
        task().await
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Callers currently suspended waiting for a slot.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Operations currently holding a slot.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }
}
