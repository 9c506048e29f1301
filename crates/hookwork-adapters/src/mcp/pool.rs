use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hookwork_runtime::HookError;
use tokio::sync::Semaphore;
use tracing::debug;

/// Default number of tool-server calls allowed in flight at once
pub const DEFAULT_POOL_WIDTH: usize = 5;

/// Process-wide cap on in-flight tool-server calls. Excess work waits FIFO.
pub struct ConcurrencyPool {
    semaphore: Arc<Semaphore>,
    width: usize,
    queued: AtomicUsize,
    in_flight: AtomicUsize,
}

/// Decrements a counter when dropped, so cancelled work is still accounted for
struct CountGuard<'a>(&'a AtomicUsize);

impl<'a> CountGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for CountGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyPool {
    pub fn new(width: usize) -> Self {
        let width = width.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(width)),
            width,
            queued: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Run `work` once a slot is free
    pub async fn run<F, T>(&self, work: F) -> Result<T, HookError>
    where
        F: Future<Output = T>,
    {
        let permit = {
            let _waiting = CountGuard::enter(&self.queued);
            self.semaphore
                .acquire()
                .await
                .map_err(|_| HookError::ActionFailed("Tool-server pool is closed".to_string()))?
        };

        let _running = CountGuard::enter(&self.in_flight);
        debug!(in_flight = self.in_flight(), queued = self.queued(), "Tool-server slot acquired");
        let output = work.await;
        drop(permit);
        Ok(output)
    }
}

impl Default for ConcurrencyPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_WIDTH)
    }
}
