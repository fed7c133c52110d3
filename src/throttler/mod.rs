//! Token-bounded gate for expensive transform work.
//!
//! Transforms are CPU-heavy; the throttler caps how many run concurrently
//! across all requests. Acquisition is cancellation-aware: a request whose
//! context expires while queued gives up instead of holding a slot for a
//! client that is gone.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// A counting-semaphore gate with fixed capacity.
#[derive(Debug)]
pub struct Throttler {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Throttler {
    /// Creates a throttler with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "throttler capacity must be > 0");
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Takes one token, waiting until one is available or `cancel` fires.
    ///
    /// Returns `None` when the context was canceled first. The token is
    /// released when the permit drops, so it survives every exit path of the
    /// caller.
    pub async fn take(&self, cancel: &CancellationToken) -> Option<ThrottlePermit<'_>> {
        // probe first: when a token and the cancellation are both ready the
        // select below picks either, and a canceled request must not win
        if cancel.is_cancelled() {
            return None;
        }

        let permit = tokio::select! {
            _ = cancel.cancelled() => return None,
            permit = self.semaphore.clone().acquire_owned() => permit.ok()?,
        };

        let current = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.update_peak(current);

        Some(ThrottlePermit {
            _permit: permit,
            in_flight: &self.in_flight,
        })
    }

    fn update_peak(&self, current: usize) {
        let mut peak = self.peak_in_flight.load(Ordering::Relaxed);
        while current > peak {
            match self.peak_in_flight.compare_exchange_weak(
                peak,
                current,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(p) => peak = p,
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tokens currently held.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Highest number of tokens held at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::Relaxed)
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// A held throttler token. Dropping it returns the token.
pub struct ThrottlePermit<'a> {
    _permit: OwnedSemaphorePermit,
    in_flight: &'a AtomicUsize,
}

impl Drop for ThrottlePermit<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}
