//! In-memory single-flight lock.
//!
//! Uses `DashMap` for lock-free concurrent access to the in-flight table and
//! a tokio broadcast channel per key for the result fan-out. Statistics use
//! atomic counters.

use super::{Lock, LockOutcome};
use crate::response::{BufferedResponse, Response};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Broadcast capacity per key. A key only ever sees one message; the extra
/// slots absorb a waiter that subscribes between send and drop.
const CHANNEL_CAPACITY: usize = 4;

/// Tracks in-flight keys so duplicate requests wait for the first worker's
/// result instead of repeating the work.
pub struct MemoryLock {
    /// In-flight work: key -> broadcast sender for the result.
    in_flight: DashMap<String, broadcast::Sender<BufferedResponse>>,
    total_locks: AtomicU64,
    collapsed: AtomicU64,
    winners: AtomicU64,
}

/// Counters for monitoring collapse effectiveness.
#[derive(Debug, Default, Clone)]
pub struct MemoryLockStats {
    pub total_locks: u64,
    /// Lock attempts that joined in-flight work.
    pub collapsed: u64,
    /// Lock attempts that won and performed the work.
    pub winners: u64,
}

impl MemoryLock {
    pub fn new() -> Self {
        Self {
            in_flight: DashMap::new(),
            total_locks: AtomicU64::new(0),
            collapsed: AtomicU64::new(0),
            winners: AtomicU64::new(0),
        }
    }

    /// Number of keys currently locked.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> MemoryLockStats {
        MemoryLockStats {
            total_locks: self.total_locks.load(Ordering::Relaxed),
            collapsed: self.collapsed.load(Ordering::Relaxed),
            winners: self.winners.load(Ordering::Relaxed),
        }
    }
}

impl Default for MemoryLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Lock for MemoryLock {
    fn lock(&self, key: &str) -> LockOutcome {
        self.total_locks.fetch_add(1, Ordering::Relaxed);

        // entry API gives an atomic check-and-insert, so two racing callers
        // cannot both win
        match self.in_flight.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                let rx = entry.get().subscribe();
                self.collapsed.fetch_add(1, Ordering::Relaxed);
                debug!(key, "joining in-flight request");
                LockOutcome::Waiting(rx)
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
                entry.insert(tx);
                self.winners.fetch_add(1, Ordering::Relaxed);
                debug!(key, in_flight = self.in_flight.len(), "lock acquired");
                LockOutcome::Acquired
            }
        }
    }

    fn release(&self, key: &str) {
        // dropping the sender closes the channel; waiters fall back to the
        // direct path
        if self.in_flight.remove(key).is_some() {
            debug!(key, "lock released without broadcast");
        }
    }

    async fn notify_and_release(&self, key: &str, response: &mut Response) {
        let Some((_, tx)) = self.in_flight.remove(key) else {
            return;
        };
        if tx.receiver_count() == 0 {
            return;
        }
        match response.to_buffered().await {
            Ok(buffered) => {
                let waiters = tx.receiver_count();
                let _ = tx.send(buffered);
                debug!(key, waiters, "broadcast response to waiters");
            }
            Err(err) => {
                // the sender drops here, closing the channel; waiters retry
                // locally
                warn!(key, error = %err, "failed to buffer response for broadcast");
            }
        }
    }
}
