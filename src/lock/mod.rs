//! Request collapsing (single-flight) locks.
//!
//! Concurrent requests for the same derivative key coalesce onto one worker:
//! the first caller to acquire the lock performs the work and broadcasts the
//! result; everyone else waits for the broadcast. Because response bodies
//! are one-shot streams, the broadcast carries a [`BufferedResponse`] so
//! each waiter receives an independent re-streamable view.
//!
//! Invariants:
//! - at most one winner per key at any time
//! - every waiter either receives exactly one response or observes channel
//!   closure (winner released without broadcasting) and retries locally
//! - a waiter withdrawing (dropping its receiver) affects neither the winner
//!   nor the other waiters

mod memory;
mod nop;

pub use memory::{MemoryLock, MemoryLockStats};
pub use nop::NopLock;

use crate::response::{BufferedResponse, Response};
use std::future::Future;
use tokio::sync::broadcast;

/// The result of attempting to acquire a collapse lock.
pub enum LockOutcome {
    /// The caller won the lock and must finish with
    /// [`Lock::notify_and_release`] or [`Lock::release`].
    Acquired,
    /// Another caller holds the lock; wait on the receiver for its result.
    /// Dropping the receiver withdraws interest.
    Waiting(broadcast::Receiver<BufferedResponse>),
}

impl LockOutcome {
    pub fn is_acquired(&self) -> bool {
        matches!(self, LockOutcome::Acquired)
    }
}

/// A single-flight coordinator keyed by string.
pub trait Lock: Send + Sync + 'static {
    /// Attempts to acquire the lock for `key`.
    fn lock(&self, key: &str) -> LockOutcome;

    /// Releases the lock without broadcasting. Waiters observe channel
    /// closure and fall back to doing the work themselves.
    fn release(&self, key: &str);

    /// Broadcasts the winner's response to all current waiters and releases
    /// the lock. The response body is buffered in place so the winner can
    /// still return it; each waiter receives an independent copy.
    fn notify_and_release(
        &self,
        key: &str,
        response: &mut Response,
    ) -> impl Future<Output = ()> + Send;
}
