//! No-op lock for deployments that disable request collapsing.

use super::{Lock, LockOutcome};
use crate::response::Response;

/// A lock that every caller wins. Nothing is broadcast and nothing waits.
#[derive(Debug, Default)]
pub struct NopLock;

impl NopLock {
    pub fn new() -> Self {
        Self
    }
}

impl Lock for NopLock {
    fn lock(&self, _key: &str) -> LockOutcome {
        LockOutcome::Acquired
    }

    fn release(&self, _key: &str) {}

    async fn notify_and_release(&self, _key: &str, _response: &mut Response) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_caller_wins() {
        let lock = NopLock::new();
        assert!(lock.lock("/a.jpg").is_acquired());
        assert!(lock.lock("/a.jpg").is_acquired());

        let mut res = Response::new(200);
        lock.notify_and_release("/a.jpg", &mut res).await;
        lock.release("/a.jpg");
    }
}
