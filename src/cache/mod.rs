//! The response cache interface.
//!
//! The cache is best-effort: population runs on background tasks, failures
//! are logged and dropped, and eviction is the cache's own business. Entries
//! are stored fully buffered so a hit can mint a fresh response with an
//! independent body.

mod memory;

pub use memory::MemoryCache;

use crate::object::FileObject;
use crate::response::{BufferedResponse, Response};
use thiserror::Error;

/// Errors from cache writes.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("response of {size} bytes exceeds cache capacity {capacity}")]
    TooLarge { size: usize, capacity: usize },
}

/// A size-bounded key-to-response map with asynchronous population.
pub trait ResponseCache: Send + Sync + 'static {
    /// Looks up the cached response for an object.
    fn get(&self, obj: &FileObject) -> Option<Response>;

    /// Stores a buffered response under the object's key.
    fn set(&self, obj: &FileObject, response: BufferedResponse) -> Result<(), CacheError>;

    /// Drops the entry for an object's key, if any.
    fn delete(&self, obj: &FileObject);
}

/// Hit/miss/eviction counters for a response cache.
#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    /// Hit ratio over all lookups, 0.0 to 1.0.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_ratio() {
        let mut stats = CacheStats::default();
        assert_eq!(stats.hit_ratio(), 0.0);

        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();

        assert!((stats.hit_ratio() - 0.75).abs() < 0.001);
    }
}
