//! In-memory response cache with LRU eviction.

use super::{CacheError, CacheStats, ResponseCache};
use crate::object::FileObject;
use crate::response::{BufferedResponse, Response};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

/// Entry in the memory cache.
#[derive(Debug, Clone)]
struct CacheEntry {
    response: BufferedResponse,
    /// Last access time for LRU eviction.
    last_accessed: Instant,
    access_count: u64,
}

impl CacheEntry {
    fn new(response: BufferedResponse) -> Self {
        Self {
            response,
            last_accessed: Instant::now(),
            access_count: 0,
        }
    }

    fn touch(&mut self) {
        self.last_accessed = Instant::now();
        self.access_count += 1;
    }
}

struct CacheState {
    entries: HashMap<String, CacheEntry>,
    size_bytes: usize,
    stats: CacheStats,
}

/// In-memory response cache.
///
/// Provides fast access to recently served responses with LRU eviction when
/// the size budget is exceeded.
pub struct MemoryCache {
    state: Mutex<CacheState>,
    max_size_bytes: usize,
}

impl MemoryCache {
    /// Creates a cache with the given total body-size budget.
    pub fn new(max_size_bytes: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                size_bytes: 0,
                stats: CacheStats::default(),
            }),
            max_size_bytes,
        }
    }

    pub fn entry_count(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    pub fn size_bytes(&self) -> usize {
        self.state.lock().unwrap().size_bytes
    }

    pub fn max_size_bytes(&self) -> usize {
        self.max_size_bytes
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().unwrap().stats.clone()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.entries.clear();
        state.size_bytes = 0;
    }

    /// Evicts least-recently-used entries until `required` bytes fit within
    /// the budget.
    fn evict_until_fits(state: &mut CacheState, max_size_bytes: usize, required: usize) {
        let target = max_size_bytes.saturating_sub(required);

        let mut candidates: Vec<(String, Instant, usize)> = state
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.last_accessed, entry.response.size()))
            .collect();
        candidates.sort_by_key(|(_, accessed, _)| *accessed);

        for (key, _, size) in candidates {
            if state.size_bytes <= target {
                break;
            }
            state.entries.remove(&key);
            state.size_bytes -= size;
            state.stats.record_eviction();
        }
    }
}

impl ResponseCache for MemoryCache {
    fn get(&self, obj: &FileObject) -> Option<Response> {
        let mut state = self.state.lock().unwrap();

        match state.entries.get_mut(&obj.key) {
            Some(entry) => {
                entry.touch();
                let response = entry.response.clone();
                state.stats.record_hit();
                Some(response.into_response())
            }
            None => {
                state.stats.record_miss();
                None
            }
        }
    }

    fn set(&self, obj: &FileObject, response: BufferedResponse) -> Result<(), CacheError> {
        let size = response.size();
        if size > self.max_size_bytes {
            return Err(CacheError::TooLarge {
                size,
                capacity: self.max_size_bytes,
            });
        }

        let mut state = self.state.lock().unwrap();

        // replacing an entry returns its bytes to the budget first
        if let Some(old) = state.entries.remove(&obj.key) {
            state.size_bytes -= old.response.size();
        }

        if state.size_bytes + size > self.max_size_bytes {
            Self::evict_until_fits(&mut state, self.max_size_bytes, size);
        }

        state.entries.insert(obj.key.clone(), CacheEntry::new(response));
        state.size_bytes += size;
        Ok(())
    }

    fn delete(&self, obj: &FileObject) {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.entries.remove(&obj.key) {
            state.size_bytes -= entry.response.size();
        }
    }
}
