//! LRU cache for enforcement decisions
//!
//! Keyed by matcher key and request values. The enforcer clears it after every
//! successful policy mutation, so entries never outlive the state they were
//! computed from.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    matcher: String,
    request: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    decision: bool,
    inserted: Instant,
}

/// LRU cache of enforcement decisions
pub struct DecisionCache {
    cache: LruCache<CacheKey, CacheEntry>,
    ttl: Option<Duration>,
}

impl DecisionCache {
    /// Cache holding at most `capacity` decisions (a zero capacity holds one)
    pub fn new(capacity: usize) -> Self {
        DecisionCache {
            cache: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            ttl: None,
        }
    }

    /// Entries older than `ttl` are treated as missing
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Get cached decision
    pub fn get(&mut self, matcher: &str, request: &[String]) -> Option<bool> {
        let key = CacheKey {
            matcher: matcher.to_string(),
            request: request.to_vec(),
        };
        let entry = *self.cache.get(&key)?;

        if let Some(ttl) = self.ttl {
            if entry.inserted.elapsed() > ttl {
                self.cache.pop(&key);
                return None;
            }
        }

        Some(entry.decision)
    }

    /// Put decision in cache
    pub fn put(&mut self, matcher: &str, request: &[String], decision: bool) {
        let key = CacheKey {
            matcher: matcher.to_string(),
            request: request.to_vec(),
        };
        self.cache.put(
            key,
            CacheEntry {
                decision,
                inserted: Instant::now(),
            },
        );
    }

    /// Clear the cache
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl std::fmt::Debug for DecisionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionCache")
            .field("len", &self.cache.len())
            .field("capacity", &self.cache.cap())
            .field("ttl", &self.ttl)
            .finish()
    }
}
