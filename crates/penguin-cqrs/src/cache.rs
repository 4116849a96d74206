// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! Query result cache.
//!
//! Entries are keyed by query kind, engine tick and a filter string. Any
//! successful command bumps the generation, which empties the cache; a key
//! never outlives the generation it was computed in.

use std::collections::HashMap;
use std::sync::Arc;

use crate::query::QueryData;

/// Default maximum number of cached results.
pub const DEFAULT_QUERY_CACHE_CAPACITY: usize = 256;

/// Cache key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Query tag.
    pub kind: &'static str,
    /// Engine tick the result was computed at.
    pub tick: u64,
    /// Query parameters, rendered.
    pub filter: String,
}

/// Hit/miss counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that had to compute.
    pub misses: u64,
    /// Current generation.
    pub generation: u64,
    /// Entries currently cached.
    pub entries: usize,
}

/// Generation-scoped memo table for query results.
#[derive(Debug)]
pub struct QueryCache {
    entries: HashMap<CacheKey, Arc<QueryData>>,
    capacity: usize,
    generation: u64,
    hits: u64,
    misses: u64,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_CACHE_CAPACITY)
    }
}

impl QueryCache {
    /// Cache holding at most `capacity` results. A capacity of zero disables
    /// caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity,
            generation: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Cached result for `key`, counting the hit or miss.
    pub fn get(&mut self, key: &CacheKey) -> Option<Arc<QueryData>> {
        let found = self.entries.get(key).cloned();
        if found.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        found
    }

    /// Stores a result. When full, the whole table is dropped first.
    pub fn insert(&mut self, key: CacheKey, data: Arc<QueryData>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() >= self.capacity {
            self.entries.clear();
        }
        self.entries.insert(key, data);
    }

    /// Starts a new generation, discarding every cached result.
    pub fn invalidate(&mut self) {
        self.generation += 1;
        self.entries.clear();
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            generation: self.generation,
            entries: self.entries.len(),
        }
    }
}
