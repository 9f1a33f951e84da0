//! FILENAME: core/cube-engine/src/cache.rs
//! Result Cache - bounded LRU with per-entry TTL.
//!
//! Keys are canonical fingerprints of (cube, normalized query, plan
//! strategy): the fingerprint document is converted to a serde_json Value,
//! whose object map is ordered by key, so payload key order can never
//! produce a second cache entry for the same question. Keys are prefixed
//! with the cube name so a cube-wide invalidation is a prefix sweep.
//!
//! The cache is one shared mutable resource; the engine guards it with a
//! single Mutex covering entries and counters alike. Nothing in here blocks
//! on I/O.

use crate::error::{EngineError, EngineResult};
use crate::normalize::NormalizedQuery;
use crate::plan::QueryPlan;
use crate::response::ResultDocument;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// Counter snapshot reported in response metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

#[derive(Debug, Clone)]
struct CachedEntry {
    document: ResultDocument,
    stored_at: Instant,
}

/// Bounded, TTL-governed store of finished result documents.
pub struct QueryCache {
    entries: LruCache<String, CachedEntry>,
    ttl: Duration,
    hits: u64,
    misses: u64,
}

impl QueryCache {
    pub fn new(max: usize, ttl_ms: u64) -> Self {
        let capacity = NonZeroUsize::new(max).unwrap_or(NonZeroUsize::MIN);
        QueryCache {
            entries: LruCache::new(capacity),
            ttl: Duration::from_millis(ttl_ms),
            hits: 0,
            misses: 0,
        }
    }

    /// Looks up a key, evicting it first when its TTL has lapsed. A live hit
    /// refreshes LRU recency. Counters are NOT touched here; the engine
    /// records hit/miss only once a request has actually succeeded.
    pub fn get(&mut self, key: &str) -> Option<ResultDocument> {
        let expired = match self.entries.peek(key) {
            Some(entry) => entry.stored_at.elapsed() >= self.ttl,
            None => return None,
        };
        if expired {
            self.entries.pop(key);
            return None;
        }
        self.entries.get(key).map(|entry| entry.document.clone())
    }

    /// Stores a finished document under its fingerprint.
    pub fn insert(&mut self, key: String, document: ResultDocument) {
        self.entries.put(
            key,
            CachedEntry {
                document,
                stored_at: Instant::now(),
            },
        );
    }

    /// Milliseconds of TTL left for a resident, unexpired key.
    pub fn remaining_ttl_ms(&self, key: &str) -> Option<u64> {
        let entry = self.entries.peek(key)?;
        let elapsed = entry.stored_at.elapsed();
        if elapsed >= self.ttl {
            return None;
        }
        Some((self.ttl - elapsed).as_millis() as u64)
    }

    /// Evicts every entry belonging to a cube. Returns the eviction count.
    pub fn invalidate_cube(&mut self, cube: &str) -> usize {
        let prefix = format!("{}::", cube);
        let doomed: Vec<String> = self
            .entries
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            self.entries.pop(key);
        }
        doomed.len()
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits,
            misses: self.misses,
            size: self.entries.len(),
        }
    }
}

/// Canonical cache key for (cube, normalized query, plan).
///
/// serde_json's object map orders keys, so serializing through `Value`
/// canonicalizes the document regardless of struct field order or the key
/// order of the inbound payload. The cube name is repeated as a plain
/// prefix to make per-cube invalidation a string match.
pub fn fingerprint(cube: &str, query: &NormalizedQuery, plan: &QueryPlan) -> EngineResult<String> {
    let query_value =
        serde_json::to_value(query).map_err(|e| EngineError::Internal(e.to_string()))?;
    let plan_value =
        serde_json::to_value(plan.strategy).map_err(|e| EngineError::Internal(e.to_string()))?;

    let mut doc = serde_json::Map::new();
    doc.insert("cube".to_string(), Value::String(cube.to_string()));
    doc.insert("query".to_string(), query_value);
    doc.insert("plan".to_string(), plan_value);

    Ok(format!("{}::{}", cube, Value::Object(doc)))
}
