//! FILENAME: core/cube-engine/src/engine.rs
//! Engine Facade - the process-wide entry point.
//!
//! An OlapEngine owns the cube registry, the result cache, and the
//! invalidation listeners; there are no module-level singletons. Requests
//! may execute in parallel: registry reads share a RwLock read guard,
//! registration takes the write guard, and the cache (entries plus
//! counters) sits behind one Mutex.
//!
//! Failure isolation: a query that errors leaves the cache, its counters,
//! and the registry exactly as they were. Hit/miss counters are recorded
//! only once a request has produced (or reused) a result.

use crate::cache::{fingerprint, QueryCache};
use crate::definition::CubeDefinition;
use crate::error::{EngineError, EngineResult};
use crate::execute::execute_plan;
use crate::normalize::normalize;
use crate::plan::choose_plan;
use crate::query::QueryPayload;
use crate::registry::CubeRegistry;
use crate::response::{assemble, CacheInfo, ResultDocument};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, RwLock};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Result-cache sizing knobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    /// Maximum resident entries.
    pub max: usize,
    /// Per-entry time to live, in milliseconds.
    pub ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max: default_cache_max(),
            ttl_ms: default_cache_ttl_ms(),
        }
    }
}

fn default_cache_max() -> usize {
    200
}

fn default_cache_ttl_ms() -> u64 {
    30_000
}

/// Full engine configuration surface.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
}

// ============================================================================
// INVALIDATION EVENTS
// ============================================================================

/// Emitted when an external trigger (typically the data loader) evicts a
/// cube's cache entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationEvent {
    pub cube: String,
    pub reason: String,
    /// Number of cache entries removed by this invalidation.
    pub evicted: usize,
}

type InvalidationListener = Box<dyn Fn(&InvalidationEvent) + Send + Sync>;

// ============================================================================
// ENGINE
// ============================================================================

/// The engine instance: registry + cache + listeners.
pub struct OlapEngine {
    config: EngineConfig,
    registry: RwLock<CubeRegistry>,
    cache: Mutex<QueryCache>,
    listeners: Mutex<Vec<InvalidationListener>>,
    events: Mutex<Vec<InvalidationEvent>>,
}

impl Default for OlapEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl OlapEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        OlapEngine {
            config,
            registry: RwLock::new(CubeRegistry::new()),
            cache: Mutex::new(QueryCache::new(config.cache.max, config.cache.ttl_ms)),
            listeners: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // REGISTRY OPERATIONS
    // ========================================================================

    /// Validates and registers a cube definition, materializing its
    /// pre-aggregates. Rejects duplicate names.
    pub fn register_cube(&self, definition: CubeDefinition) -> EngineResult<()> {
        let mut registry = self
            .registry
            .write()
            .map_err(|_| EngineError::Internal("registry lock poisoned".to_string()))?;
        registry.register(definition)?;
        Ok(())
    }

    /// Registered cube names, sorted.
    pub fn list_cubes(&self) -> Vec<String> {
        self.registry
            .read()
            .map(|registry| registry.list())
            .unwrap_or_default()
    }

    /// The stored definition of a registered cube.
    pub fn get_cube(&self, name: &str) -> EngineResult<CubeDefinition> {
        let registry = self
            .registry
            .read()
            .map_err(|_| EngineError::Internal("registry lock poisoned".to_string()))?;
        Ok(registry.get(name)?.definition.clone())
    }

    // ========================================================================
    // QUERY EXECUTION
    // ========================================================================

    /// Normalizes, plans, and executes a query, consulting the result cache.
    /// Synchronous; runs to completion once started.
    pub fn execute(&self, payload: &QueryPayload) -> EngineResult<ResultDocument> {
        let cube = {
            let registry = self
                .registry
                .read()
                .map_err(|_| EngineError::Internal("registry lock poisoned".to_string()))?;
            registry.get(&payload.cube)?
        };

        let query = normalize(&cube, payload)?;
        let plan = choose_plan(&query);
        let key = fingerprint(cube.name(), &query, &plan)?;

        // Cache probe. A concurrent cold-start may compute twice; the second
        // insert simply overwrites the first.
        {
            let mut cache = self
                .cache
                .lock()
                .map_err(|_| EngineError::Internal("cache lock poisoned".to_string()))?;
            if let Some(mut document) = cache.get(&key) {
                cache.record_hit();
                document.metadata.cache = CacheInfo {
                    hit: true,
                    key: key.clone(),
                    ttl_remaining_ms: cache.remaining_ttl_ms(&key),
                    stats: cache.stats(),
                };
                return Ok(document);
            }
        }

        let data = execute_plan(&cube, &query, &plan)?;

        let mut cache = self
            .cache
            .lock()
            .map_err(|_| EngineError::Internal("cache lock poisoned".to_string()))?;
        cache.record_miss();
        let document = assemble(&cube, &query, plan, data, key.clone(), cache.stats());
        cache.insert(key, document.clone());
        Ok(document)
    }

    // ========================================================================
    // INVALIDATION
    // ========================================================================

    /// Evicts every cached result for a cube and notifies listeners.
    /// The registered definition itself stays; only cached answers go.
    pub fn invalidate_cube(&self, name: &str, reason: &str) -> EngineResult<InvalidationEvent> {
        {
            let registry = self
                .registry
                .read()
                .map_err(|_| EngineError::Internal("registry lock poisoned".to_string()))?;
            if !registry.contains(name) {
                return Err(EngineError::CubeNotFound(name.to_string()));
            }
        }

        let evicted = {
            let mut cache = self
                .cache
                .lock()
                .map_err(|_| EngineError::Internal("cache lock poisoned".to_string()))?;
            cache.invalidate_cube(name)
        };

        let event = InvalidationEvent {
            cube: name.to_string(),
            reason: reason.to_string(),
            evicted,
        };

        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
        if let Ok(listeners) = self.listeners.lock() {
            for listener in listeners.iter() {
                listener(&event);
            }
        }

        Ok(event)
    }

    /// Subscribes to invalidation events.
    pub fn on_invalidation(&self, listener: impl Fn(&InvalidationEvent) + Send + Sync + 'static) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(Box::new(listener));
        }
    }

    /// Current hit/miss/size counters of the result cache.
    pub fn cache_stats(&self) -> EngineResult<crate::cache::CacheStatsSnapshot> {
        let cache = self
            .cache
            .lock()
            .map_err(|_| EngineError::Internal("cache lock poisoned".to_string()))?;
        Ok(cache.stats())
    }

    /// Every invalidation recorded since the engine was built.
    pub fn invalidation_events(&self) -> Vec<InvalidationEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}
