//! TTL cache for per-code fetch results.
//!
//! The backend is a capability boundary: every method returns a `Result`
//! and [`OpportunitiesCache`] downgrades any backend failure to a miss
//! with a warning. A broken cache slows the pipeline down; it never
//! breaks it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use sha2::{Digest, Sha256};

use samgov_api::types::FetchResult;

use crate::resolver::ResolvedQuerySpec;

/// Namespace prefix for all cache keys.
pub const CACHE_PREFIX: &str = "sam_opportunities";

/// Fixed time-to-live for every cached response.
pub const CACHE_TTL: Duration = Duration::from_secs(900);

#[derive(Debug, thiserror::Error)]
#[error("cache backend error: {0}")]
pub struct CacheBackendError(pub String);

/// Key-value storage with per-entry TTL. Implementations must be safe to
/// share across threads; the common in-memory backend is below, and a
/// deployment can substitute Redis or similar.
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CacheBackendError>;
    fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheBackendError>;
    /// Returns whether a live entry was present.
    fn forget(&self, key: &str) -> Result<bool, CacheBackendError>;
}

struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// Thread-safe in-memory backend. Expired entries are lazily evicted on
/// the next `get` for that key.
#[derive(Default)]
pub struct MemoryCacheBackend {
    store: DashMap<String, MemoryEntry>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheBackend for MemoryCacheBackend {
    fn get(&self, key: &str) -> Result<Option<String>, CacheBackendError> {
        let Some(entry) = self.store.get(key) else {
            return Ok(None);
        };
        if Instant::now() > entry.expires_at {
            drop(entry);
            self.store.remove(key);
            return Ok(None);
        }
        Ok(Some(entry.value.clone()))
    }

    fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheBackendError> {
        self.store.insert(
            key.to_string(),
            MemoryEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    fn forget(&self, key: &str) -> Result<bool, CacheBackendError> {
        Ok(self.store.remove(key).is_some())
    }
}

/// Content-addressed cache of [`FetchResult`]s keyed by classification
/// code plus the resolved parameters that shape the upstream call.
pub struct OpportunitiesCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl OpportunitiesCache {
    /// Cache over the in-memory backend with the standard TTL.
    pub fn in_memory() -> Self {
        Self::with_backend(Arc::new(MemoryCacheBackend::new()))
    }

    pub fn with_backend(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            ttl: CACHE_TTL,
        }
    }

    /// Stable composite key: prefix, code, and a SHA-256 of the canonical
    /// parameter serialization. `limit` and `bypass_cache` are excluded
    /// from that serialization, so they never fragment the cache.
    pub fn cache_key(code: &str, spec: &ResolvedQuerySpec) -> String {
        let mut hasher = Sha256::new();
        hasher.update(spec.cache_key_params().as_bytes());
        format!("{}:{}:{}", CACHE_PREFIX, code, hex::encode(hasher.finalize()))
    }

    /// Cached result for `(code, spec)`, with `cached` forced true.
    /// Backend failures and undecodable entries degrade to a miss.
    pub fn get(&self, code: &str, spec: &ResolvedQuerySpec) -> Option<FetchResult> {
        let key = Self::cache_key(code, spec);
        let stored = match self.backend.get(&key) {
            Ok(stored) => stored?,
            Err(e) => {
                tracing::warn!("Cache read failed for code {}: {}", code, e);
                return None;
            }
        };
        match serde_json::from_str::<FetchResult>(&stored) {
            Ok(mut result) => {
                result.cached = true;
                Some(result)
            }
            Err(e) => {
                tracing::warn!("Discarding undecodable cache entry for code {}: {}", code, e);
                let _ = self.backend.forget(&key);
                None
            }
        }
    }

    /// Stores a result whole. Callers only pass successes; failures must
    /// stay uncached so they retry on the next run.
    pub fn put(&self, code: &str, spec: &ResolvedQuerySpec, result: &FetchResult) -> bool {
        let key = Self::cache_key(code, spec);
        let serialized = match serde_json::to_string(result) {
            Ok(serialized) => serialized,
            Err(e) => {
                tracing::warn!("Failed to serialize result for code {}: {}", code, e);
                return false;
            }
        };
        match self.backend.put(&key, serialized, self.ttl) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Cache write failed for code {}: {}", code, e);
                false
            }
        }
    }

    pub fn has(&self, code: &str, spec: &ResolvedQuerySpec) -> bool {
        self.get(code, spec).is_some()
    }

    pub fn forget(&self, code: &str, spec: &ResolvedQuerySpec) -> bool {
        let key = Self::cache_key(code, spec);
        match self.backend.forget(&key) {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!("Cache invalidation failed for code {}: {}", code, e);
                false
            }
        }
    }

    /// Forgets each code in turn, returning how many calls reported
    /// success. Best effort, not a guarantee that every key existed.
    pub fn forget_multiple(&self, codes: &[String], spec: &ResolvedQuerySpec) -> usize {
        codes
            .iter()
            .filter(|code| self.forget(code, spec))
            .count()
    }
}
