//! Result cache (C3). Content-addressed by `(run_id, kind, params, row
//! count)` — a row-count change mints a new key, so stale entries simply
//! age out rather than needing an invalidation hook on every write path.
//! Grounded in the `moka` dependency already declared for `cortex`'s
//! retrieval layer; reused here unmodified).

use std::sync::Arc;

use moka::sync::Cache;
use serde::Serialize;

use crate::types::ids::RunId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub run_id: RunId,
    pub kind: String,
    pub params_digest: String,
    pub row_count: i64,
}

impl CacheKey {
    pub fn new(run_id: RunId, kind: impl Into<String>, params: &impl Serialize, row_count: i64) -> Self {
        let params_digest = serde_json::to_string(params)
            .map(|s| format!("{:x}", xxhash_rust::xxh3::xxh3_64(s.as_bytes())))
            .unwrap_or_default();
        Self { run_id, kind: kind.into(), params_digest, row_count }
    }
}

/// Best-effort cache: reads and writes never fail the caller, on any
/// internal error the cache simply yields a miss.
pub struct ResultCache {
    inner: Cache<CacheKey, Arc<String>>,
}

impl ResultCache {
    pub fn new(max_capacity: u64) -> Self {
        Self { inner: Cache::new(max_capacity) }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<String>> {
        self.inner.get(key)
    }

    pub fn put(&self, key: CacheKey, payload_json: String) {
        self.inner.insert(key, Arc::new(payload_json));
    }

    /// Compute-if-absent. The compute closure's errors are swallowed into
    /// a cache miss (the caller still gets the freshly computed value,
    /// it's just not memoized).
    pub fn get_or_compute<F, E>(&self, key: CacheKey, compute: F) -> Result<Arc<String>, E>
    where
        F: FnOnce() -> Result<String, E>,
    {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }
        let payload = compute()?;
        let value = Arc::new(payload);
        self.inner.insert(key, value.clone());
        Ok(value)
    }

    /// Drop every entry belonging to a run (deletion, re-execution, or a
    /// shrinking result set — explicit invalidation paths per §4.3).
    pub fn clear(&self, run_id: RunId) {
        self.inner.invalidate_entries_if(move |k, _v| k.run_id == run_id).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_hit() {
        let cache = ResultCache::new(100);
        let key = CacheKey::new(RunId(1), "summary", &serde_json::json!({"a": 1}), 10);
        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), "payload".to_string());
        assert_eq!(cache.get(&key).map(|v| (*v).clone()), Some("payload".to_string()));
    }

    #[test]
    fn row_count_change_is_a_new_key() {
        let params = serde_json::json!({"a": 1});
        let key1 = CacheKey::new(RunId(1), "summary", &params, 10);
        let key2 = CacheKey::new(RunId(1), "summary", &params, 11);
        assert_ne!(key1, key2);
    }

    #[test]
    fn clear_drops_only_that_run() {
        let cache = ResultCache::new(100);
        let key1 = CacheKey::new(RunId(1), "summary", &serde_json::json!({}), 1);
        let key2 = CacheKey::new(RunId(2), "summary", &serde_json::json!({}), 1);
        cache.put(key1.clone(), "a".to_string());
        cache.put(key2.clone(), "b".to_string());
        cache.clear(RunId(1));
        cache.inner.run_pending_tasks();
        assert!(cache.get(&key1).is_none());
        assert!(cache.get(&key2).is_some());
    }

    #[test]
    fn get_or_compute_memoizes() {
        let cache = ResultCache::new(100);
        let key = CacheKey::new(RunId(1), "summary", &serde_json::json!({}), 1);
        let mut calls = 0;
        for _ in 0..3 {
            let _: Result<_, String> = cache.get_or_compute(key.clone(), || {
                calls += 1;
                Ok("x".to_string())
            });
        }
        assert_eq!(calls, 1);
    }
}
