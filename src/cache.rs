//! Time-bounded response cache with pattern invalidation.
//!
//! Maps a deterministic request fingerprint (URL + sorted query parameters)
//! to a parsed response body with a TTL. Expiry is enforced on every read;
//! a background sweeper additionally purges expired entries on a fixed
//! interval so unread entries do not accumulate.
//!
//! The cache is shared across concurrent requests on a multi-threaded
//! runtime, so the map is guarded by a mutex. No lock is held across an
//! await point.

use crate::types::{Body, QueryParams};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default entry TTL: 5 minutes.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Default sweep interval: 10 minutes, independent of entry TTLs. An entry
/// may outlive its TTL by up to one interval before being swept; `get` still
/// enforces expiry on read.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Invalidation target: an exact key, or a regex matched anywhere in a key.
///
/// [`KeyPattern::substring`] preserves the substring-anywhere semantics the
/// orchestration layer documents: invalidating `"clients"` removes every key
/// that contains that text at any position, not only keys rooted at the
/// resource path.
#[derive(Debug, Clone)]
pub enum KeyPattern {
    /// Delete the single entry with exactly this key.
    Exact(String),
    /// Delete every entry whose key matches this unanchored regex.
    Matching(Regex),
}

impl KeyPattern {
    /// Compile a plain string into an unanchored substring pattern.
    ///
    /// # Errors
    ///
    /// Returns a [`regex::Error`] if the escaped pattern fails to compile
    /// (practically unreachable for escaped input).
    pub fn substring(text: &str) -> Result<Self, regex::Error> {
        Regex::new(&regex::escape(text)).map(Self::Matching)
    }

    fn matches(&self, key: &str) -> bool {
        match self {
            Self::Exact(exact) => key == exact,
            Self::Matching(regex) => regex.is_match(key),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Body,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() > self.ttl
    }
}

/// Shared response cache keyed by request fingerprint.
#[derive(Debug)]
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ResponseCache {
    /// Create a cache with the given default TTL.
    #[must_use]
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Deterministic cache key for a URL and parameter set.
    ///
    /// With no parameters the URL is returned unchanged; otherwise the
    /// lexicographically sorted JSON fingerprint of the parameters is
    /// appended, so permutations of the same parameter set always produce
    /// the same key.
    #[must_use]
    pub fn cache_key(url: &str, params: &QueryParams) -> String {
        if params.is_empty() {
            url.to_string()
        } else {
            format!("{url}?{}", params.fingerprint())
        }
    }

    /// Look up a key, returning the value only while its TTL holds.
    ///
    /// Expired entries are deleted on the spot and reported as a miss.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Body> {
        let mut entries = lock(&self.entries);
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                tracing::debug!(key, "Cache entry expired on read");
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Store a value under the default TTL, overwriting unconditionally.
    pub fn set(&self, key: impl Into<String>, value: Body) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Store a value under an explicit TTL; `stored_at` resets on overwrite.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: Body, ttl: Duration) {
        let key = key.into();
        lock(&self.entries).insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Delete one entry by exact key. Idempotent.
    pub fn invalidate(&self, key: &str) {
        lock(&self.entries).remove(key);
    }

    /// Delete every entry matching the pattern, returning how many were
    /// removed.
    pub fn invalidate_matching(&self, pattern: &KeyPattern) -> usize {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|key, _| !pattern.matches(key));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed, "Invalidated cache entries by pattern");
        }
        removed
    }

    /// Drop every entry.
    pub fn clear(&self) {
        lock(&self.entries).clear();
    }

    /// Number of entries currently stored, including not-yet-swept expired
    /// ones.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    /// Sweep all entries, deleting expired ones. Returns the number removed.
    pub fn cleanup(&self) -> usize {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed, "Cache sweep removed expired entries");
        }
        removed
    }

    /// Spawn the periodic sweep task.
    ///
    /// Runs [`cleanup`](Self::cleanup) every `interval` until the returned
    /// handle is shut down. The interval is fixed and independent of entry
    /// TTLs.
    #[must_use]
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> SweeperHandle {
        let cache = Arc::clone(self);
        let token = CancellationToken::new();
        let task_token = token.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so the first sweep
            // happens one full interval after startup.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        cache.cleanup();
                    }
                    () = task_token.cancelled() => break,
                }
            }
        });
        SweeperHandle { token, task }
    }
}

/// Handle to the background sweep task; shut down for clean teardown.
#[derive(Debug)]
pub struct SweeperHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper. Idempotent; safe to call during shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether the sweep task has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::types::QueryParams;
    use serde_json::json;

    fn body(value: serde_json::Value) -> Body {
        Body::Json(value)
    }

    #[test]
    fn test_cache_key_without_params_is_url() {
        let params = QueryParams::new();
        assert_eq!(ResponseCache::cache_key("/clients", &params), "/clients");
    }

    #[test]
    fn test_cache_key_deterministic_across_insertion_order() {
        let a = QueryParams::new().with("page", 2).with("status", "active");
        let b = QueryParams::new().with("status", "active").with("page", 2);
        assert_eq!(
            ResponseCache::cache_key("/clients", &a),
            ResponseCache::cache_key("/clients", &b)
        );
        assert_eq!(
            ResponseCache::cache_key("/clients", &a),
            r#"/clients?{"page":2,"status":"active"}"#
        );
    }

    #[test]
    fn test_get_returns_stored_value() {
        let cache = ResponseCache::default();
        cache.set("/clients", body(json!({"items": []})));
        assert_eq!(cache.get("/clients"), Some(body(json!({"items": []}))));
    }

    #[test]
    fn test_ttl_expiry_removes_entry() {
        let cache = ResponseCache::default();
        cache.set_with_ttl("k", body(json!(1)), Duration::from_millis(30));
        assert_eq!(cache.get("k"), Some(body(json!(1))));
        assert_eq!(cache.len(), 1);

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 0); // expired entry deleted on read
    }

    #[test]
    fn test_overwrite_resets_stored_at() {
        let cache = ResponseCache::default();
        cache.set_with_ttl("k", body(json!(1)), Duration::from_millis(40));
        std::thread::sleep(Duration::from_millis(25));
        cache.set_with_ttl("k", body(json!(2)), Duration::from_millis(40));
        std::thread::sleep(Duration::from_millis(25));
        // Would be expired if stored_at had not been reset.
        assert_eq!(cache.get("k"), Some(body(json!(2))));
    }

    #[test]
    fn test_invalidate_is_idempotent() {
        let cache = ResponseCache::default();
        cache.set("k", body(json!(1)));
        cache.invalidate("k");
        cache.invalidate("k");
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_pattern_invalidation_matches_substring_anywhere() {
        let cache = ResponseCache::default();
        cache.set(r#"/clients?{"x":1}"#, body(json!(1)));
        cache.set("/drivers", body(json!(2)));

        let pattern = KeyPattern::substring("client").unwrap();
        assert_eq!(cache.invalidate_matching(&pattern), 1);
        assert_eq!(cache.get(r#"/clients?{"x":1}"#), None);
        assert_eq!(cache.get("/drivers"), Some(body(json!(2))));
    }

    #[test]
    fn test_exact_pattern_does_not_touch_substrings() {
        let cache = ResponseCache::default();
        cache.set("/clients", body(json!(1)));
        cache.set("/clients/1", body(json!(2)));

        cache.invalidate_matching(&KeyPattern::Exact("/clients".to_string()));
        assert_eq!(cache.get("/clients"), None);
        assert_eq!(cache.get("/clients/1"), Some(body(json!(2))));
    }

    #[test]
    fn test_clear_drops_everything() {
        let cache = ResponseCache::default();
        cache.set("a", body(json!(1)));
        cache.set("b", body(json!(2)));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cleanup_sweeps_only_expired() {
        let cache = ResponseCache::default();
        cache.set_with_ttl("old", body(json!(1)), Duration::from_millis(10));
        cache.set_with_ttl("fresh", body(json!(2)), Duration::from_secs(60));

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.cleanup(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("fresh"), Some(body(json!(2))));
    }

    #[tokio::test]
    async fn test_sweeper_runs_and_shuts_down() {
        let cache = Arc::new(ResponseCache::default());
        cache.set_with_ttl("k", body(json!(1)), Duration::from_millis(10));

        let handle = cache.spawn_sweeper(Duration::from_millis(40));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.len(), 0); // swept without any read

        handle.shutdown();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(handle.is_finished());
    }
}
