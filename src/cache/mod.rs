//! Runtime cache
//!
//! Holds assembled runtimes keyed by `{app_id}:{organization_id|platform}`:
//! - TTL per entry, checked lazily on read (expired entries are removed
//!   and reported as a miss; nothing sweeps in the background)
//! - Explicit invalidation by key, by app, or all; invalidation always wins
//!   over a not-yet-elapsed TTL
//!
//! The map sits behind one mutex so an invalidation can never interleave
//! with a read of the same key.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use appcfg_store::PLATFORM_SCOPE_ID;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::clock::Clock;
use crate::config::DEFAULT_CACHE_TTL_MINUTES;
use crate::runtime::GeneratedRuntime;

/// Cache key for an (app, organization) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CacheKey {
    app_id: String,
    organization_id: Option<String>,
}

impl CacheKey {
    pub fn new(app_id: impl Into<String>, organization_id: Option<&str>) -> Self {
        Self {
            app_id: app_id.into(),
            organization_id: organization_id.map(str::to_string),
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn organization_id(&self) -> Option<&str> {
        self.organization_id.as_deref()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.app_id,
            self.organization_id.as_deref().unwrap_or(PLATFORM_SCOPE_ID)
        )
    }
}

/// A cached runtime and its expiry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub runtime: Arc<GeneratedRuntime>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Counters for cache activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub invalidations: u64,
    pub entries: usize,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    stats: CacheStats,
}

/// TTL cache of assembled runtimes.
pub struct RuntimeCache {
    state: Mutex<CacheState>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for RuntimeCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeCache")
            .field("stats", &self.stats())
            .finish()
    }
}

impl RuntimeCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            clock,
        }
    }

    /// Fresh runtime for `key`, if any.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<GeneratedRuntime>> {
        let now = self.clock.now();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let expired = match state.entries.get(key) {
            None => {
                state.stats.misses += 1;
                return None;
            }
            Some(entry) if !entry.is_expired(now) => {
                let runtime = entry.runtime.clone();
                state.stats.hits += 1;
                return Some(runtime);
            }
            Some(_) => true,
        };

        if expired {
            state.entries.remove(key);
            state.stats.expired += 1;
            state.stats.misses += 1;
            tracing::debug!(cache_key = %key, "Cache entry expired");
        }
        None
    }

    /// Store `runtime` for `ttl_minutes`. Replaces any existing entry.
    pub fn set(&self, key: CacheKey, runtime: Arc<GeneratedRuntime>, ttl_minutes: u32) {
        let expires_at = self.clock.now() + Duration::minutes(i64::from(ttl_minutes));
        tracing::debug!(cache_key = %key, %expires_at, "Caching runtime");
        self.state
            .lock()
            .entries
            .insert(key, CacheEntry { runtime, expires_at });
    }

    /// Store with the default TTL.
    pub fn set_default(&self, key: CacheKey, runtime: Arc<GeneratedRuntime>) {
        self.set(key, runtime, DEFAULT_CACHE_TTL_MINUTES);
    }

    /// Drop one entry. Returns whether it existed.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let mut state = self.state.lock();
        let removed = state.entries.remove(key).is_some();
        state.stats.invalidations += 1;
        tracing::debug!(cache_key = %key, removed, "Cache invalidated");
        removed
    }

    /// Drop every entry of an app (all organizations).
    pub fn invalidate_app(&self, app_id: &str) -> usize {
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|key, _| key.app_id() != app_id);
        let removed = before - state.entries.len();
        state.stats.invalidations += 1;
        tracing::debug!(app_id, removed, "Cache invalidated for app");
        removed
    }

    /// Drop everything.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.stats.invalidations += 1;
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            entries: state.entries.len(),
            ..state.stats
        }
    }
}
