//! Response cache with time-based invalidation
//!
//! Entries are pre-normalized payloads: a hit skips pacing, retries and
//! normalization entirely. Each entry is two store keys, the payload under
//! `key` and its write time (epoch ms) under `key_time`. Stale entries are
//! never deleted on read; they are superseded by the next write and remain
//! available to `get_stale` as a last-resort fallback.
//!
//! Storage failures are logged and swallowed. Caching is an optimization.

use crate::sources::ListQuery;
use crate::store::KeyValueStore;
use crate::types::SourceId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default entry lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Suffix of the timestamp companion key
const TIME_SUFFIX: &str = "_time";

/// Prefix of list (search) entries
pub const SEARCH_PREFIX: &str = "search_";

/// Source of "now" in epoch milliseconds
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Hand-driven clock for tests and replays
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Cache key of a single record: `<entity-type>_<id>`
pub fn record_key(source: SourceId, record_id: &str) -> String {
    format!("{}_{}", source.entity_type(), record_id)
}

/// Cache key of one list page: `search_<tag>_<digest>`
pub fn list_key(source: SourceId, query: &ListQuery) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.text.to_lowercase().as_bytes());
    hasher.update(b"\0");
    hasher.update(query.page.to_string().as_bytes());
    hasher.update(b"\0");
    if let Some(kingdom) = query.kingdom {
        hasher.update(kingdom.iconic_taxon().as_bytes());
    }
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect();
    format!("{}{}_{}", SEARCH_PREFIX, source.tag(), hex)
}

fn time_key(key: &str) -> String {
    format!("{}{}", key, TIME_SUFFIX)
}

/// TTL cache over a key-value store
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl Cache {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self::with_clock(store, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn KeyValueStore>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { store, ttl, clock }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh payload, or `None` when absent, unreadable or `now - written >= ttl`
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let written_at = self.written_at(key).await?;
        let age_ms = self.clock.now_ms() - written_at;

        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        if age_ms >= ttl_ms {
            debug!(key = %key, age_ms, "Cache entry stale");
            return None;
        }

        let payload = self.read_payload(key).await;
        debug!(key = %key, hit = payload.is_some(), "Cache lookup");
        payload
    }

    /// Most recent payload regardless of age (degraded-mode fallback)
    pub async fn get_stale<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let payload = self.read_payload(key).await;
        if payload.is_some() {
            debug!(key = %key, "Serving cache entry without TTL check");
        }
        payload
    }

    /// Store a payload stamped with the current time; failures are logged only
    pub async fn put<T: Serialize>(&self, key: &str, payload: &T) {
        let serialized = match serde_json::to_string(payload) {
            Ok(s) => s,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache payload not serializable, skipping write");
                return;
            }
        };

        if let Err(e) = self.store.set(key, &serialized).await {
            warn!(key = %key, error = %e, "Cache write failed (ignored)");
            return;
        }

        // A payload without its timestamp is invisible to `clear`; drop it
        let now = self.clock.now_ms().to_string();
        if let Err(e) = self.store.set(&time_key(key), &now).await {
            warn!(key = %key, error = %e, "Cache timestamp write failed (ignored)");
            if let Err(e) = self.store.remove(key).await {
                warn!(key = %key, error = %e, "Rolling back cache payload failed");
            }
        }
    }

    /// Remove cache entries whose key starts with `prefix` (all entries for `None`)
    ///
    /// Only keys that belong to a cache entry (a payload with a `_time`
    /// companion, or the companion itself) are touched; other data sharing
    /// the store survives. Returns the number of entries removed.
    pub async fn clear(&self, prefix: Option<&str>) -> flora_common::Result<usize> {
        let keys = self.store.keys_with_prefix(prefix.unwrap_or("")).await?;
        let mut removed = 0;

        for key in &keys {
            if key.ends_with(TIME_SUFFIX) {
                continue;
            }
            let stamp = time_key(key);
            if self.store.get(&stamp).await?.is_none() {
                continue;
            }
            self.store.remove(key).await?;
            self.store.remove(&stamp).await?;
            removed += 1;
        }

        debug!(prefix = ?prefix, removed, "Cache cleared");
        Ok(removed)
    }

    async fn written_at(&self, key: &str) -> Option<i64> {
        match self.store.get(&time_key(key)).await {
            Ok(Some(stamp)) => stamp.trim().parse().ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache timestamp read failed");
                None
            }
        }
    }

    async fn read_payload<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!(key = %key, error = %e, "Cache payload unreadable, ignoring");
                None
            }
        }
    }
}
