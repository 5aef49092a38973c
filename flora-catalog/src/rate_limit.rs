//! Per-source pacing and bounded retries
//!
//! Every source gets a leaky bucket of one: a call waits until the source's
//! cooldown has elapsed since the previous call started. The wait happens
//! while holding the source's slot, so concurrent callers for one source are
//! released one cooldown apart.
//!
//! Retries are bounded by `RetryPolicy::max_attempts` (total attempts). Only
//! `RequestFailed` and `Unreachable` are retried; `RateLimited` returns at once
//! so the caller can fall back to the cache instead of burning quota.

use crate::config::SourceSettings;
use crate::error::FetchError;
use crate::types::SourceId;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Bounded fixed-delay retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; never below 1
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Single attempt, no retry
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once()
    }
}

struct SourceSlot {
    last_call: Mutex<Option<Instant>>,
    cooldown: Duration,
    policy: RetryPolicy,
}

impl SourceSlot {
    fn new(cooldown: Duration, policy: RetryPolicy) -> Self {
        Self {
            last_call: Mutex::new(None),
            cooldown,
            policy,
        }
    }
}

/// Pacing and retry state for every source, owned by the catalog
#[derive(Clone, Default)]
pub struct RateLimiter {
    slots: HashMap<SourceId, Arc<SourceSlot>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &[SourceSettings]) -> Self {
        settings.iter().fold(Self::new(), |limiter, s| {
            limiter.with_source(s.id, s.cooldown, RetryPolicy::new(s.max_attempts, s.retry_delay))
        })
    }

    /// Register (or replace) a source's cooldown and retry policy
    pub fn with_source(mut self, source: SourceId, cooldown: Duration, policy: RetryPolicy) -> Self {
        self.slots
            .insert(source, Arc::new(SourceSlot::new(cooldown, policy)));
        self
    }

    /// Retry policy in effect for a source (single attempt when unregistered)
    pub fn policy(&self, source: SourceId) -> RetryPolicy {
        self.slots
            .get(&source)
            .map(|slot| slot.policy)
            .unwrap_or_default()
    }

    /// Suspend until the source's cooldown window has passed, then claim it
    pub async fn wait_turn(&self, source: SourceId) {
        let Some(slot) = self.slots.get(&source) else {
            return;
        };

        let mut last_call = slot.last_call.lock().await;

        if let Some(last_time) = *last_call {
            let elapsed = last_time.elapsed();
            if elapsed < slot.cooldown {
                let wait = slot.cooldown - elapsed;
                debug!(
                    source = %source,
                    wait_ms = wait.as_millis() as u64,
                    "Rate limiting: sleeping before request"
                );
                sleep(wait).await;
            }
        }

        *last_call = Some(Instant::now());
    }

    /// Run `call` under the source's pacing and retry policy
    ///
    /// Returns the first success, or the last error once attempts run out.
    pub async fn invoke<T, F, Fut>(&self, source: SourceId, mut call: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let policy = self.policy(source);
        let mut attempt = 1;

        loop {
            self.wait_turn(source).await;

            let err = match call().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() {
                debug!(source = %source, attempt, error = %err, "Not retrying");
                return Err(err);
            }

            if attempt >= policy.max_attempts {
                warn!(
                    source = %source,
                    attempts = attempt,
                    error = %err,
                    "Giving up after bounded retries"
                );
                return Err(err);
            }

            debug!(
                source = %source,
                attempt,
                delay_ms = policy.delay.as_millis() as u64,
                error = %err,
                "Retrying after failure"
            );
            sleep(policy.delay).await;
            attempt += 1;
        }
    }
}
