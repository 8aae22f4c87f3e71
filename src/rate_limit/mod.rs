//! Per-client fixed-window rate limiting for the outbound integration routes.
//!
//! Each identifier gets `max_requests` calls per `interval`. The window does
//! not refill continuously: the first request after the window has expired
//! resets the whole budget. A client can therefore spend a full budget at the
//! end of one window and another full budget right after the boundary.
//!
//! Entries live in an injected [`RateLimitStore`]; a background sweep evicts
//! idle identifiers. An evicted identifier simply starts a fresh window, which
//! is what an expired window would do anyway.

mod store;

pub use store::{MemoryStore, RateLimitEntry, RateLimitStore};

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_REQUESTS: u32 = 10;
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(10 * 60);

pub static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub static X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Window length.
    pub interval: Duration,
    /// Requests allowed per window. Must be at least 1.
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_requests: DEFAULT_MAX_REQUESTS,
        }
    }
}

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub limited: bool,
    pub remaining: u32,
    /// Time until the current window ends.
    pub reset_in: Duration,
}

pub struct RateLimiter<S = MemoryStore> {
    store: S,
    config: RateLimitConfig,
    /// Serialises the get/decide/set cycle so a token is never spent twice.
    check_lock: Mutex<()>,
}

pub type SharedRateLimiter = Arc<RateLimiter<MemoryStore>>;

impl RateLimiter<MemoryStore> {
    pub fn in_memory(config: RateLimitConfig) -> Self {
        Self::new(MemoryStore::new(), config)
    }
}

impl<S: RateLimitStore> RateLimiter<S> {
    pub fn new(store: S, config: RateLimitConfig) -> Self {
        let config = RateLimitConfig {
            max_requests: config.max_requests.max(1),
            ..config
        };
        Self {
            store,
            config,
            check_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Check and consume one request for `identifier`.
    pub fn check(&self, identifier: &str) -> RateLimitDecision {
        self.check_at(identifier, Instant::now())
    }

    /// [`check`](Self::check) against an explicit clock reading.
    pub fn check_at(&self, identifier: &str, now: Instant) -> RateLimitDecision {
        let _guard = self
            .check_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let RateLimitConfig {
            interval,
            max_requests,
        } = self.config;

        let fresh_window = |store: &S| {
            store.set(
                identifier,
                RateLimitEntry {
                    tokens: max_requests - 1,
                    last_refill: now,
                },
            );
            RateLimitDecision {
                limited: false,
                remaining: max_requests - 1,
                reset_in: interval,
            }
        };

        let Some(mut entry) = self.store.get(identifier) else {
            return fresh_window(&self.store);
        };

        let elapsed = now.saturating_duration_since(entry.last_refill);
        if elapsed >= interval {
            return fresh_window(&self.store);
        }

        let reset_in = interval - elapsed;
        if entry.tokens == 0 {
            return RateLimitDecision {
                limited: true,
                remaining: 0,
                reset_in,
            };
        }

        entry.tokens -= 1;
        self.store.set(identifier, entry);
        RateLimitDecision {
            limited: false,
            remaining: entry.tokens,
            reset_in,
        }
    }

    /// Evict identifiers idle for longer than `retention`.
    pub fn sweep_at(&self, now: Instant, retention: Duration) -> usize {
        let _guard = self
            .check_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.store.sweep(now, retention)
    }
}

impl<S: RateLimitStore + 'static> RateLimiter<S> {
    /// Spawn the periodic idle-entry sweep. Stops when `cancel` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        every: Duration,
        retention: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await; // skip the immediate first tick
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("rate limit sweeper stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = limiter.sweep_at(Instant::now(), retention);
                        if removed > 0 {
                            info!(removed, remaining = limiter.store.len(), "swept idle rate limit entries");
                        }
                    }
                }
            }
        })
    }
}

/// Headers describing the limiter state, attached to 429 responses.
///
/// The reset value is whole seconds, rounded up.
pub fn rate_limit_headers(remaining: u32, reset_in: Duration, limit: u32) -> HeaderMap {
    let reset_secs = reset_in.as_millis().div_ceil(1000);
    let mut headers = HeaderMap::with_capacity(3);
    headers.insert(X_RATELIMIT_LIMIT.clone(), HeaderValue::from(limit));
    headers.insert(X_RATELIMIT_REMAINING.clone(), HeaderValue::from(remaining));
    headers.insert(
        X_RATELIMIT_RESET.clone(),
        HeaderValue::from(u64::try_from(reset_secs).unwrap_or(u64::MAX)),
    );
    headers
}
