//! Backing stores for per-identifier rate limit entries.

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Window state for one client identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    /// Requests still allowed in the current window.
    pub tokens: u32,
    /// Start of the current window.
    pub last_refill: Instant,
}

/// Storage seam for the limiter.
///
/// The limiter serialises its own read-modify-write cycle, so implementations
/// only need individually atomic `get`/`set`.
pub trait RateLimitStore: Send + Sync {
    fn get(&self, identifier: &str) -> Option<RateLimitEntry>;

    fn set(&self, identifier: &str, entry: RateLimitEntry);

    /// Drop entries whose window started more than `retention` before `now`.
    /// Returns the number of entries removed.
    fn sweep(&self, now: Instant, retention: Duration) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local store. Lives as long as the limiter that owns it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, RateLimitEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimitStore for MemoryStore {
    fn get(&self, identifier: &str) -> Option<RateLimitEntry> {
        self.entries.get(identifier).map(|entry| *entry)
    }

    fn set(&self, identifier: &str, entry: RateLimitEntry) {
        self.entries.insert(identifier.to_owned(), entry);
    }

    fn sweep(&self, now: Instant, retention: Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.last_refill) <= retention);
        before.saturating_sub(self.entries.len())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
