//! Fixed-window limiter behaviour observed through the public API.

use ghardaar::rate_limit::{
    MemoryStore, RateLimitConfig, RateLimitEntry, RateLimitStore, RateLimiter,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

const INTERVAL: Duration = Duration::from_millis(60_000);

fn limiter(max_requests: u32) -> RateLimiter {
    RateLimiter::in_memory(RateLimitConfig {
        interval: INTERVAL,
        max_requests,
    })
}

#[test]
fn exactly_max_requests_pass_within_a_window() {
    let rl = limiter(5);
    let t0 = Instant::now();

    for i in 0..5u32 {
        let d = rl.check_at("203.0.113.9", t0 + Duration::from_millis(u64::from(i) * 10));
        assert!(!d.limited, "request {i} should pass");
        assert_eq!(d.remaining, 4 - i);
    }

    let d = rl.check_at("203.0.113.9", t0 + Duration::from_millis(100));
    assert!(d.limited);
    assert_eq!(d.remaining, 0);
    assert_eq!(d.reset_in, INTERVAL - Duration::from_millis(100));
}

#[test]
fn window_resets_fully_after_interval() {
    let rl = limiter(3);
    let t0 = Instant::now();

    for _ in 0..3 {
        rl.check_at("client", t0);
    }
    // Hammering while limited must not extend the window.
    for ms in [1_000, 30_000, 59_999] {
        assert!(rl.check_at("client", t0 + Duration::from_millis(ms)).limited);
    }

    let d = rl.check_at("client", t0 + INTERVAL);
    assert!(!d.limited);
    assert_eq!(d.remaining, 2);
    assert_eq!(d.reset_in, INTERVAL);
}

#[test]
fn budget_can_be_spent_twice_across_a_boundary() {
    let rl = limiter(2);
    let t0 = Instant::now();
    let late = t0 + INTERVAL - Duration::from_millis(1);

    rl.check_at("burst", t0);
    assert!(!rl.check_at("burst", late).limited);
    assert!(rl.check_at("burst", late).limited);

    let next = t0 + INTERVAL;
    assert!(!rl.check_at("burst", next).limited);
    assert!(!rl.check_at("burst", next).limited);
    assert!(rl.check_at("burst", next).limited);
}

#[test]
fn separate_limiters_do_not_share_state() {
    let a = limiter(1);
    let b = limiter(1);
    let t0 = Instant::now();

    assert!(!a.check_at("same-ip", t0).limited);
    assert!(a.check_at("same-ip", t0).limited);
    assert!(!b.check_at("same-ip", t0).limited);
}

/// Store wrapper that counts writes, to observe the limiter through its seam.
#[derive(Default)]
struct CountingStore {
    inner: MemoryStore,
    writes: AtomicUsize,
}

impl RateLimitStore for CountingStore {
    fn get(&self, identifier: &str) -> Option<RateLimitEntry> {
        self.inner.get(identifier)
    }

    fn set(&self, identifier: &str, entry: RateLimitEntry) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set(identifier, entry);
    }

    fn sweep(&self, now: Instant, retention: Duration) -> usize {
        self.inner.sweep(now, retention)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

#[test]
fn limited_requests_do_not_write_to_the_store() {
    let rl = RateLimiter::new(
        CountingStore::default(),
        RateLimitConfig {
            interval: INTERVAL,
            max_requests: 2,
        },
    );
    let t0 = Instant::now();
    for _ in 0..5 {
        rl.check_at("x", t0);
    }
    assert_eq!(rl.store().writes.load(Ordering::SeqCst), 2);
}

#[test]
fn concurrent_checks_never_overspend() {
    let rl = Arc::new(limiter(50));
    let t0 = Instant::now();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let rl = Arc::clone(&rl);
            std::thread::spawn(move || {
                (0..20)
                    .filter(|_| !rl.check_at("shared", t0).limited)
                    .count()
            })
        })
        .collect();

    let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(allowed, 50);
}

#[tokio::test]
async fn sweeper_evicts_idle_entries_until_cancelled() {
    let rl = Arc::new(limiter(3));
    rl.check("stale");
    rl.check_at("fresh", Instant::now() + Duration::from_secs(60));
    assert_eq!(rl.store().len(), 2);

    let cancel = tokio_util::sync::CancellationToken::new();
    let handle = rl.spawn_sweeper(
        Duration::from_millis(20),
        Duration::from_millis(50),
        cancel.clone(),
    );

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(rl.store().len(), 1);
    assert!(rl.store().get("fresh").is_some());

    cancel.cancel();
    handle.await.unwrap();
}
