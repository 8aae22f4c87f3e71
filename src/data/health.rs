//! Database liveness check for the status endpoint.

use anyhow::Result;
use sqlx::PgPool;
use std::time::{Duration, Instant};

/// Round-trip a trivial query and report how long it took.
pub async fn ping(pool: &PgPool) -> Result<Duration> {
    let start = Instant::now();
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(start.elapsed())
}
