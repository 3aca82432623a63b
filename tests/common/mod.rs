//! Shared helpers for the integration tests

#![allow(dead_code)]

use std::time::Duration;

/// Poll `check` until it holds or `timeout` elapses
pub async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Generous bound for simulated round trips
pub const SETTLE: Duration = Duration::from_secs(2);
