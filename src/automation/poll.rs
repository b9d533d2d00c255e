//! Retry-with-deadline primitive.
//!
//! Every wait in the automation engine goes through [`poll_until`]: check a
//! predicate, sleep a fixed interval, check again, give up at the deadline.

use std::time::Duration;

use tokio::time::{sleep_until, Instant};

/// Poll `predicate` until it returns `true` or `timeout` elapses.
///
/// The predicate is evaluated immediately, then once per `interval`. It is
/// always evaluated one final time at (or just after) the deadline, so a
/// condition that becomes true during the last sleep is still observed.
///
/// The predicate may perform side effects (e.g. re-issue an activation
/// request) before checking its condition.
pub async fn poll_until<F>(mut predicate: F, interval: Duration, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        sleep_until((now + interval).min(deadline)).await;
    }
}
