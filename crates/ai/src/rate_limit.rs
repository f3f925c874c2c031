use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant, sleep_until};

/// Token-bucket style rate limiter enforcing a minimum spacing between
/// call starts. One instance is shared per provider; clones share state.
///
/// Only the slot reservation happens under the lock. The sleep itself
/// runs outside it, so a slow caller never blocks the next reservation
/// beyond the minimum interval, and a cancelled caller releases its
/// waiters immediately.
#[derive(Debug, Clone)]
pub struct RateLimiter {
  min_interval: Duration,
  next_start: Arc<Mutex<Option<Instant>>>,
}

impl RateLimiter {
  /// `calls_per_second` must be positive; values round down to a
  /// minimum spacing of `1 / calls_per_second`.
  #[must_use]
  pub fn new(calls_per_second: f64) -> Self {
    let min_interval = if calls_per_second > 0.0 {
      Duration::from_secs_f64(1.0 / calls_per_second)
    } else {
      Duration::ZERO
    };
    Self {
      min_interval,
      next_start: Arc::new(Mutex::new(None)),
    }
  }

  /// Wait until this caller's reserved start slot arrives.
  pub async fn acquire(&self) {
    if self.min_interval.is_zero() {
      return;
    }

    let slot = {
      let mut next_start = self.next_start.lock().await;
      let now = Instant::now();
      let slot = match *next_start {
        Some(at) if at > now => at,
        _ => now,
      };
      *next_start = Some(slot + self.min_interval);
      slot
    };

    sleep_until(slot).await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test(start_paused = true)]
  async fn spaces_sequential_calls_by_min_interval() {
    let limiter = RateLimiter::new(10.0); // 100ms spacing
    let start = Instant::now();

    limiter.acquire().await;
    limiter.acquire().await;
    limiter.acquire().await;

    assert_eq!(start.elapsed(), Duration::from_millis(200));
  }

  #[tokio::test(start_paused = true)]
  async fn concurrent_callers_get_distinct_slots() {
    let limiter = RateLimiter::new(10.0);
    let start = Instant::now();

    let (a, b) = tokio::join!(
      async {
        limiter.acquire().await;
        start.elapsed()
      },
      async {
        limiter.acquire().await;
        start.elapsed()
      }
    );

    let (first, second) = if a < b { (a, b) } else { (b, a) };
    assert_eq!(first, Duration::ZERO);
    assert_eq!(second, Duration::from_millis(100));
  }

  #[tokio::test(start_paused = true)]
  async fn idle_limiter_does_not_delay() {
    let limiter = RateLimiter::new(10.0);
    limiter.acquire().await;

    tokio::time::advance(Duration::from_secs(5)).await;
    let start = Instant::now();
    limiter.acquire().await;
    assert_eq!(start.elapsed(), Duration::ZERO);
  }
}
