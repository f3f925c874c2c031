use engram_shared::MemoryError;
use rand::Rng;
use tokio::time::{Duration, sleep};

/// Exponential backoff with full jitter, dispatching on the error's
/// retryable tag. Permanent errors re-raise immediately; exhaustion
/// surfaces the last error collapsed to its permanent form.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
  pub max_retries: u32,
  pub base_delay: Duration,
  pub backoff_factor: f64,
  pub max_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: 3,
      base_delay: Duration::from_millis(500),
      backoff_factor: 2.0,
      max_delay: Duration::from_secs(8),
    }
  }
}

impl RetryPolicy {
  /// Run `op`, re-attempting transient failures until success or
  /// `max_retries` is exceeded.
  pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, MemoryError>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MemoryError>>,
  {
    let mut attempt: u32 = 0;
    loop {
      match op().await {
        Ok(value) => return Ok(value),
        Err(err) if err.is_retryable() => {
          attempt += 1;
          if attempt > self.max_retries {
            tracing::error!(attempts = attempt, error = %err, "retries exhausted");
            return Err(err.into_permanent());
          }
          let delay = self.delay_for(attempt);
          tracing::warn!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "transient failure, backing off"
          );
          sleep(delay).await;
        }
        Err(err) => return Err(err),
      }
    }
  }

  /// Delay after the k-th failed attempt (1-indexed):
  /// `min(base * factor^(k-1), max) * (0.5 + rand/2)`.
  fn delay_for(&self, attempt: u32) -> Duration {
    let exponential = self.base_delay.as_secs_f64()
      * self.backoff_factor.powi(attempt.saturating_sub(1) as i32);
    let capped = exponential.min(self.max_delay.as_secs_f64());
    let jitter = 0.5 + rand::rng().random::<f64>() / 2.0;
    Duration::from_secs_f64(capped * jitter)
  }
}
