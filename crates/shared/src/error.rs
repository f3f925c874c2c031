use thiserror::Error;

/// Error taxonomy shared by every layer of the service.
///
/// Providers and store adapters raise these; the core service propagates
/// them untouched and the HTTP layer maps them to status codes in exactly
/// one place. The `Retryable` variant is the only one the retry policy
/// will re-attempt.
#[derive(Debug, Error)]
pub enum MemoryError {
  /// Startup or provider configuration problem (bad env, denied key).
  #[error("configuration error: {0}")]
  Configuration(String),

  /// Schema or range violation in a client request.
  #[error("invalid request: {0}")]
  InvalidRequest(String),

  /// Permanent upstream failure (LLM or embedding provider).
  #[error("upstream api error: {0}")]
  Api(String),

  /// Transient upstream failure, eligible for retry with backoff.
  #[error("transient upstream error: {0}")]
  Retryable(String),

  /// Vector store failure.
  #[error("database error: {0}")]
  Database(String),

  /// Reserved: lookups currently report missing ids in-line as
  /// NOT_FOUND confirmations instead of failing the whole request.
  #[error("memories not found: {0:?}")]
  NotFound(Vec<String>),
}

impl MemoryError {
  /// Stable machine-readable code surfaced in HTTP error bodies.
  #[must_use]
  pub const fn code(&self) -> &'static str {
    match self {
      Self::Configuration(_) => "CONFIGURATION_ERROR",
      Self::InvalidRequest(_) => "INVALID_REQUEST",
      Self::Api(_) => "API_SERVICE_UNAVAILABLE",
      Self::Retryable(_) => "API_SERVICE_TEMPORARILY_UNAVAILABLE",
      Self::Database(_) => "DATABASE_SERVICE_UNAVAILABLE",
      Self::NotFound(_) => "MEMORY_NOT_FOUND",
    }
  }

  /// Whether the retry policy may re-attempt the failed call.
  #[must_use]
  pub const fn is_retryable(&self) -> bool {
    matches!(self, Self::Retryable(_))
  }

  /// Collapse a transient error into its permanent form once retries
  /// are exhausted.
  #[must_use]
  pub fn into_permanent(self) -> Self {
    match self {
      Self::Retryable(message) => Self::Api(message),
      other => other,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn only_retryable_is_retryable() {
    assert!(MemoryError::Retryable("timeout".into()).is_retryable());
    assert!(!MemoryError::Api("quota".into()).is_retryable());
    assert!(!MemoryError::Database("down".into()).is_retryable());
    assert!(!MemoryError::InvalidRequest("bad".into()).is_retryable());
  }

  #[test]
  fn exhausted_retryable_becomes_api_error() {
    let err = MemoryError::Retryable("connection reset".into()).into_permanent();
    assert!(matches!(err, MemoryError::Api(_)));
    assert_eq!(err.code(), "API_SERVICE_UNAVAILABLE");
  }

  #[test]
  fn permanent_errors_survive_into_permanent() {
    let err = MemoryError::Database("pool exhausted".into()).into_permanent();
    assert!(matches!(err, MemoryError::Database(_)));
  }
}
