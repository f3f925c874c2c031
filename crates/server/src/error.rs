use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use engram_shared::MemoryError;

/// The single chokepoint mapping domain errors to HTTP. Bodies carry a
/// structured `{error: {code, message}}` payload; stack traces never
/// leave the process.
#[derive(Debug)]
pub struct ApiError(MemoryError);

impl ApiError {
  #[must_use]
  pub const fn status_code(&self) -> StatusCode {
    match &self.0 {
      MemoryError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
      MemoryError::NotFound(_) => StatusCode::NOT_FOUND,
      MemoryError::Configuration(_)
      | MemoryError::Api(_)
      | MemoryError::Retryable(_)
      | MemoryError::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status_code();
    tracing::error!(code = self.0.code(), status = %status, error = %self.0, "request failed");
    let body = Json(serde_json::json!({
      "error": {
        "code": self.0.code(),
        "message": self.0.to_string(),
      }
    }));
    (status, body).into_response()
  }
}

impl From<MemoryError> for ApiError {
  fn from(err: MemoryError) -> Self {
    Self(err)
  }
}
