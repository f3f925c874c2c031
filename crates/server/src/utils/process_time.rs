use std::time::Instant;

use axum::{
  extract::Request,
  http::{HeaderName, HeaderValue},
  middleware::Next,
  response::Response,
};

static X_PROCESS_TIME: HeaderName = HeaderName::from_static("x-process-time");

/// Stamp every response with the wall-clock handling time in seconds.
pub async fn process_time(request: Request, next: Next) -> Response {
  let start = Instant::now();
  let mut response = next.run(request).await;

  let elapsed = start.elapsed().as_secs_f64();
  if let Ok(value) = HeaderValue::from_str(&format!("{elapsed:.6}")) {
    response.headers_mut().insert(X_PROCESS_TIME.clone(), value);
  }
  response
}
