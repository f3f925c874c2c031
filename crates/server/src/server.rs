use axum::{Router, middleware, response::Html, routing::get};
use engram_core::MemoryService;
use engram_shared::MemoryError;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::CorsLayer;

use crate::{
  api,
  utils::{AppState, process_time},
};

#[axum::debug_handler]
async fn landing() -> Html<&'static str> {
  Html("<h1>Engram</h1>")
}

/// Resolves once the process is asked to stop: Ctrl+C anywhere,
/// SIGTERM on unix. A failed SIGTERM registration downgrades to
/// Ctrl+C-only shutdown rather than killing the server.
async fn shutdown_signal() {
  #[cfg(unix)]
  let terminate = async {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
      Ok(mut stream) => {
        stream.recv().await;
      }
      Err(err) => {
        tracing::warn!(error = %err, "SIGTERM handler unavailable");
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = signal::ctrl_c() => {},
    () = terminate => {},
  }
}

/// Full application router: API routes plus landing page, permissive
/// CORS and the X-Process-Time stamp. Exposed so tests can drive the
/// router without binding a socket.
pub fn app(state: AppState) -> Router {
  Router::new()
    .route("/", get(landing))
    .merge(api::router())
    .layer(middleware::from_fn(process_time))
    .layer(CorsLayer::permissive())
    .with_state(state)
}

pub async fn serve(host: &str, port: u16, service: MemoryService) -> Result<(), MemoryError> {
  let router = app(AppState::new(service));

  let listener = TcpListener::bind((host, port))
    .await
    .map_err(|err| MemoryError::Configuration(format!("cannot bind {host}:{port}: {err}")))?;

  tracing::info!("server started at http://{host}:{port}");

  axum::serve(listener, router)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|err| MemoryError::Configuration(format!("server error: {err}")))?;

  Ok(())
}
