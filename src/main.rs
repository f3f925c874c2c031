use clap::Parser;
use engram_core::build_service;
use engram_shared::{Config, MemoryError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Self-hosted long-term memory service for conversational agents.
#[derive(Debug, Parser)]
#[command(name = "engram", version, about)]
struct Args {
  /// Address to bind
  #[arg(long, default_value = "0.0.0.0")]
  host: String,

  /// Port to bind
  #[arg(long, default_value_t = 8090)]
  port: u16,
}

#[tokio::main]
async fn main() -> Result<(), MemoryError> {
  let args = Args::parse();

  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{}=debug", env!("CARGO_CRATE_NAME")).into()),
    )
    .with(tracing_error::ErrorLayer::default())
    .with(tracing_subscriber::fmt::layer())
    .init();

  let config = Config::from_env()?;
  if config.telemetry.enable_otel {
    tracing::info!(
      service_name = %config.telemetry.service_name,
      endpoint = config.telemetry.otlp_endpoint.as_deref().unwrap_or("unset"),
      "OTLP export enabled; attach an exporter layer to ship spans"
    );
  }

  let service = build_service(&config).await?;

  engram_server::serve(&args.host, args.port, service).await
}
