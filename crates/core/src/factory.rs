use engram_ai::{Embedder, Llm, OpenAiEmbedder, OpenAiLlm};
use engram_shared::{Config, MemoryError};
use engram_store::{MemoryStore, PostgresStore, VectorStore};

use crate::MemoryService;

/// Resolve the configured providers and assemble the service.
///
/// Providers are a closed set: an unknown name is a configuration
/// error at startup, not a runtime lookup. The store is set up (table,
/// index, snapshot) before the service is handed out, so every
/// operation sees an open collection.
pub async fn build_service(config: &Config) -> Result<MemoryService, MemoryError> {
  let llm = match config.llm.provider.as_str() {
    "openai" => Llm::OpenAi(OpenAiLlm::new(&config.llm)?),
    other => {
      return Err(MemoryError::Configuration(format!(
        "unsupported LLM provider: {other}"
      )));
    }
  };

  let embedder = match config.embedding.provider.as_str() {
    "openai" => Embedder::OpenAi(OpenAiEmbedder::new(&config.embedding)?),
    other => {
      return Err(MemoryError::Configuration(format!(
        "unsupported embedding provider: {other}"
      )));
    }
  };

  let store = match config.db.provider.as_str() {
    "postgres" => {
      let database_url = config.db.database_url.as_deref().ok_or_else(|| {
        MemoryError::Configuration(
          "DATABASE_URL (or DATABASE_USER/NAME) must be set for the postgres store".into(),
        )
      })?;
      VectorStore::Postgres(
        PostgresStore::connect(
          database_url,
          &config.db.collection_name,
          config.embedding.dim,
          config.db.provider_config.as_ref(),
        )
        .await?,
      )
    }
    "memory" => VectorStore::Memory(MemoryStore::new(
      &config.db.collection_name,
      config.embedding.dim,
      config.db.persist_dir.as_deref(),
    )?),
    other => {
      return Err(MemoryError::Configuration(format!(
        "unsupported DB provider: {other}"
      )));
    }
  };

  store.setup().await?;

  tracing::info!(
    llm = %config.llm.provider,
    embedding = %config.embedding.provider,
    db = %config.db.provider,
    collection = %config.db.collection_name,
    "memory service ready"
  );
  Ok(MemoryService::new(llm, embedder, store))
}

#[cfg(test)]
mod tests {
  use engram_shared::{DbConfig, EmbeddingConfig, LlmConfig, TelemetryConfig};

  use super::*;

  fn config() -> Config {
    Config {
      llm: LlmConfig {
        provider: "openai".into(),
        model: "gpt-4o-mini".into(),
        api_key: "test-key".into(),
        base_url: None,
        calls_per_second: 2.0,
      },
      embedding: EmbeddingConfig {
        provider: "openai".into(),
        model: "text-embedding-3-small".into(),
        api_key: "test-key".into(),
        base_url: None,
        dim: 8,
      },
      db: DbConfig {
        provider: "memory".into(),
        collection_name: "memories".into(),
        database_url: None,
        persist_dir: None,
        provider_config: None,
      },
      telemetry: TelemetryConfig {
        enable_otel: false,
        service_name: "engram".into(),
        otlp_endpoint: None,
        otlp_headers: None,
      },
    }
  }

  #[tokio::test]
  async fn builds_service_with_memory_store() {
    assert!(build_service(&config()).await.is_ok());
  }

  #[tokio::test]
  async fn unknown_providers_are_configuration_errors() {
    let mut bad_llm = config();
    bad_llm.llm.provider = "carrier-pigeon".into();
    assert!(matches!(
      build_service(&bad_llm).await,
      Err(MemoryError::Configuration(_))
    ));

    let mut bad_db = config();
    bad_db.db.provider = "floppy".into();
    assert!(matches!(
      build_service(&bad_db).await,
      Err(MemoryError::Configuration(_))
    ));
  }

  #[tokio::test]
  async fn postgres_without_url_is_a_configuration_error() {
    let mut cfg = config();
    cfg.db.provider = "postgres".into();
    assert!(matches!(
      build_service(&cfg).await,
      Err(MemoryError::Configuration(_))
    ));
  }

  #[tokio::test]
  async fn missing_api_key_is_a_configuration_error() {
    let mut cfg = config();
    cfg.llm.api_key = String::new();
    assert!(matches!(
      build_service(&cfg).await,
      Err(MemoryError::Configuration(_))
    ));
  }
}
