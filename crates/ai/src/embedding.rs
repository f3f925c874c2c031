use std::collections::HashMap;

use async_openai::{
  Client, config::OpenAIConfig, error::OpenAIError,
  types::embeddings::CreateEmbeddingRequestArgs,
};
use engram_shared::{EmbeddingConfig, MemoryError, span_kind};

use crate::{RateLimiter, RetryPolicy};

/// Outbound embedding calls per second for the OpenAI provider.
const EMBEDDING_CALLS_PER_SECOND: f64 = 5.0;

/// Closed set of embedding providers.
#[derive(Debug, Clone)]
pub enum Embedder {
  OpenAi(OpenAiEmbedder),
  Deterministic(DeterministicEmbedder),
}

impl Embedder {
  /// Embed a batch of texts in a single call. Output order matches
  /// input order and every vector has the configured dimension.
  pub async fn generate(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MemoryError> {
    match self {
      Self::OpenAi(embedder) => embedder.generate(texts).await,
      Self::Deterministic(embedder) => Ok(embedder.generate(texts)),
    }
  }

  #[must_use]
  pub fn dim(&self) -> usize {
    match self {
      Self::OpenAi(embedder) => embedder.dim,
      Self::Deterministic(embedder) => embedder.dim,
    }
  }
}

// ──────────────────────────────────────────────────
// OpenAI-compatible provider
// ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
  client: Client<OpenAIConfig>,
  model: String,
  dim: usize,
  rate: RateLimiter,
  retry: RetryPolicy,
}

impl OpenAiEmbedder {
  pub fn new(config: &EmbeddingConfig) -> Result<Self, MemoryError> {
    if config.api_key.is_empty() {
      return Err(MemoryError::Configuration(
        "OPENAI_API_KEY must be set for the openai embedding provider".into(),
      ));
    }

    let mut openai = OpenAIConfig::new().with_api_key(&config.api_key);
    if let Some(base_url) = &config.base_url {
      openai = openai.with_api_base(base_url);
    }

    Ok(Self {
      client: Client::with_config(openai),
      model: config.model.clone(),
      dim: config.dim,
      rate: RateLimiter::new(EMBEDDING_CALLS_PER_SECOND),
      retry: RetryPolicy::default(),
    })
  }

  #[tracing::instrument(
    name = "embedding.generate",
    skip_all,
    fields(
      span.kind = span_kind::EMBEDDING,
      embedding.model_name = %self.model,
      embedding.item_count = texts.len(),
    )
  )]
  async fn generate(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MemoryError> {
    if texts.is_empty() {
      return Ok(vec![]);
    }

    self
      .retry
      .run(|| async move {
        self.rate.acquire().await;
        self.generate_once(texts).await
      })
      .await
  }

  async fn generate_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MemoryError> {
    let request = CreateEmbeddingRequestArgs::default()
      .model(&self.model)
      .input(texts.to_vec())
      .dimensions(self.dim as u32)
      .build()
      .map_err(classify_openai_error)?;

    let response = self
      .client
      .embeddings()
      .create(request)
      .await
      .map_err(classify_openai_error)?;

    // Sort by index so output order matches input order
    let mut data = response.data;
    data.sort_by_key(|e| e.index);

    if data.len() != texts.len() {
      return Err(MemoryError::Api(format!(
        "embedding count mismatch: expected {}, got {}",
        texts.len(),
        data.len()
      )));
    }

    let mut embeddings = Vec::with_capacity(data.len());
    for entry in data {
      if entry.embedding.len() != self.dim {
        return Err(MemoryError::Api(format!(
          "embedding dimension mismatch: expected {}, got {}",
          self.dim,
          entry.embedding.len()
        )));
      }
      embeddings.push(entry.embedding);
    }
    Ok(embeddings)
  }
}

fn classify_openai_error(err: OpenAIError) -> MemoryError {
  match &err {
    OpenAIError::Reqwest(_) | OpenAIError::StreamError(_) => {
      MemoryError::Retryable(err.to_string())
    }
    _ => MemoryError::Api(err.to_string()),
  }
}

// ──────────────────────────────────────────────────
// Deterministic provider
// ──────────────────────────────────────────────────

/// Hash-seeded unit vectors: the same text always embeds to the same
/// vector, distinct texts land far apart. Aliases let a test pin a
/// query text onto another text's vector. Used by tests and offline
/// smoke runs.
#[derive(Debug, Clone)]
pub struct DeterministicEmbedder {
  dim: usize,
  aliases: HashMap<String, String>,
}

impl DeterministicEmbedder {
  #[must_use]
  pub fn new(dim: usize) -> Self {
    Self {
      dim,
      aliases: HashMap::new(),
    }
  }

  /// Make `query` embed to the same vector as `target`.
  #[must_use]
  pub fn with_alias(mut self, query: impl Into<String>, target: impl Into<String>) -> Self {
    self.aliases.insert(query.into(), target.into());
    self
  }

  fn generate(&self, texts: &[String]) -> Vec<Vec<f32>> {
    texts.iter().map(|text| self.embed_one(text)).collect()
  }

  fn embed_one(&self, text: &str) -> Vec<f32> {
    let trimmed = text.trim();
    let canonical = self
      .aliases
      .get(trimmed)
      .map_or(trimmed, String::as_str);

    let mut state = fnv1a(canonical.as_bytes());
    let mut vector: Vec<f32> = (0..self.dim)
      .map(|_| {
        state = splitmix64(state);
        // map to [-1, 1]
        (state as f64 / u64::MAX as f64).mul_add(2.0, -1.0) as f32
      })
      .collect();

    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-12 {
      for x in &mut vector {
        *x /= norm;
      }
    }
    vector
  }
}

fn fnv1a(bytes: &[u8]) -> u64 {
  let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
  for &byte in bytes {
    hash ^= u64::from(byte);
    hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
  }
  hash
}

fn splitmix64(state: u64) -> u64 {
  let mut z = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
  z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
  z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
  z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
  use crate::cosine_similarity;

  use super::*;

  #[tokio::test]
  async fn same_text_embeds_identically() {
    let embedder = Embedder::Deterministic(DeterministicEmbedder::new(64));
    let out = embedder
      .generate(&["My name is Jane".into(), "My name is Jane".into()])
      .await
      .unwrap();
    assert_eq!(out[0], out[1]);
    assert!((cosine_similarity(&out[0], &out[1]) - 1.0).abs() < 1e-6);
  }

  #[tokio::test]
  async fn distinct_texts_are_far_apart() {
    let embedder = Embedder::Deterministic(DeterministicEmbedder::new(64));
    let out = embedder
      .generate(&["likes rust".into(), "lives in tokyo".into()])
      .await
      .unwrap();
    assert!(cosine_similarity(&out[0], &out[1]) < 0.9);
  }

  #[tokio::test]
  async fn vectors_are_unit_length_with_configured_dim() {
    let embedder = Embedder::Deterministic(DeterministicEmbedder::new(32));
    let out = embedder.generate(&["anything".into()]).await.unwrap();
    assert_eq!(out[0].len(), 32);
    let norm: f32 = out[0].iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5);
  }

  #[tokio::test]
  async fn aliases_pin_queries_onto_target_vectors() {
    let embedder = Embedder::Deterministic(
      DeterministicEmbedder::new(64).with_alias("what is my job", "Jane is an AI engineer"),
    );
    let out = embedder
      .generate(&["what is my job".into(), "Jane is an AI engineer".into()])
      .await
      .unwrap();
    assert_eq!(out[0], out[1]);
  }
}
