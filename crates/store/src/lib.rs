use engram_shared::{MemoryError, MemoryFilter, MemoryRecord};

mod memory;
pub use memory::MemoryStore;

mod postgres;
pub use postgres::PostgresStore;

mod types;
pub use types::{MemoryUpdate, SimilarityHit};

/// Closed set of vector store variants, selected once by the factory.
///
/// Every variant is collection-scoped: one named collection, one
/// embedding dimension, cosine metric. Operations require `setup()` to
/// have completed; before that they fail with a 503-mapped error.
#[derive(Debug, Clone)]
pub enum VectorStore {
  Postgres(PostgresStore),
  Memory(MemoryStore),
}

impl VectorStore {
  /// Idempotent: ensures the backing table/index (or snapshot file) is
  /// in place. Concurrent setup attempts must not error.
  pub async fn setup(&self) -> Result<(), MemoryError> {
    match self {
      Self::Postgres(store) => store.setup().await,
      Self::Memory(store) => store.setup().await,
    }
  }

  /// Insert records, idempotent by id: a conflicting id has its
  /// document and embedding replaced and `updated_at` bumped. Returns
  /// all ids in input order.
  pub async fn add(&self, items: Vec<MemoryRecord>) -> Result<Vec<String>, MemoryError> {
    match self {
      Self::Postgres(store) => store.add(items).await,
      Self::Memory(store) => store.add(items).await,
    }
  }

  /// Update document + embedding + `updated_at` for known ids;
  /// `created_at` and metadata are preserved. Unknown ids are skipped.
  /// Returns the ids actually updated, in input order.
  pub async fn update(&self, items: Vec<MemoryUpdate>) -> Result<Vec<String>, MemoryError> {
    match self {
      Self::Postgres(store) => store.update(items).await,
      Self::Memory(store) => store.update(items).await,
    }
  }

  /// Delete by id; unknown ids are skipped. Returns the requested ids.
  pub async fn delete(&self, ids: &[String]) -> Result<Vec<String>, MemoryError> {
    match self {
      Self::Postgres(store) => store.delete(ids).await,
      Self::Memory(store) => store.delete(ids).await,
    }
  }

  /// Fetch records by id. Only found ids are returned; ordering is
  /// unspecified.
  pub async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<MemoryRecord>, MemoryError> {
    match self {
      Self::Postgres(store) => store.get_by_ids(ids).await,
      Self::Memory(store) => store.get_by_ids(ids).await,
    }
  }

  /// Equality-filtered scan, newest first, at most `limit` records.
  pub async fn query_by_filter(
    &self,
    filter: &MemoryFilter,
    limit: usize,
  ) -> Result<Vec<MemoryRecord>, MemoryError> {
    match self {
      Self::Postgres(store) => store.query_by_filter(filter, limit).await,
      Self::Memory(store) => store.query_by_filter(filter, limit).await,
    }
  }

  /// Batch ANN query: one ordered result group per query vector, in
  /// input order, each sorted by similarity descending with
  /// similarity = 1 − cosine_distance ∈ [0, 1] and length ≤ `top_k`.
  pub async fn query_by_similarity(
    &self,
    embeddings: &[Vec<f32>],
    filter: &MemoryFilter,
    top_k: usize,
  ) -> Result<Vec<Vec<SimilarityHit>>, MemoryError> {
    match self {
      Self::Postgres(store) => store.query_by_similarity(embeddings, filter, top_k).await,
      Self::Memory(store) => store.query_by_similarity(embeddings, filter, top_k).await,
    }
  }
}

/// Collection names end up in DDL, so they are locked down to
/// `[A-Za-z_][A-Za-z0-9_]*` at construction. Values are always bound.
pub(crate) fn validate_collection_name(name: &str) -> Result<(), MemoryError> {
  let mut chars = name.chars();
  let valid = match chars.next() {
    Some(first) if first.is_ascii_alphabetic() || first == '_' => {
      chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
    _ => false,
  };
  if valid {
    Ok(())
  } else {
    Err(MemoryError::Configuration(format!(
      "invalid collection name `{name}`: must match [A-Za-z_][A-Za-z0-9_]*"
    )))
  }
}
