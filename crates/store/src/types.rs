use chrono::{DateTime, Utc};
use engram_shared::MemoryMetadata;
use serde::Serialize;

/// Replacement content for an existing memory. The store stamps
/// `updated_at` itself; `created_at` and metadata never change.
#[derive(Debug, Clone)]
pub struct MemoryUpdate {
  pub id: String,
  pub document: String,
  pub embedding: Vec<f32>,
}

/// One ANN match: the stored record minus its embedding, plus the
/// similarity score for the query vector that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarityHit {
  pub id: String,
  pub document: String,
  pub metadata: MemoryMetadata,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  /// 1 − cosine_distance, clamped to [0, 1].
  pub similarity: f32,
}
