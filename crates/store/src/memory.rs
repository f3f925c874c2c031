use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use engram_ai::cosine_similarity;
use engram_shared::{MemoryError, MemoryFilter, MemoryRecord, span_kind};
use tokio::sync::RwLock;

use crate::{MemoryUpdate, SimilarityHit, validate_collection_name};

/// Embedded vector store: a map behind an async lock with a brute-force
/// cosine scan, optionally snapshotted to `<persist_dir>/<collection>.json`.
/// Serves local single-node deployments and the test suite; the postgres
/// variant is the production path.
#[derive(Debug, Clone)]
pub struct MemoryStore {
  dim: usize,
  snapshot_path: Option<PathBuf>,
  records: Arc<RwLock<HashMap<String, MemoryRecord>>>,
  ready: Arc<AtomicBool>,
}

impl MemoryStore {
  pub fn new(
    collection_name: &str,
    dim: usize,
    persist_dir: Option<&str>,
  ) -> Result<Self, MemoryError> {
    validate_collection_name(collection_name)?;
    Ok(Self {
      dim,
      snapshot_path: persist_dir.map(|dir| PathBuf::from(dir).join(format!("{collection_name}.json"))),
      records: Arc::new(RwLock::new(HashMap::new())),
      ready: Arc::new(AtomicBool::new(false)),
    })
  }

  pub async fn setup(&self) -> Result<(), MemoryError> {
    if let Some(path) = &self.snapshot_path {
      if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
          .map_err(|err| MemoryError::Database(format!("cannot create persist dir: {err}")))?;
      }
      if path.exists() {
        let raw = std::fs::read_to_string(path)
          .map_err(|err| MemoryError::Database(format!("cannot read snapshot: {err}")))?;
        let loaded: Vec<MemoryRecord> = serde_json::from_str(&raw)
          .map_err(|err| MemoryError::Database(format!("corrupt snapshot: {err}")))?;
        let mut records = self.records.write().await;
        for record in loaded {
          records.insert(record.id.clone(), record);
        }
      }
    }
    self.ready.store(true, Ordering::Release);
    Ok(())
  }

  fn ensure_open(&self) -> Result<(), MemoryError> {
    if self.ready.load(Ordering::Acquire) {
      Ok(())
    } else {
      Err(MemoryError::Database(
        "collection is not initialized; call setup() first".into(),
      ))
    }
  }

  fn check_dimensions(&self, embedding: &[f32]) -> Result<(), MemoryError> {
    if embedding.len() == self.dim {
      Ok(())
    } else {
      Err(MemoryError::InvalidRequest(format!(
        "embedding dimension mismatch: expected {}, got {}",
        self.dim,
        embedding.len()
      )))
    }
  }

  /// Snapshot while still holding the write guard, so concurrent
  /// mutations cannot interleave between mutate and persist.
  fn persist(&self, records: &HashMap<String, MemoryRecord>) -> Result<(), MemoryError> {
    let Some(path) = &self.snapshot_path else {
      return Ok(());
    };
    let all: Vec<&MemoryRecord> = records.values().collect();
    let serialized = serde_json::to_string(&all)
      .map_err(|err| MemoryError::Database(format!("cannot serialize snapshot: {err}")))?;
    std::fs::write(path, serialized)
      .map_err(|err| MemoryError::Database(format!("cannot write snapshot: {err}")))
  }

  #[tracing::instrument(name = "db.add", skip_all, fields(span.kind = span_kind::DB, db.item_count = items.len()))]
  pub async fn add(&self, items: Vec<MemoryRecord>) -> Result<Vec<String>, MemoryError> {
    self.ensure_open()?;
    for item in &items {
      if item.document.is_empty() {
        return Err(MemoryError::InvalidRequest(
          "memory document must be non-empty".into(),
        ));
      }
      self.check_dimensions(&item.embedding)?;
    }

    let mut records = self.records.write().await;
    let ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
    for mut item in items {
      match records.get_mut(&item.id) {
        // Conflicting id: replace content, keep identity and metadata
        Some(existing) => {
          existing.document = item.document;
          existing.embedding = item.embedding;
          existing.updated_at = Utc::now();
        }
        None => {
          item.updated_at = item.created_at;
          records.insert(item.id.clone(), item);
        }
      }
    }
    self.persist(&records)?;
    Ok(ids)
  }

  #[tracing::instrument(name = "db.update", skip_all, fields(span.kind = span_kind::DB, db.item_count = items.len()))]
  pub async fn update(&self, items: Vec<MemoryUpdate>) -> Result<Vec<String>, MemoryError> {
    self.ensure_open()?;
    for item in &items {
      self.check_dimensions(&item.embedding)?;
    }

    let mut records = self.records.write().await;
    let mut updated = Vec::new();
    for item in items {
      if let Some(existing) = records.get_mut(&item.id) {
        existing.document = item.document;
        existing.embedding = item.embedding;
        existing.updated_at = Utc::now();
        updated.push(item.id);
      }
    }
    self.persist(&records)?;
    Ok(updated)
  }

  #[tracing::instrument(name = "db.delete", skip_all, fields(span.kind = span_kind::DB, db.item_count = ids.len()))]
  pub async fn delete(&self, ids: &[String]) -> Result<Vec<String>, MemoryError> {
    self.ensure_open()?;
    let mut records = self.records.write().await;
    for id in ids {
      records.remove(id);
    }
    self.persist(&records)?;
    Ok(ids.to_vec())
  }

  #[tracing::instrument(name = "db.query.id", skip_all, fields(span.kind = span_kind::DB, db.item_count = ids.len()))]
  pub async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<MemoryRecord>, MemoryError> {
    self.ensure_open()?;
    let records = self.records.read().await;
    Ok(ids.iter().filter_map(|id| records.get(id).cloned()).collect())
  }

  #[tracing::instrument(name = "db.query.metadata", skip_all, fields(span.kind = span_kind::DB, db.limit = limit))]
  pub async fn query_by_filter(
    &self,
    filter: &MemoryFilter,
    limit: usize,
  ) -> Result<Vec<MemoryRecord>, MemoryError> {
    self.ensure_open()?;
    let records = self.records.read().await;
    let mut matched: Vec<MemoryRecord> = records
      .values()
      .filter(|record| filter.matches(&record.metadata))
      .cloned()
      .collect();
    // Newest first, like the relational variant
    matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    matched.truncate(limit);
    Ok(matched)
  }

  #[tracing::instrument(
    name = "db.query.similarity",
    skip_all,
    fields(span.kind = span_kind::DB, db.query_count = embeddings.len(), db.top_k = top_k)
  )]
  pub async fn query_by_similarity(
    &self,
    embeddings: &[Vec<f32>],
    filter: &MemoryFilter,
    top_k: usize,
  ) -> Result<Vec<Vec<SimilarityHit>>, MemoryError> {
    self.ensure_open()?;
    for embedding in embeddings {
      self.check_dimensions(embedding)?;
    }

    let records = self.records.read().await;
    let candidates: Vec<&MemoryRecord> = records
      .values()
      .filter(|record| filter.matches(&record.metadata))
      .collect();

    let mut groups = Vec::with_capacity(embeddings.len());
    for embedding in embeddings {
      let mut hits: Vec<SimilarityHit> = candidates
        .iter()
        .map(|record| SimilarityHit {
          id: record.id.clone(),
          document: record.document.clone(),
          metadata: record.metadata.clone(),
          created_at: record.created_at,
          updated_at: record.updated_at,
          similarity: cosine_similarity(embedding, &record.embedding).clamp(0.0, 1.0),
        })
        .collect();
      hits.sort_by(|a, b| {
        b.similarity
          .total_cmp(&a.similarity)
          .then_with(|| a.id.cmp(&b.id))
      });
      hits.truncate(top_k);
      groups.push(hits);
    }
    Ok(groups)
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use engram_shared::MemoryMetadata;

  use super::*;

  const DIM: usize = 8;

  fn metadata(user_id: &str) -> MemoryMetadata {
    MemoryMetadata {
      user_id: user_id.into(),
      app_id: "a1".into(),
      session_id: "s1".into(),
      agent_name: "root".into(),
      event_timestamp: None,
    }
  }

  fn record(id: &str, document: &str, seed: f32, user_id: &str) -> MemoryRecord {
    let mut embedding = vec![0.0; DIM];
    embedding[0] = seed;
    embedding[1] = 1.0 - seed;
    let now = Utc::now();
    MemoryRecord {
      id: id.into(),
      document: document.into(),
      embedding,
      metadata: metadata(user_id),
      created_at: now,
      updated_at: now,
    }
  }

  async fn open_store() -> MemoryStore {
    let store = MemoryStore::new("memories", DIM, None).unwrap();
    store.setup().await.unwrap();
    store
  }

  #[tokio::test]
  async fn operations_require_setup() {
    let store = MemoryStore::new("memories", DIM, None).unwrap();
    let err = store.get_by_ids(&["x".into()]).await.unwrap_err();
    assert!(matches!(err, MemoryError::Database(_)));
  }

  #[tokio::test]
  async fn add_is_idempotent_by_id() {
    let store = open_store().await;
    store.add(vec![record("m1", "likes rust", 1.0, "u1")]).await.unwrap();
    let before = store.get_by_ids(&["m1".into()]).await.unwrap().remove(0);

    store
      .add(vec![record("m1", "loves rust", 0.9, "u1")])
      .await
      .unwrap();
    let records = store.get_by_ids(&["m1".into()]).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].document, "loves rust");
    assert_eq!(records[0].created_at, before.created_at);
    assert!(records[0].updated_at >= before.updated_at);
  }

  #[tokio::test]
  async fn add_rejects_dimension_mismatch_and_empty_document() {
    let store = open_store().await;

    let mut bad_dim = record("m1", "doc", 1.0, "u1");
    bad_dim.embedding = vec![1.0; DIM + 1];
    assert!(matches!(
      store.add(vec![bad_dim]).await,
      Err(MemoryError::InvalidRequest(_))
    ));

    let mut empty = record("m2", "", 1.0, "u1");
    empty.document = String::new();
    assert!(matches!(
      store.add(vec![empty]).await,
      Err(MemoryError::InvalidRequest(_))
    ));
  }

  #[tokio::test]
  async fn update_skips_unknown_ids_and_preserves_metadata() {
    let store = open_store().await;
    store.add(vec![record("m1", "old text", 1.0, "u1")]).await.unwrap();
    let before = store.get_by_ids(&["m1".into()]).await.unwrap().remove(0);

    let updated = store
      .update(vec![
        MemoryUpdate {
          id: "m1".into(),
          document: "new text".into(),
          embedding: vec![1.0 / (DIM as f32).sqrt(); DIM],
        },
        MemoryUpdate {
          id: "missing".into(),
          document: "x".into(),
          embedding: vec![0.0; DIM],
        },
      ])
      .await
      .unwrap();

    assert_eq!(updated, vec!["m1".to_owned()]);
    let after = store.get_by_ids(&["m1".into()]).await.unwrap().remove(0);
    assert_eq!(after.document, "new text");
    assert_eq!(after.created_at, before.created_at);
    assert_eq!(after.metadata.user_id, before.metadata.user_id);
    assert!(after.updated_at >= after.created_at);
  }

  #[tokio::test]
  async fn delete_then_get_returns_nothing() {
    let store = open_store().await;
    store.add(vec![record("m1", "doc", 1.0, "u1")]).await.unwrap();
    store.delete(&["m1".into(), "missing".into()]).await.unwrap();
    assert!(store.get_by_ids(&["m1".into()]).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn filter_queries_apply_equality_on_all_fields() {
    let store = open_store().await;
    store
      .add(vec![
        record("m1", "fact one", 1.0, "u1"),
        record("m2", "fact two", 0.5, "u1"),
        record("m3", "other user", 0.2, "u2"),
      ])
      .await
      .unwrap();

    let filter = MemoryFilter {
      user_id: Some("u1".into()),
      ..MemoryFilter::default()
    };
    let results = store.query_by_filter(&filter, 50).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.metadata.user_id == "u1"));

    let results = store.query_by_filter(&MemoryFilter::default(), 2).await.unwrap();
    assert_eq!(results.len(), 2);
  }

  #[tokio::test]
  async fn similarity_groups_are_sorted_and_bounded() {
    let store = open_store().await;
    store
      .add(vec![
        record("m1", "close", 1.0, "u1"),
        record("m2", "mid", 0.6, "u1"),
        record("m3", "far", 0.0, "u1"),
      ])
      .await
      .unwrap();

    let query = record("q", "q", 1.0, "u1").embedding;
    let groups = store
      .query_by_similarity(&[query.clone(), query], &MemoryFilter::default(), 2)
      .await
      .unwrap();

    assert_eq!(groups.len(), 2);
    for group in &groups {
      assert_eq!(group.len(), 2);
      assert_eq!(group[0].id, "m1");
      assert!(group[0].similarity >= group[1].similarity);
      for hit in group {
        assert!((0.0..=1.0).contains(&hit.similarity));
      }
    }
  }

  #[tokio::test]
  async fn snapshot_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let persist = dir.path().to_str().unwrap().to_owned();

    let store = MemoryStore::new("memories", DIM, Some(persist.as_str())).unwrap();
    store.setup().await.unwrap();
    store.add(vec![record("m1", "durable", 1.0, "u1")]).await.unwrap();

    let reopened = MemoryStore::new("memories", DIM, Some(persist.as_str())).unwrap();
    reopened.setup().await.unwrap();
    let records = reopened.get_by_ids(&["m1".into()]).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].document, "durable");
  }
}
