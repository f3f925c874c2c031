use std::collections::HashSet;

use chrono::Utc;
use engram_ai::{Embedder, Llm};
use engram_shared::{MemoryError, MemoryFilter, MemoryMetadata, MemoryRecord, span_kind};
use engram_store::{MemoryUpdate, VectorStore};
use uuid::Uuid;

use crate::consolidator::{Consolidation, PlanAction, consolidate};
use crate::extractor::{extract_facts, flatten_transcript};
use crate::model::{ActionConfirmation, ActionStatus, ConversationMessage, MemoryResponse};

/// Replacement content for one memory, as accepted by the update
/// endpoint.
#[derive(Debug, Clone)]
pub struct MemoryUpdateItem {
  pub id: String,
  pub document: String,
}

/// Orchestrates the memory pipeline over the injected providers.
///
/// Stateless per request: the struct only holds shared handles, all of
/// which are safe for concurrent use, so one instance serves every
/// in-flight request.
#[derive(Debug, Clone)]
pub struct MemoryService {
  llm: Llm,
  embedder: Embedder,
  store: VectorStore,
}

impl MemoryService {
  #[must_use]
  pub fn new(llm: Llm, embedder: Embedder, store: VectorStore) -> Self {
    Self {
      llm,
      embedder,
      store,
    }
  }

  /// Extract facts from a conversation and persist them, consolidating
  /// against semantic neighbors unless `consolidate` is false. Returns
  /// an empty list when the conversation carries no text or yields no
  /// facts.
  #[tracing::instrument(name = "memories.generate", skip_all, fields(span.kind = span_kind::CHAIN, user_id = %metadata.user_id))]
  pub async fn generate(
    &self,
    messages: &[ConversationMessage],
    metadata: &MemoryMetadata,
    consolidate: bool,
  ) -> Result<Vec<ActionConfirmation>, MemoryError> {
    metadata.validate()?;

    let transcript = flatten_transcript(messages);
    if transcript.trim().is_empty() {
      return Ok(vec![]);
    }

    let facts = extract_facts(&transcript, &self.llm).await?;
    if facts.is_empty() {
      return Ok(vec![]);
    }

    self.store_facts(facts, metadata, consolidate).await
  }

  /// Persist caller-provided documents directly, skipping extraction.
  #[tracing::instrument(name = "memories.create", skip_all, fields(span.kind = span_kind::CHAIN, user_id = %metadata.user_id))]
  pub async fn create(
    &self,
    documents: Vec<String>,
    metadata: &MemoryMetadata,
    consolidate: bool,
  ) -> Result<Vec<ActionConfirmation>, MemoryError> {
    metadata.validate()?;
    if documents.is_empty() {
      return Err(MemoryError::InvalidRequest(
        "at least one document is required".into(),
      ));
    }
    if documents.iter().any(|doc| doc.trim().is_empty()) {
      return Err(MemoryError::InvalidRequest(
        "documents must be non-empty strings".into(),
      ));
    }

    self.store_facts(documents, metadata, consolidate).await
  }

  /// Replace the documents of existing memories, re-embedding in one
  /// batch. Unknown ids become NOT_FOUND confirmations; the second
  /// return value is true iff any id was unknown.
  #[tracing::instrument(name = "memories.update", skip_all, fields(span.kind = span_kind::CHAIN, item_count = items.len()))]
  pub async fn update(
    &self,
    items: Vec<MemoryUpdateItem>,
  ) -> Result<(Vec<ActionConfirmation>, bool), MemoryError> {
    if items.iter().any(|item| item.document.trim().is_empty()) {
      return Err(MemoryError::InvalidRequest(
        "update documents must be non-empty strings".into(),
      ));
    }

    let ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
    let known: HashSet<String> = self
      .store
      .get_by_ids(&ids)
      .await?
      .into_iter()
      .map(|record| record.id)
      .collect();

    let to_update: Vec<&MemoryUpdateItem> =
      items.iter().filter(|item| known.contains(&item.id)).collect();

    if !to_update.is_empty() {
      let documents: Vec<String> = to_update.iter().map(|item| item.document.clone()).collect();
      let embeddings = self.embedder.generate(&documents).await?;
      let updates = to_update
        .iter()
        .zip(embeddings)
        .map(|(item, embedding)| MemoryUpdate {
          id: item.id.clone(),
          document: item.document.clone(),
          embedding,
        })
        .collect();
      self.store.update(updates).await?;
    }

    let mut partial_failure = false;
    let confirmations = items
      .into_iter()
      .map(|item| {
        if known.contains(&item.id) {
          ActionConfirmation::new(item.id, Some(item.document), ActionStatus::Updated)
        } else {
          partial_failure = true;
          ActionConfirmation::new(item.id, None, ActionStatus::NotFound)
        }
      })
      .collect();
    Ok((confirmations, partial_failure))
  }

  /// Delete memories by id. Unknown ids become NOT_FOUND
  /// confirmations; the second return value is true iff any id was
  /// unknown.
  #[tracing::instrument(name = "memories.delete", skip_all, fields(span.kind = span_kind::CHAIN, item_count = ids.len()))]
  pub async fn delete(
    &self,
    ids: Vec<String>,
  ) -> Result<(Vec<ActionConfirmation>, bool), MemoryError> {
    let known: HashSet<String> = self
      .store
      .get_by_ids(&ids)
      .await?
      .into_iter()
      .map(|record| record.id)
      .collect();

    let to_delete: Vec<String> = ids.iter().filter(|id| known.contains(*id)).cloned().collect();
    if !to_delete.is_empty() {
      self.store.delete(&to_delete).await?;
    }

    let mut partial_failure = false;
    let confirmations = ids
      .into_iter()
      .map(|id| {
        if known.contains(&id) {
          ActionConfirmation::new(id, None, ActionStatus::Deleted)
        } else {
          partial_failure = true;
          ActionConfirmation::new(id, None, ActionStatus::NotFound)
        }
      })
      .collect();
    Ok((confirmations, partial_failure))
  }

  /// Fetch memories by id; only found ids are returned.
  #[tracing::instrument(name = "memories.get_by_ids", skip_all, fields(span.kind = span_kind::CHAIN, item_count = ids.len()))]
  pub async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<MemoryResponse>, MemoryError> {
    let records = self.store.get_by_ids(ids).await?;
    Ok(records.into_iter().map(record_response).collect())
  }

  /// Equality-filtered lookup, newest first.
  #[tracing::instrument(name = "memories.search", skip_all, fields(span.kind = span_kind::CHAIN))]
  pub async fn search_by_metadata(
    &self,
    filter: &MemoryFilter,
    limit: usize,
  ) -> Result<Vec<MemoryResponse>, MemoryError> {
    let records = self.store.query_by_filter(filter, limit).await?;
    Ok(records.into_iter().map(record_response).collect())
  }

  /// Semantic search over one or more query texts. All queries are
  /// embedded in a single call; results are flattened grouped by query
  /// then rank — batching exists for fan-out efficiency, not for
  /// cross-query ordering.
  #[tracing::instrument(name = "memories.search_similar", skip_all, fields(span.kind = span_kind::CHAIN, query_count = query_texts.len()))]
  pub async fn search_similar(
    &self,
    query_texts: &[String],
    filter: &MemoryFilter,
    limit: usize,
  ) -> Result<Vec<MemoryResponse>, MemoryError> {
    if query_texts.is_empty() {
      return Err(MemoryError::InvalidRequest(
        "at least one query text is required".into(),
      ));
    }

    let embeddings = self.embedder.generate(query_texts).await?;
    let groups = self
      .store
      .query_by_similarity(&embeddings, filter, limit)
      .await?;

    Ok(
      groups
        .into_iter()
        .flatten()
        .map(|hit| MemoryResponse {
          id: hit.id,
          document: hit.document,
          metadata: hit.metadata,
          created_at: Some(hit.created_at),
          updated_at: Some(hit.updated_at),
          similarity: Some(hit.similarity),
        })
        .collect(),
    )
  }

  async fn store_facts(
    &self,
    facts: Vec<String>,
    metadata: &MemoryMetadata,
    consolidate_facts: bool,
  ) -> Result<Vec<ActionConfirmation>, MemoryError> {
    if !consolidate_facts {
      return self.add_directly(facts, metadata).await;
    }

    let consolidation =
      consolidate(&facts, metadata, &self.llm, &self.embedder, &self.store).await?;
    self.apply_plan(consolidation, metadata).await
  }

  /// Embed in one batch and add, returning CREATED confirmations.
  async fn add_directly(
    &self,
    facts: Vec<String>,
    metadata: &MemoryMetadata,
  ) -> Result<Vec<ActionConfirmation>, MemoryError> {
    let embeddings = self.embedder.generate(&facts).await?;
    let records: Vec<MemoryRecord> = facts
      .iter()
      .zip(embeddings)
      .map(|(fact, embedding)| new_record(fact.clone(), embedding, metadata))
      .collect();

    let ids = self.store.add(records).await?;
    Ok(
      ids
        .into_iter()
        .zip(facts)
        .map(|(id, fact)| ActionConfirmation::new(id, Some(fact), ActionStatus::Created))
        .collect(),
    )
  }

  /// Apply a validated plan in fixed group order: adds, then updates,
  /// then deletes. A failing group surfaces its error without rolling
  /// back the groups already applied; the partial state is logged.
  async fn apply_plan(
    &self,
    consolidation: Consolidation,
    metadata: &MemoryMetadata,
  ) -> Result<Vec<ActionConfirmation>, MemoryError> {
    let Consolidation { plan, temp_to_real } = consolidation;

    let mut creates = Vec::new();
    let mut updates: Vec<(String, String)> = Vec::new();
    let mut deletes = Vec::new();
    for item in plan {
      match item.action {
        PlanAction::Create => creates.push(item.text),
        // Validated upstream: temp ids of non-CREATE items are mapped
        PlanAction::Update => {
          if let Some(real_id) = temp_to_real.get(&item.id) {
            updates.push((real_id.clone(), item.text));
          }
        }
        PlanAction::Delete => {
          if let Some(real_id) = temp_to_real.get(&item.id) {
            deletes.push(real_id.clone());
          }
        }
        PlanAction::Noop => {}
      }
    }

    let mut confirmations = Vec::new();

    if !creates.is_empty() {
      let created = self
        .add_directly(creates, metadata)
        .await
        .inspect_err(|err| log_partial_apply("create", &confirmations, err))?;
      confirmations.extend(created);
    }

    if !updates.is_empty() {
      let documents: Vec<String> = updates.iter().map(|(_, text)| text.clone()).collect();
      let group = async {
        let embeddings = self.embedder.generate(&documents).await?;
        let items = updates
          .iter()
          .zip(embeddings)
          .map(|((id, text), embedding)| MemoryUpdate {
            id: id.clone(),
            document: text.clone(),
            embedding,
          })
          .collect();
        self.store.update(items).await
      };
      let updated_ids = group
        .await
        .inspect_err(|err| log_partial_apply("update", &confirmations, err))?;
      let updated: HashSet<String> = updated_ids.into_iter().collect();
      confirmations.extend(updates.into_iter().filter_map(|(id, text)| {
        updated
          .contains(&id)
          .then(|| ActionConfirmation::new(id, Some(text), ActionStatus::Updated))
      }));
    }

    if !deletes.is_empty() {
      let deleted = self
        .store
        .delete(&deletes)
        .await
        .inspect_err(|err| log_partial_apply("delete", &confirmations, err))?;
      confirmations.extend(
        deleted
          .into_iter()
          .map(|id| ActionConfirmation::new(id, None, ActionStatus::Deleted)),
      );
    }

    Ok(confirmations)
  }
}

fn log_partial_apply(group: &str, applied: &[ActionConfirmation], err: &MemoryError) {
  tracing::error!(
    group,
    applied = applied.len(),
    error = %err,
    "plan application failed; earlier groups remain applied"
  );
}

fn new_record(document: String, embedding: Vec<f32>, metadata: &MemoryMetadata) -> MemoryRecord {
  let now = Utc::now();
  let mut metadata = metadata.clone();
  // Ingestion default for the optional event timestamp
  metadata.event_timestamp.get_or_insert(now);
  MemoryRecord {
    id: Uuid::now_v7().to_string(),
    document,
    embedding,
    metadata,
    created_at: now,
    updated_at: now,
  }
}

fn record_response(record: MemoryRecord) -> MemoryResponse {
  MemoryResponse {
    id: record.id,
    document: record.document,
    metadata: record.metadata,
    created_at: Some(record.created_at),
    updated_at: Some(record.updated_at),
    similarity: None,
  }
}
