use std::collections::{HashMap, HashSet};

use engram_ai::{Embedder, Llm, ResponseSchema};
use engram_shared::{MemoryError, MemoryMetadata, safe_serialize, span_kind};
use engram_store::VectorStore;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::prompts::FACT_CONSOLIDATION_PROMPT;

/// Neighbors fetched per new fact when looking for consolidation
/// candidates.
const NEIGHBOR_TOP_K: usize = 3;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, strum::Display,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum PlanAction {
  Create,
  Update,
  Delete,
  Noop,
}

/// One step of a consolidation plan. `id` is a temporary index into
/// the neighbor list for existing memories, or a fresh value for new
/// facts; `old_text` is informational on UPDATE.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlanItem {
  pub id: String,
  pub text: String,
  pub action: PlanAction,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub old_text: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ConsolidationPlan {
  plan: Vec<PlanItem>,
}

/// What the LLM sees for each semantic neighbor.
#[derive(Debug, Serialize)]
struct ExistingMemory {
  id: String,
  text: String,
}

/// A validated plan plus the mapping from temporary neighbor ids back
/// to real store ids.
#[derive(Debug, Clone)]
pub struct Consolidation {
  pub plan: Vec<PlanItem>,
  pub temp_to_real: HashMap<String, String>,
}

/// Reconcile new facts with their semantic neighbors.
///
/// Embeds all facts in one batch, fetches top-k neighbors under the
/// metadata filter, deduplicates them by id in first-seen order and —
/// when neighbors exist — asks the LLM for a CREATE/UPDATE/DELETE/NOOP
/// plan. Plan items referencing an unknown temporary id are dropped
/// and logged; CREATE items are accepted regardless of their id.
#[tracing::instrument(name = "consolidate_facts", skip_all, fields(span.kind = span_kind::BACKGROUND, fact_count = facts.len()))]
pub(crate) async fn consolidate(
  facts: &[String],
  metadata: &MemoryMetadata,
  llm: &Llm,
  embedder: &Embedder,
  store: &VectorStore,
) -> Result<Consolidation, MemoryError> {
  let filter = metadata.filter();
  let embeddings = embedder.generate(facts).await?;
  let groups = store
    .query_by_similarity(&embeddings, &filter, NEIGHBOR_TOP_K)
    .await?;

  // Collapse neighbors shared across facts, first-seen order
  let mut seen = HashSet::new();
  let mut neighbors = Vec::new();
  for hit in groups.into_iter().flatten() {
    if seen.insert(hit.id.clone()) {
      neighbors.push(hit);
    }
  }

  if neighbors.is_empty() {
    let plan = facts
      .iter()
      .map(|fact| PlanItem {
        id: Uuid::now_v7().to_string(),
        text: fact.clone(),
        action: PlanAction::Create,
        old_text: None,
      })
      .collect();
    return Ok(Consolidation {
      plan,
      temp_to_real: HashMap::new(),
    });
  }

  let existing: Vec<ExistingMemory> = neighbors
    .iter()
    .enumerate()
    .map(|(index, hit)| ExistingMemory {
      id: index.to_string(),
      text: hit.document.clone(),
    })
    .collect();
  let temp_to_real: HashMap<String, String> = neighbors
    .iter()
    .enumerate()
    .map(|(index, hit)| (index.to_string(), hit.id.clone()))
    .collect();

  let user_message = format!(
    "Now, consolidate the facts using the following input:\n\
     1. EXISTING_MEMORIES: List of existing memories with `id` and `text`.\n{}\n\n\
     2. NEW_FACTS: A list of new facts to process.\n{}\n",
    safe_serialize(&existing),
    safe_serialize(&facts)
  );

  let schema = ResponseSchema::of::<ConsolidationPlan>("consolidation_plan")?;
  let response = llm
    .generate(FACT_CONSOLIDATION_PROMPT, &user_message, Some(&schema))
    .await?;
  let parsed: ConsolidationPlan = serde_json::from_str(&response)
    .map_err(|err| MemoryError::Api(format!("malformed consolidation response: {err}")))?;

  let plan: Vec<PlanItem> = parsed
    .plan
    .into_iter()
    .filter(|item| match item.action {
      PlanAction::Create => true,
      PlanAction::Update | PlanAction::Delete | PlanAction::Noop => {
        let known = temp_to_real.contains_key(&item.id);
        if !known {
          tracing::warn!(
            id = %item.id,
            action = %item.action,
            text = %item.text,
            "plan item references an unknown memory id, dropping"
          );
        }
        known
      }
    })
    .collect();

  tracing::debug!(
    neighbors = neighbors.len(),
    plan_items = plan.len(),
    "consolidation plan ready"
  );
  Ok(Consolidation { plan, temp_to_real })
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use engram_ai::{DeterministicEmbedder, ScriptedLlm};
  use engram_shared::MemoryRecord;
  use engram_store::MemoryStore;

  use super::*;

  const DIM: usize = 16;

  fn metadata() -> MemoryMetadata {
    MemoryMetadata {
      user_id: "u1".into(),
      app_id: "a1".into(),
      session_id: "s1".into(),
      agent_name: "root".into(),
      event_timestamp: None,
    }
  }

  async fn store_with(documents: &[&str], embedder: &Embedder) -> VectorStore {
    let store = MemoryStore::new("memories", DIM, None).unwrap();
    store.setup().await.unwrap();
    if !documents.is_empty() {
      let texts: Vec<String> = documents.iter().map(|d| (*d).to_owned()).collect();
      let embeddings = embedder.generate(&texts).await.unwrap();
      let now = Utc::now();
      let records = texts
        .into_iter()
        .zip(embeddings)
        .enumerate()
        .map(|(i, (document, embedding))| MemoryRecord {
          id: format!("m{i}"),
          document,
          embedding,
          metadata: metadata(),
          created_at: now,
          updated_at: now,
        })
        .collect();
      store.add(records).await.unwrap();
    }
    VectorStore::Memory(store)
  }

  #[tokio::test]
  async fn empty_store_yields_one_create_per_fact_in_order() {
    let embedder = Embedder::Deterministic(DeterministicEmbedder::new(DIM));
    let store = store_with(&[], &embedder).await;
    // No scripted responses: reaching the LLM would error
    let llm = Llm::Scripted(ScriptedLlm::default());

    let facts = vec!["My name is Jane".to_owned(), "I am an AI engineer".to_owned()];
    let consolidation = consolidate(&facts, &metadata(), &llm, &embedder, &store)
      .await
      .unwrap();

    assert_eq!(consolidation.plan.len(), 2);
    assert!(consolidation.temp_to_real.is_empty());
    for (item, fact) in consolidation.plan.iter().zip(&facts) {
      assert_eq!(item.action, PlanAction::Create);
      assert_eq!(&item.text, fact);
    }
    let ids: HashSet<&String> = consolidation.plan.iter().map(|item| &item.id).collect();
    assert_eq!(ids.len(), 2);
  }

  #[tokio::test]
  async fn duplicate_neighbors_collapse_into_one_existing_entry() {
    let embedder = Embedder::Deterministic(DeterministicEmbedder::new(DIM));
    let store = store_with(&["I am an AI engineer"], &embedder).await;
    let llm = Llm::Scripted(ScriptedLlm::new([r#"{"plan": []}"#]));

    // Both facts share the single stored neighbor
    let facts = vec!["fact one".to_owned(), "fact two".to_owned()];
    let consolidation = consolidate(&facts, &metadata(), &llm, &embedder, &store)
      .await
      .unwrap();

    assert_eq!(consolidation.temp_to_real.len(), 1);
    assert_eq!(consolidation.temp_to_real["0"], "m0");

    let Llm::Scripted(inner) = &llm else {
      unreachable!()
    };
    let (_, user_message) = inner.requests().remove(0);
    assert!(user_message.contains(r#""id":"0""#));
    assert!(!user_message.contains(r#""id":"1""#));
    assert!(user_message.contains("I am an AI engineer"));
  }

  #[tokio::test]
  async fn plan_items_with_unknown_temp_ids_are_dropped() {
    let embedder = Embedder::Deterministic(DeterministicEmbedder::new(DIM));
    let store = store_with(&["I live in Berlin"], &embedder).await;
    let llm = Llm::Scripted(ScriptedLlm::new([
      r#"{"plan": [
        {"id": "0", "text": "I live in Tokyo", "action": "UPDATE", "old_text": "I live in Berlin"},
        {"id": "99", "text": "bogus", "action": "DELETE"},
        {"id": "whatever", "text": "Moved to Tokyo recently", "action": "CREATE"}
      ]}"#,
    ]));

    let facts = vec!["I moved from Berlin to Tokyo".to_owned()];
    let consolidation = consolidate(&facts, &metadata(), &llm, &embedder, &store)
      .await
      .unwrap();

    assert_eq!(consolidation.plan.len(), 2);
    assert_eq!(consolidation.plan[0].action, PlanAction::Update);
    assert_eq!(consolidation.plan[0].id, "0");
    assert_eq!(consolidation.plan[1].action, PlanAction::Create);
  }

  #[tokio::test]
  async fn malformed_plan_is_an_api_error() {
    let embedder = Embedder::Deterministic(DeterministicEmbedder::new(DIM));
    let store = store_with(&["something stored"], &embedder).await;
    let llm = Llm::Scripted(ScriptedLlm::new(["{not a plan"]));

    let err = consolidate(
      &["a fact".to_owned()],
      &metadata(),
      &llm,
      &embedder,
      &store,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, MemoryError::Api(_)));
  }
}
