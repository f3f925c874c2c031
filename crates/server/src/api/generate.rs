use axum::{Json, extract::State};
use engram_core::{ConversationMessage, MemoryMetadata};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{ApiError, api::MemoriesActionResponse, utils::AppState};

const fn default_consolidate() -> bool {
  true
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateMemoriesRequest {
  /// Conversation history alternating between user and model turns
  pub messages: Vec<ConversationMessage>,
  pub metadata: MemoryMetadata,
  /// Reconcile extracted facts against existing memories (default true)
  #[serde(default = "default_consolidate")]
  pub consolidate: bool,
}

/// Extract facts from a conversation and persist them with metadata
#[utoipa::path(
  post,
  path = "/api/v1/memories/generate",
  request_body = GenerateMemoriesRequest,
  responses(
    (status = 200, description = "Confirmations for every stored memory", body = MemoriesActionResponse),
    (status = 400, description = "Invalid metadata or messages"),
    (status = 503, description = "Upstream provider or store unavailable")
  )
)]
#[axum::debug_handler]
#[tracing::instrument(skip_all, fields(user_id = %payload.metadata.user_id))]
pub async fn generate_memories(
  State(state): State<AppState>,
  Json(payload): Json<GenerateMemoriesRequest>,
) -> Result<Json<MemoriesActionResponse>, ApiError> {
  let info = state
    .service
    .generate(&payload.messages, &payload.metadata, payload.consolidate)
    .await?;

  let message = if info.is_empty() {
    "No memories were generated from the conversation.".to_owned()
  } else {
    format!("Successfully added {} memories.", info.len())
  };
  Ok(Json(MemoriesActionResponse { message, info }))
}
