use axum::{Json, extract::State};
use engram_core::MemoryMetadata;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{ApiError, api::MemoriesActionResponse, utils::AppState};

const fn default_consolidate() -> bool {
  true
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateMemoriesRequest {
  /// Documents to store verbatim, at least one
  pub documents: Vec<String>,
  pub metadata: MemoryMetadata,
  /// Reconcile the documents against existing memories (default true)
  #[serde(default = "default_consolidate")]
  pub consolidate: bool,
}

/// Store caller-provided documents directly, skipping extraction
#[utoipa::path(
  post,
  path = "/api/v1/memories/create",
  request_body = CreateMemoriesRequest,
  responses(
    (status = 200, description = "Confirmations for every stored memory", body = MemoriesActionResponse),
    (status = 400, description = "Empty document list or invalid metadata"),
    (status = 503, description = "Upstream provider or store unavailable")
  )
)]
#[axum::debug_handler]
#[tracing::instrument(skip_all, fields(user_id = %payload.metadata.user_id, count = payload.documents.len()))]
pub async fn create_memories(
  State(state): State<AppState>,
  Json(payload): Json<CreateMemoriesRequest>,
) -> Result<Json<MemoriesActionResponse>, ApiError> {
  let info = state
    .service
    .create(payload.documents, &payload.metadata, payload.consolidate)
    .await?;

  Ok(Json(MemoriesActionResponse {
    message: format!("Successfully created {} memories.", info.len()),
    info,
  }))
}
