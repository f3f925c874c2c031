use axum::{Json, extract::State};
use engram_core::MemoryUpdateItem;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{ApiError, api::MemoriesActionResponse, utils::AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateMemoryItem {
  /// ID of the memory to update
  pub id: String,
  /// Replacement text for the memory
  pub document: String,
}

/// Replace the documents of existing memories
#[utoipa::path(
  put,
  path = "/api/v1/memories/update",
  request_body = Vec<UpdateMemoryItem>,
  responses(
    (status = 200, description = "Per-item confirmations; unknown ids come back as NOT_FOUND", body = MemoriesActionResponse),
    (status = 400, description = "Empty replacement document"),
    (status = 503, description = "Embedding provider or store unavailable")
  )
)]
#[axum::debug_handler]
#[tracing::instrument(skip_all, fields(count = items.len()))]
pub async fn update_memories(
  State(state): State<AppState>,
  Json(items): Json<Vec<UpdateMemoryItem>>,
) -> Result<Json<MemoriesActionResponse>, ApiError> {
  let items: Vec<MemoryUpdateItem> = items
    .into_iter()
    .map(|item| MemoryUpdateItem {
      id: item.id,
      document: item.document,
    })
    .collect();

  let (info, partial_failure) = state.service.update(items).await?;

  let message = if partial_failure {
    "Partially updated memories. One or more updates failed.".to_owned()
  } else {
    format!("Successfully updated {} memories.", info.len())
  };
  Ok(Json(MemoriesActionResponse { message, info }))
}
