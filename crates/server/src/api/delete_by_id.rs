use axum::{Json, extract::State};

use crate::{ApiError, api::MemoriesActionResponse, utils::AppState};

/// Delete memories by id
#[utoipa::path(
  delete,
  path = "/api/v1/memories/delete_by_id",
  request_body = Vec<String>,
  responses(
    (status = 200, description = "Per-item confirmations; unknown ids come back as NOT_FOUND", body = MemoriesActionResponse),
    (status = 503, description = "Store unavailable")
  )
)]
#[axum::debug_handler]
#[tracing::instrument(skip_all, fields(count = ids.len()))]
pub async fn delete_memories_by_id(
  State(state): State<AppState>,
  Json(ids): Json<Vec<String>>,
) -> Result<Json<MemoriesActionResponse>, ApiError> {
  let (info, partial_failure) = state.service.delete(ids).await?;

  let message = if partial_failure {
    "Partially deleted memories. One or more deletes failed.".to_owned()
  } else {
    format!("Successfully deleted {} memories.", info.len())
  };
  Ok(Json(MemoriesActionResponse { message, info }))
}
