use axum::{Json, extract::State};

use crate::{ApiError, api::GetMemoriesResponse, utils::AppState};

/// Get multiple memories by a list of ids; unknown ids are omitted
#[utoipa::path(
  post,
  path = "/api/v1/memories/get_by_ids",
  request_body = Vec<String>,
  responses(
    (status = 200, description = "The memories that were found", body = GetMemoriesResponse),
    (status = 503, description = "Store unavailable")
  )
)]
#[axum::debug_handler]
#[tracing::instrument(skip_all, fields(count = ids.len()))]
pub async fn get_memories_by_ids(
  State(state): State<AppState>,
  Json(ids): Json<Vec<String>>,
) -> Result<Json<GetMemoriesResponse>, ApiError> {
  let memories = state.service.get_by_ids(&ids).await?;
  Ok(Json(GetMemoriesResponse { memories }))
}
