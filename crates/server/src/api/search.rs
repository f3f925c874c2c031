use axum::{
  Json,
  extract::{Query, State},
};
use engram_core::MemoryFilter;
use engram_shared::MemoryError;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{ApiError, api::GetMemoriesResponse, utils::AppState};

const MAX_LIMIT: usize = 50;

const fn default_limit() -> usize {
  MAX_LIMIT
}

fn validated_limit(limit: usize) -> Result<usize, MemoryError> {
  if (1..=MAX_LIMIT).contains(&limit) {
    Ok(limit)
  } else {
    Err(MemoryError::InvalidRequest(format!(
      "limit must be between 1 and {MAX_LIMIT}"
    )))
  }
}

fn build_filter(
  user_id: Option<String>,
  session_id: Option<String>,
  app_id: Option<String>,
) -> MemoryFilter {
  MemoryFilter {
    user_id,
    session_id,
    app_id,
    agent_name: None,
  }
}

/// Filter and paging parameters for the metadata query endpoint.
#[derive(Debug, Deserialize, IntoParams)]
pub struct MemoryQueryParams {
  pub user_id: Option<String>,
  pub session_id: Option<String>,
  pub app_id: Option<String>,
  /// Maximum memories to return (1-50)
  #[serde(default = "default_limit")]
  pub limit: usize,
}

/// Get memories by metadata filters only
#[utoipa::path(
  get,
  path = "/api/v1/memories",
  params(MemoryQueryParams),
  responses(
    (status = 200, description = "Memories matching every given filter", body = GetMemoriesResponse),
    (status = 400, description = "Limit out of range")
  )
)]
#[axum::debug_handler]
pub async fn get_memories(
  State(state): State<AppState>,
  Query(params): Query<MemoryQueryParams>,
) -> Result<Json<GetMemoriesResponse>, ApiError> {
  let limit = validated_limit(params.limit)?;
  let filter = build_filter(params.user_id, params.session_id, params.app_id);
  let memories = state.service.search_by_metadata(&filter, limit).await?;
  Ok(Json(GetMemoriesResponse { memories }))
}

/// Parameters for the similarity endpoint: the metadata filters plus a
/// required query text.
#[derive(Debug, Deserialize, IntoParams)]
pub struct SimilarQueryParams {
  /// Search query text
  pub query: String,
  pub user_id: Option<String>,
  pub session_id: Option<String>,
  pub app_id: Option<String>,
  /// Maximum memories to return (1-50)
  #[serde(default = "default_limit")]
  pub limit: usize,
}

/// Get memories semantically similar to a query, with optional filters
#[utoipa::path(
  get,
  path = "/api/v1/memories/similar",
  params(SimilarQueryParams),
  responses(
    (status = 200, description = "Memories ranked by similarity", body = GetMemoriesResponse),
    (status = 400, description = "Missing query or limit out of range"),
    (status = 503, description = "Embedding provider unavailable")
  )
)]
#[axum::debug_handler]
pub async fn get_similar_memories(
  State(state): State<AppState>,
  Query(params): Query<SimilarQueryParams>,
) -> Result<Json<GetMemoriesResponse>, ApiError> {
  let limit = validated_limit(params.limit)?;
  if params.query.trim().is_empty() {
    return Err(MemoryError::InvalidRequest("query must be non-empty".into()).into());
  }

  let filter = build_filter(params.user_id, params.session_id, params.app_id);
  let memories = state
    .service
    .search_similar(&[params.query], &filter, limit)
    .await?;
  Ok(Json(GetMemoriesResponse { memories }))
}
