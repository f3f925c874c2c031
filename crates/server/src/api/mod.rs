use axum::{
  Json, Router,
  routing::{delete, get, post, put},
};
use engram_core::{ActionConfirmation, MemoryResponse};
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};
use utoipa_scalar::{Scalar, Servable};

use crate::utils::AppState;

mod create;
mod delete_by_id;
mod generate;
mod get_by_ids;
mod search;
mod update;

pub use create::CreateMemoriesRequest;
pub use generate::GenerateMemoriesRequest;
pub use search::MemoryQueryParams;
pub use update::UpdateMemoryItem;

/// Response for every write endpoint: a human-readable summary plus
/// per-item confirmations (including NOT_FOUND entries on partial
/// success).
#[derive(Debug, Serialize, ToSchema)]
pub struct MemoriesActionResponse {
  pub message: String,
  pub info: Vec<ActionConfirmation>,
}

/// Response for every query endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct GetMemoriesResponse {
  pub memories: Vec<MemoryResponse>,
}

#[derive(OpenApi)]
#[openapi(
  info(
    title = "Engram Memory API",
    version = "0.1.0",
    description = "Self-hosted long-term memory service for conversational agents"
  ),
  paths(
    generate::generate_memories,
    create::create_memories,
    search::get_memories,
    search::get_similar_memories,
    get_by_ids::get_memories_by_ids,
    update::update_memories,
    delete_by_id::delete_memories_by_id,
  ),
  components(schemas(
    GenerateMemoriesRequest,
    CreateMemoriesRequest,
    UpdateMemoryItem,
    MemoriesActionResponse,
    GetMemoriesResponse,
    engram_core::ActionConfirmation,
    engram_core::ActionStatus,
    engram_core::ConversationMessage,
    engram_core::MessagePart,
    engram_core::MemoryResponse,
    engram_shared::MemoryMetadata,
  ))
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
  Json(ApiDoc::openapi())
}

pub fn router() -> Router<AppState> {
  Router::new()
    .route("/api/v1/memories/generate", post(generate::generate_memories))
    .route("/api/v1/memories/create", post(create::create_memories))
    .route("/api/v1/memories", get(search::get_memories))
    .route("/api/v1/memories/similar", get(search::get_similar_memories))
    .route("/api/v1/memories/get_by_ids", post(get_by_ids::get_memories_by_ids))
    .route("/api/v1/memories/update", put(update::update_memories))
    .route(
      "/api/v1/memories/delete_by_id",
      delete(delete_by_id::delete_memories_by_id),
    )
    .route("/openapi.json", get(openapi_json))
    .merge(Scalar::with_url("/openapi/", ApiDoc::openapi()))
}
