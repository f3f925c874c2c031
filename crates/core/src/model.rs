use chrono::{DateTime, Utc};
use engram_shared::MemoryMetadata;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One part of a conversation message. Only text parts feed the
/// extractor; tool traffic is carried but ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct MessagePart {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub text: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub function_call: Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub function_response: Option<serde_json::Value>,
}

/// A conversation turn as sent by chat agents: a role (`user` or
/// `model`; anything else is dropped during flattening) and its parts.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConversationMessage {
  pub role: String,
  #[serde(default)]
  pub parts: Vec<MessagePart>,
}

/// Outcome of a write against a single memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
  Created,
  Updated,
  Deleted,
  NotFound,
}

/// Per-item outcome record returned from every write endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActionConfirmation {
  pub id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub document: Option<String>,
  pub status: ActionStatus,
}

impl ActionConfirmation {
  #[must_use]
  pub fn new(id: impl Into<String>, document: Option<String>, status: ActionStatus) -> Self {
    Self {
      id: id.into(),
      document,
      status,
    }
  }
}

/// A single memory as returned to clients. `similarity` is only set on
/// semantic search results.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MemoryResponse {
  pub id: String,
  pub document: String,
  pub metadata: MemoryMetadata,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub similarity: Option<f32>,
}
