use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::MemoryError;

/// Metadata attached to every memory. The four required fields are the
/// only filterable ones; `event_timestamp` defaults to the server clock
/// at ingestion. Metadata is immutable once a memory is created.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MemoryMetadata {
  pub user_id: String,
  pub app_id: String,
  pub session_id: String,
  pub agent_name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub event_timestamp: Option<DateTime<Utc>>,
}

impl MemoryMetadata {
  /// All four filterable fields must be non-empty.
  pub fn validate(&self) -> Result<(), MemoryError> {
    for (field, value) in [
      ("user_id", &self.user_id),
      ("app_id", &self.app_id),
      ("session_id", &self.session_id),
      ("agent_name", &self.agent_name),
    ] {
      if value.trim().is_empty() {
        return Err(MemoryError::InvalidRequest(format!(
          "metadata field `{field}` must be a non-empty string"
        )));
      }
    }
    Ok(())
  }

  /// Exact-match filter pinning all four filterable fields.
  #[must_use]
  pub fn filter(&self) -> MemoryFilter {
    MemoryFilter {
      user_id: Some(self.user_id.clone()),
      app_id: Some(self.app_id.clone()),
      session_id: Some(self.session_id.clone()),
      agent_name: Some(self.agent_name.clone()),
    }
  }
}

/// Equality filter over the filterable metadata fields, AND-combined.
/// An empty filter means "no constraint".
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct MemoryFilter {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub app_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub session_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub agent_name: Option<String>,
}

impl MemoryFilter {
  #[must_use]
  pub const fn is_empty(&self) -> bool {
    self.user_id.is_none()
      && self.app_id.is_none()
      && self.session_id.is_none()
      && self.agent_name.is_none()
  }

  /// Set (column, value) pairs, in a stable order for SQL building.
  #[must_use]
  pub fn entries(&self) -> Vec<(&'static str, &str)> {
    let mut entries = Vec::new();
    if let Some(v) = self.user_id.as_deref() {
      entries.push(("user_id", v));
    }
    if let Some(v) = self.app_id.as_deref() {
      entries.push(("app_id", v));
    }
    if let Some(v) = self.session_id.as_deref() {
      entries.push(("session_id", v));
    }
    if let Some(v) = self.agent_name.as_deref() {
      entries.push(("agent_name", v));
    }
    entries
  }

  /// Whether the given metadata satisfies every set field by equality.
  #[must_use]
  pub fn matches(&self, metadata: &MemoryMetadata) -> bool {
    self.user_id.as_deref().is_none_or(|v| v == metadata.user_id)
      && self.app_id.as_deref().is_none_or(|v| v == metadata.app_id)
      && self
        .session_id
        .as_deref()
        .is_none_or(|v| v == metadata.session_id)
      && self
        .agent_name
        .as_deref()
        .is_none_or(|v| v == metadata.agent_name)
  }
}

/// A persisted memory as the store sees it: identity, document text,
/// embedding of the configured dimension, metadata and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
  pub id: String,
  pub document: String,
  pub embedding: Vec<f32>,
  pub metadata: MemoryMetadata,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn metadata() -> MemoryMetadata {
    MemoryMetadata {
      user_id: "u1".into(),
      app_id: "a1".into(),
      session_id: "s1".into(),
      agent_name: "root".into(),
      event_timestamp: None,
    }
  }

  #[test]
  fn validate_rejects_empty_required_field() {
    let mut meta = metadata();
    assert!(meta.validate().is_ok());
    meta.agent_name = "  ".into();
    assert!(matches!(
      meta.validate(),
      Err(MemoryError::InvalidRequest(_))
    ));
  }

  #[test]
  fn filter_matches_by_equality_only() {
    let meta = metadata();
    let filter = MemoryFilter {
      user_id: Some("u1".into()),
      ..MemoryFilter::default()
    };
    assert!(filter.matches(&meta));

    let other = MemoryFilter {
      user_id: Some("u1".into()),
      session_id: Some("s2".into()),
      ..MemoryFilter::default()
    };
    assert!(!other.matches(&meta));
  }

  #[test]
  fn empty_filter_matches_everything() {
    assert!(MemoryFilter::default().is_empty());
    assert!(MemoryFilter::default().matches(&metadata()));
  }

  #[test]
  fn entries_preserve_column_order() {
    let filter = metadata().filter();
    let columns: Vec<&str> = filter.entries().iter().map(|(c, _)| *c).collect();
    assert_eq!(columns, ["user_id", "app_id", "session_id", "agent_name"]);
  }
}
