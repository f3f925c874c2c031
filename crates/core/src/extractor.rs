use engram_ai::{Llm, ResponseSchema};
use engram_shared::{MemoryError, span_kind};
use schemars::JsonSchema;
use serde::Deserialize;

use crate::ConversationMessage;
use crate::prompts::FACT_EXTRACTION_PROMPT;

/// Response shape for the extraction call.
#[derive(Debug, Deserialize, JsonSchema)]
struct Facts {
  /// The facts about the user from the conversation
  facts: Vec<String>,
}

/// Flatten ordered conversation messages into a transcript of the form
/// `User: …\nAssistant: …`. Deterministic: ordering is preserved,
/// roles other than user/model are dropped, only text parts are
/// consumed and their text is trimmed.
#[must_use]
pub fn flatten_transcript(messages: &[ConversationMessage]) -> String {
  let mut lines = Vec::new();
  for message in messages {
    for part in &message.parts {
      let Some(text) = part.text.as_deref() else {
        continue;
      };
      let text = text.trim();
      match message.role.as_str() {
        "user" => lines.push(format!("User: {text}")),
        "model" => lines.push(format!("Assistant: {text}")),
        _ => {}
      }
    }
  }
  lines.join("\n")
}

/// Extract a finite list of short declarative facts about the user
/// from a flattened transcript. An empty transcript never reaches the
/// LLM; a malformed response (after the provider's retries) surfaces
/// as an upstream error.
#[tracing::instrument(name = "extract_facts", skip_all, fields(span.kind = span_kind::BACKGROUND))]
pub(crate) async fn extract_facts(
  transcript: &str,
  llm: &Llm,
) -> Result<Vec<String>, MemoryError> {
  if transcript.trim().is_empty() {
    return Ok(vec![]);
  }

  let schema = ResponseSchema::of::<Facts>("facts")?;
  let response = llm
    .generate(
      FACT_EXTRACTION_PROMPT,
      &format!("Now, extract the facts from the following conversation:\n{transcript}"),
      Some(&schema),
    )
    .await?;

  let parsed: Facts = serde_json::from_str(&response)
    .map_err(|err| MemoryError::Api(format!("malformed fact extraction response: {err}")))?;

  tracing::debug!(count = parsed.facts.len(), "extracted facts");
  Ok(parsed.facts)
}

#[cfg(test)]
mod tests {
  use engram_ai::ScriptedLlm;

  use crate::MessagePart;

  use super::*;

  fn text_message(role: &str, text: &str) -> ConversationMessage {
    ConversationMessage {
      role: role.into(),
      parts: vec![MessagePart {
        text: Some(text.into()),
        ..MessagePart::default()
      }],
    }
  }

  #[test]
  fn flattening_preserves_order_and_maps_roles() {
    let messages = vec![
      text_message("user", "  my name is Jane  "),
      text_message("model", "nice to meet you Jane"),
      text_message("user", "I am an AI engineer"),
    ];
    assert_eq!(
      flatten_transcript(&messages),
      "User: my name is Jane\nAssistant: nice to meet you Jane\nUser: I am an AI engineer"
    );
  }

  #[test]
  fn flattening_drops_other_roles_and_non_text_parts() {
    let messages = vec![
      text_message("system", "you are helpful"),
      ConversationMessage {
        role: "model".into(),
        parts: vec![MessagePart {
          function_call: Some(serde_json::json!({"name": "search"})),
          ..MessagePart::default()
        }],
      },
      text_message("user", "hello"),
    ];
    assert_eq!(flatten_transcript(&messages), "User: hello");
  }

  #[tokio::test]
  async fn empty_transcript_short_circuits_without_llm_call() {
    // No scripted responses: any LLM call would error
    let llm = Llm::Scripted(ScriptedLlm::default());
    let facts = extract_facts("   ", &llm).await.unwrap();
    assert!(facts.is_empty());
  }

  #[tokio::test]
  async fn parses_facts_from_llm_response() {
    let llm = Llm::Scripted(ScriptedLlm::new([
      r#"{"facts": ["My name is Jane", "I am an AI engineer"]}"#,
    ]));
    let facts = extract_facts("User: my name is Jane", &llm).await.unwrap();
    assert_eq!(facts, ["My name is Jane", "I am an AI engineer"]);
  }

  #[tokio::test]
  async fn malformed_response_is_an_api_error() {
    let llm = Llm::Scripted(ScriptedLlm::new(["not json"]));
    let err = extract_facts("User: hi", &llm).await.unwrap_err();
    assert!(matches!(err, MemoryError::Api(_)));
  }
}
