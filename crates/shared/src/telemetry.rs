use serde::Serialize;

/// Span kind values recorded on every instrumented operation, mirroring
/// the OpenInference span kinds an exporter layer would expect.
pub mod span_kind {
  pub const CHAIN: &str = "CHAIN";
  pub const DB: &str = "DB";
  pub const LLM: &str = "LLM";
  pub const EMBEDDING: &str = "EMBEDDING";
  pub const BACKGROUND: &str = "BACKGROUND";
}

/// Cap applied to serialized span attribute values.
const MAX_ATTRIBUTE_LEN: usize = 4000;

/// Serialize a value for span attributes, defensively: non-serializable
/// values become a placeholder and long payloads are truncated at a char
/// boundary.
pub fn safe_serialize<T: Serialize>(value: &T) -> String {
  let serialized =
    serde_json::to_string(value).unwrap_or_else(|_| "<not serializable>".to_owned());
  truncate_chars(serialized, MAX_ATTRIBUTE_LEN)
}

fn truncate_chars(mut s: String, max_chars: usize) -> String {
  match s.char_indices().nth(max_chars) {
    Some((byte_idx, _)) => {
      s.truncate(byte_idx);
      s
    }
    None => s,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn serializes_plain_values() {
    assert_eq!(safe_serialize(&vec!["a", "b"]), r#"["a","b"]"#);
  }

  #[test]
  fn caps_long_values() {
    let long = "x".repeat(MAX_ATTRIBUTE_LEN * 2);
    let out = safe_serialize(&long);
    assert_eq!(out.chars().count(), MAX_ATTRIBUTE_LEN);
  }

  #[test]
  fn truncation_respects_char_boundaries() {
    let s: String = "é".repeat(10);
    assert_eq!(truncate_chars(s, 4).chars().count(), 4);
  }
}
