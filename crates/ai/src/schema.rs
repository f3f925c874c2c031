use engram_shared::MemoryError;
use schemars::JsonSchema;
use serde::Serialize;
use serde_json::{Map, Value};

/// A named JSON schema handed to the LLM for constrained generation.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseSchema {
  pub name: String,
  pub description: Option<String>,
  pub schema: Value,
}

impl ResponseSchema {
  /// Derive a strict-mode schema from a Rust type.
  pub fn of<T: JsonSchema>(name: &str) -> Result<Self, MemoryError> {
    let root = schemars::schema_for!(T);
    let mut schema = serde_json::to_value(&root)
      .map_err(|err| MemoryError::Api(format!("failed to serialize response schema: {err}")))?;
    fix_for_strict_mode(&mut schema);
    Ok(Self {
      name: name.to_owned(),
      description: None,
      schema,
    })
  }
}

/// What `simplify` decided about a node.
enum Simplified {
  /// Rewritten into a terminal form; nothing left to descend into.
  Closed,
  /// Replaced by an unwrapped inner schema; needs another pass.
  Unwrapped,
  /// An ordinary schema node: close it and visit its children.
  Plain,
}

/// Collapse the schemars encodings that strict mode rejects outright.
fn simplify(node: &mut Map<String, Value>) -> Simplified {
  // A `$ref` must stand alone, with no sibling keys
  if node.contains_key("$ref") {
    node.retain(|key, _| key == "$ref");
    return Simplified::Closed;
  }

  // Unit-variant enums arrive as a `oneOf` of const strings; strict
  // mode only understands a plain string `enum`
  if let Some(variants) = node.get("oneOf").and_then(Value::as_array) {
    let literals: Option<Vec<Value>> = variants
      .iter()
      .map(|variant| variant.get("const").cloned())
      .collect();
    if let Some(values) = literals {
      *node = Map::from_iter([
        ("type".to_owned(), Value::from("string")),
        ("enum".to_owned(), Value::Array(values)),
      ]);
      return Simplified::Closed;
    }
  }

  // `Option<T>` arrives as `anyOf [T, null]`; strict mode wants bare T
  if let Some(branches) = node.get("anyOf").and_then(Value::as_array) {
    let mut candidates = branches
      .iter()
      .filter(|branch| branch.get("type").and_then(Value::as_str) != Some("null"));
    if let (Some(inner), None) = (candidates.next(), candidates.next()) {
      *node = inner.as_object().cloned().unwrap_or_default();
      return Simplified::Unwrapped;
    }
  }

  Simplified::Plain
}

/// Rewrite a schemars-produced schema, in place, into the dialect
/// OpenAI strict mode accepts: every object is closed
/// (`additionalProperties: false`) with all of its properties listed
/// in `required`, `$ref` nodes stand alone, unit enums collapse to
/// string enums and optional fields unwrap to their inner type.
pub(crate) fn fix_for_strict_mode(schema: &mut Value) {
  // Simplification can expose another reducible form (an unwrapped
  // Option of an enum, say), so run it to a fixed point first
  loop {
    let Some(node) = schema.as_object_mut() else {
      return;
    };
    match simplify(node) {
      Simplified::Closed => return,
      Simplified::Unwrapped => {}
      Simplified::Plain => break,
    }
  }

  let Some(node) = schema.as_object_mut() else {
    return;
  };

  let property_keys = match node.get_mut("properties").and_then(Value::as_object_mut) {
    Some(properties) => {
      let keys: Vec<Value> = properties.keys().cloned().map(Value::String).collect();
      properties.values_mut().for_each(fix_for_strict_mode);
      Some(keys)
    }
    None => None,
  };
  if let Some(keys) = property_keys {
    node.insert("required".to_owned(), Value::Array(keys));
    node.insert("additionalProperties".to_owned(), Value::Bool(false));
  }

  if let Some(items) = node.get_mut("items") {
    fix_for_strict_mode(items);
  }

  // schemars 0.x used "definitions", 1.x uses "$defs"
  for bucket in ["definitions", "$defs"] {
    if let Some(definitions) = node.get_mut(bucket).and_then(Value::as_object_mut) {
      definitions.values_mut().for_each(fix_for_strict_mode);
    }
  }
}
