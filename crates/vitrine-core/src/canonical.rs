//! Canonical documents and content hashing.
//!
//! Structured product content (specs tables, FAQ lists) arrives as loosely
//! typed JSON. [`CanonicalDocument`] wraps it and defines the single total
//! order every consumer uses:
//!
//! - object keys in ascending byte order
//! - array items in stored order
//! - numbers as `serde_json` prints them, strings JSON-escaped
//!
//! Hashing and embedding-text flattening are pure functions of that order, so
//! freshness checks stay stable across restarts and implementations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::ContentHash;

/// Bumped whenever the hash input layout changes. Changing it marks every
/// stored snapshot as changed.
pub const HASH_LAYOUT_VERSION: u32 = 1;

/// Opaque structured document with a canonical serialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalDocument(Value);

impl CanonicalDocument {
    /// Wrap a JSON value.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// The empty document.
    pub fn empty() -> Self {
        Self(Value::Null)
    }

    /// The wrapped value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// True for `null`, `{}` and `[]`.
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Canonical JSON text of the document.
    pub fn to_canonical_string(&self) -> String {
        let mut out = String::new();
        write_canonical(&self.0, &mut out);
        out
    }

    /// Flatten into `path: value` lines in canonical order.
    ///
    /// Nested keys join with `.`, array items get an `[i]` suffix, and an
    /// array made only of scalars collapses into one line joined by `", "`.
    /// Nulls and blank strings produce no line.
    pub fn flatten_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        flatten(&self.0, "", &mut lines);
        lines
    }
}

impl From<Value> for CanonicalDocument {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_json_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (idx, key) in keys.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_json_string(key, out);
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
    }
}

fn write_json_string(s: &str, out: &mut String) {
    // Serializing a &str cannot fail; fall back to Debug quoting just in case.
    match serde_json::to_string(s) {
        Ok(quoted) => out.push_str(&quoted),
        Err(_) => out.push_str(&format!("{s:?}")),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn push_line(path: &str, text: String, lines: &mut Vec<String>) {
    if path.is_empty() {
        lines.push(text);
    } else {
        lines.push(format!("{path}: {text}"));
    }
}

fn flatten(value: &Value, path: &str, lines: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                flatten(&map[key], &child, lines);
            }
        }
        Value::Array(items) => {
            let all_scalar = items
                .iter()
                .all(|v| matches!(v, Value::String(_) | Value::Bool(_) | Value::Number(_)));
            if all_scalar {
                let parts: Vec<String> = items.iter().filter_map(scalar_text).collect();
                if !parts.is_empty() {
                    push_line(path, parts.join(", "), lines);
                }
            } else {
                for (idx, item) in items.iter().enumerate() {
                    flatten(item, &format!("{path}[{idx}]"), lines);
                }
            }
        }
        scalar => {
            if let Some(text) = scalar_text(scalar) {
                push_line(path, text, lines);
            }
        }
    }
}

/// Hash the content fields of a snapshot.
///
/// The input is the canonical JSON of
/// `{"description","faq","layout","specs","title"}`, so field order and
/// object key order never influence the digest.
pub fn content_hash(
    title: &str,
    description: &str,
    specs: &CanonicalDocument,
    faq: &CanonicalDocument,
) -> ContentHash {
    let mut input = String::new();
    input.push_str("{\"description\":");
    write_json_string(description, &mut input);
    input.push_str(",\"faq\":");
    write_canonical(faq.as_value(), &mut input);
    input.push_str(",\"layout\":");
    input.push_str(&HASH_LAYOUT_VERSION.to_string());
    input.push_str(",\"specs\":");
    write_canonical(specs.as_value(), &mut input);
    input.push_str(",\"title\":");
    write_json_string(title, &mut input);
    input.push('}');

    ContentHash::from_hex(blake3::hash(input.as_bytes()).to_hex().to_string())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_string_sorts_keys() {
        let doc = CanonicalDocument::new(json!({"b": 1, "a": {"z": true, "y": null}}));
        assert_eq!(
            doc.to_canonical_string(),
            r#"{"a":{"y":null,"z":true},"b":1}"#
        );
    }

    #[test]
    fn test_canonical_string_keeps_array_order() {
        let doc = CanonicalDocument::new(json!(["b", "a"]));
        assert_eq!(doc.to_canonical_string(), r#"["b","a"]"#);
    }

    #[test]
    fn test_is_empty() {
        assert!(CanonicalDocument::empty().is_empty());
        assert!(CanonicalDocument::new(json!({})).is_empty());
        assert!(CanonicalDocument::new(json!([])).is_empty());
        assert!(!CanonicalDocument::new(json!({"a": 1})).is_empty());
    }

    #[test]
    fn test_flatten_nested_object() {
        let doc = CanonicalDocument::new(json!({
            "size": {"width": 10, "height": 20},
            "material": "cotton"
        }));
        assert_eq!(
            doc.flatten_lines(),
            vec!["material: cotton", "size.height: 20", "size.width: 10"]
        );
    }

    #[test]
    fn test_flatten_scalar_array_joins() {
        let doc = CanonicalDocument::new(json!({"sizes": ["S", "M", " ", "L"]}));
        assert_eq!(doc.flatten_lines(), vec!["sizes: S, M, L"]);
    }

    #[test]
    fn test_flatten_object_array_indexes() {
        let doc = CanonicalDocument::new(json!([
            {"question": "Washable?", "answer": "Yes"},
            {"question": "Vegan?", "answer": null}
        ]));
        assert_eq!(
            doc.flatten_lines(),
            vec!["[0].answer: Yes", "[0].question: Washable?", "[1].question: Vegan?"]
        );
    }

    #[test]
    fn test_flatten_top_level_scalar() {
        let doc = CanonicalDocument::new(json!("  plain  "));
        assert_eq!(doc.flatten_lines(), vec!["plain"]);
    }

    #[test]
    fn test_content_hash_ignores_key_order() {
        let a: Value = serde_json::from_str(r#"{"x":1,"y":2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"y":2,"x":1}"#).unwrap();
        let empty = CanonicalDocument::empty();
        assert_eq!(
            content_hash("T", "D", &a.into(), &empty),
            content_hash("T", "D", &b.into(), &empty)
        );
    }

    #[test]
    fn test_content_hash_detects_field_changes() {
        let empty = CanonicalDocument::empty();
        let base = content_hash("T", "D", &empty, &empty);
        assert_ne!(base, content_hash("T2", "D", &empty, &empty));
        assert_ne!(base, content_hash("T", "D2", &empty, &empty));
        assert_ne!(
            base,
            content_hash("T", "D", &CanonicalDocument::new(json!({"a": 1})), &empty)
        );
        assert_ne!(
            base,
            content_hash("T", "D", &empty, &CanonicalDocument::new(json!(["q"])))
        );
    }

    #[test]
    fn test_content_hash_field_boundaries() {
        // Moving text between fields must change the digest.
        let empty = CanonicalDocument::empty();
        assert_ne!(
            content_hash("ab", "c", &empty, &empty),
            content_hash("a", "bc", &empty, &empty)
        );
    }

    #[test]
    fn test_content_hash_is_hex_blake3() {
        let empty = CanonicalDocument::empty();
        let hash = content_hash("T", "D", &empty, &empty);
        assert_eq!(hash.as_str().len(), 64);
        assert!(hash.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
