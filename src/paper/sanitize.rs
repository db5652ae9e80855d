//! Metadata sanitization for the vector index boundary (spec.md §4.4, §8, §9).
//!
//! Pinecone-compatible metadata allows only strings, numbers, booleans, and lists of
//! non-null strings. Nulls are omitted, empty lists are omitted, and nested maps are
//! stringified. This is the single normalizer spec.md §9 asks for — callers should
//! never duplicate these rules elsewhere.

use crate::paper::types::{Metadata, MetadataValue};

/// Sanitize a metadata map so every value satisfies the index's compatibility rules.
/// Idempotent: running it twice on its own output yields the same map (spec.md §8).
pub fn sanitize_metadata(input: &Metadata) -> Metadata {
    let mut out = Metadata::new();
    for (key, value) in input {
        match value {
            MetadataValue::Str(s) => {
                out.insert(key.clone(), MetadataValue::Str(s.clone()));
            }
            MetadataValue::Int(_) | MetadataValue::Float(_) | MetadataValue::Bool(_) => {
                out.insert(key.clone(), value.clone());
            }
            MetadataValue::List(items) => {
                let cleaned: Vec<String> = items.iter().filter(|s| !s.is_empty()).cloned().collect();
                if !cleaned.is_empty() {
                    out.insert(key.clone(), MetadataValue::List(cleaned));
                }
            }
        }
    }
    out
}

/// Stringify an arbitrary JSON value for embedding as a single metadata string,
/// used when a source field is a nested map that has no native representation in
/// [`MetadataValue`] (spec.md §4.4: "nested dicts stringified").
pub fn stringify_nested(value: &serde_json::Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}
