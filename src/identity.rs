//! Content hashing, stable identifiers, and canonical serialization.
//!
//! Every identifier in the store derives from content: a chunk's document
//! id is the SHA-256 of `{source_id}::{chunk_id}::{content_hash}`, so
//! re-ingesting identical content lands on the same primary key and an
//! upsert overwrites the row it already wrote. Fingerprint timestamps
//! live here too because the skip decision compares hash and mtime as a
//! pair.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::IngestError;

const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Hex SHA-256 of a text.
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Stable primary identity for an embedded chunk. Changing the source,
/// the position, or the content changes the id.
pub fn stable_id(source_id: &str, chunk_id: &str, content_hash: &str) -> String {
    hash_text(&format!("{source_id}::{chunk_id}::{content_hash}"))
}

/// Position identity of a chunk within its source. Zero-padded so chunk
/// ids sort lexicographically in emission order.
pub fn chunk_id(source_id: &str, index: usize) -> String {
    format!("{source_id}::chunk_{index:04}")
}

/// Canonical JSON serialization: object keys sorted recursively, 2-space
/// pretty indentation. Semantically identical documents serialize to
/// byte-identical text regardless of key order in the input, which keeps
/// content hashes stable across formatting-only edits.
pub fn stable_json_text(value: &Value) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&sort_keys(value))
}

// Sorting is explicit rather than relying on serde_json's map ordering,
// which flips to insertion order if any dependency enables
// `preserve_order`.
fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, sort_keys(v))).collect();
            Value::Object(
                sorted
                    .into_iter()
                    .map(|(k, v)| (k.clone(), v))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Current UTC time as `%Y-%m-%dT%H:%M:%SZ`.
pub fn now_iso() -> String {
    Utc::now().format(ISO_FORMAT).to_string()
}

/// File modification time, formatted like [`now_iso`].
pub fn mtime_iso(path: &Path) -> Result<String, IngestError> {
    let metadata = std::fs::metadata(path).map_err(|e| IngestError::io(path, e))?;
    let modified = metadata.modified().map_err(|e| IngestError::io(path, e))?;
    let timestamp: DateTime<Utc> = modified.into();
    Ok(timestamp.format(ISO_FORMAT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_text_known_vectors() {
        assert_eq!(
            hash_text(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            hash_text("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_stable_id_deterministic() {
        let a = stable_id("notes.md", "notes.md::chunk_0000", "hash");
        let b = stable_id("notes.md", "notes.md::chunk_0000", "hash");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_stable_id_changes_with_any_component() {
        let base = stable_id("a", "a::chunk_0000", "h1");
        assert_ne!(base, stable_id("b", "a::chunk_0000", "h1"));
        assert_ne!(base, stable_id("a", "a::chunk_0001", "h1"));
        assert_ne!(base, stable_id("a", "a::chunk_0000", "h2"));
    }

    #[test]
    fn test_chunk_id_zero_padded() {
        assert_eq!(chunk_id("notes.md", 0), "notes.md::chunk_0000");
        assert_eq!(chunk_id("notes.md", 37), "notes.md::chunk_0037");
        assert_eq!(chunk_id("notes.md", 12345), "notes.md::chunk_12345");
    }

    #[test]
    fn test_stable_json_key_order_invariant() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": {"d": 2, "c": [3, {"z": 1, "y": 2}]}}"#)
            .expect("valid json");
        let b: Value = serde_json::from_str(r#"{"a": {"c": [3, {"y": 2, "z": 1}], "d": 2}, "b": 1}"#)
            .expect("valid json");
        assert_eq!(
            stable_json_text(&a).expect("serializes"),
            stable_json_text(&b).expect("serializes")
        );
    }

    #[test]
    fn test_stable_json_sorted_and_indented() {
        let v = json!({"b": 1, "a": 2});
        let text = stable_json_text(&v).expect("serializes");
        assert_eq!(text, "{\n  \"a\": 2,\n  \"b\": 1\n}");
    }

    #[test]
    fn test_now_iso_shape() {
        let ts = now_iso();
        assert_eq!(ts.len(), 20);
        assert!(ts.ends_with('Z'));
        assert_eq!(&ts[10..11], "T");
    }

    #[test]
    fn test_mtime_iso_shape() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "x").expect("write");
        let ts = mtime_iso(&path).expect("mtime");
        assert_eq!(ts.len(), 20);
        assert!(ts.ends_with('Z'));
    }

    #[test]
    fn test_mtime_iso_missing_file() {
        assert!(mtime_iso(Path::new("/no/such/file.txt")).is_err());
    }
}
