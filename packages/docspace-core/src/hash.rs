//! Content hashing over canonical JSON.
//!
//! All digests in the store (CAS entries, branch `root_hash`, the
//! transaction hash chain) are hex-encoded blake3. JSON-valued inputs are
//! first rendered to a canonical byte form: object keys sorted by UTF-8 byte
//! order recursively, no insignificant whitespace.

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Hex blake3 digest of raw bytes.
pub fn digest_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Canonical byte rendering of a JSON value.
pub fn canonical_json_bytes(value: &Value) -> Result<Vec<u8>> {
    let canon = canonicalize(value);
    serde_json::to_vec(&canon).map_err(|e| Error::Codec(e.to_string()))
}

/// Hex blake3 digest of a JSON value's canonical bytes.
pub fn digest_json(value: &Value) -> Result<String> {
    Ok(digest_bytes(&canonical_json_bytes(value)?))
}

/// Integrity digest over a branch's sorted head set, shaped as
/// `{"heads": [...]}`.
pub fn root_hash(sorted_heads: &[String]) -> Result<String> {
    let mut map = Map::new();
    map.insert(
        "heads".to_string(),
        Value::Array(sorted_heads.iter().map(|h| Value::String(h.clone())).collect()),
    );
    digest_json(&Value::Object(map))
}

/// Stable branch id digest over `(doc, branch name)`.
pub fn branch_digest(doc: &str, branch: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(doc.as_bytes());
    hasher.update(&[0]);
    hasher.update(branch.as_bytes());
    hasher.finalize().to_hex().to_string()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
