use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::hash;

/// What a content-addressed blob holds. The store never inspects the bytes;
/// the kind tag is metadata for callers and for retention tooling.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CasKind {
    Change,
    Snapshot,
    Blob,
}

impl CasKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CasKind::Change => "change",
            CasKind::Snapshot => "snapshot",
            CasKind::Blob => "blob",
        }
    }

    pub fn parse(s: &str) -> Result<Self, Error> {
        match s {
            "change" => Ok(CasKind::Change),
            "snapshot" => Ok(CasKind::Snapshot),
            "blob" => Ok(CasKind::Blob),
            other => Err(Error::Storage(format!("unknown cas kind: {other:?}"))),
        }
    }
}

/// An immutable content-addressed entry. The digest is the blake3 hash of
/// the bytes, so re-inserting identical bytes is a no-op at the store layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CasEntry {
    pub kind: CasKind,
    pub digest: String,
    pub bytes: Vec<u8>,
    pub meta: Option<Value>,
}

impl CasEntry {
    pub fn new(kind: CasKind, bytes: Vec<u8>, meta: Option<Value>) -> Self {
        let digest = hash::digest_bytes(&bytes);
        Self {
            kind,
            digest,
            bytes,
            meta,
        }
    }
}
