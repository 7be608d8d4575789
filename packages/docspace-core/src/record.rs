use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::hash;
use crate::ids::DocId;

/// One row of the append-only change ledger: the position of an accepted
/// change on its branch plus the causal metadata needed to replay it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub doc_id: DocId,
    pub branch_id: String,
    pub seq_no: u64,
    /// Hash of the change itself (its identity in the change DAG).
    pub change_hash: String,
    /// CAS digest of the raw change bytes.
    pub bytes_hash: String,
    pub deps: Vec<String>,
    /// Logical ordering value carried by the change (lamport-like).
    pub lamport: u64,
    pub actor_id: String,
    pub actor_seq: u64,
    pub tx_id: u64,
    pub committed_at: i64,
}

/// Index record for a full materialization stored in the CAS.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub doc_id: DocId,
    pub branch_id: String,
    pub seq_no: u64,
    pub tx_id: u64,
    pub digest: String,
}

/// Cached decoded view of a branch tip. Valid only while `seq_no` matches
/// the branch's current `seq_no`; every accepted write overwrites it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonCacheEntry {
    pub doc_id: DocId,
    pub branch_id: String,
    pub seq_no: u64,
    pub json: String,
}

/// One committed transaction in the hash-chained audit log. The serialized
/// response is kept so a replayed `client_tx_id` can return the original
/// outcome without re-running the pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecord {
    pub tx_id: u64,
    pub prev_tx_hash: String,
    pub body_hash: String,
    pub tx_hash: String,
    /// Envelope signatures, verified upstream of the store. Carried for the
    /// audit chain shape; empty when the transport supplies none.
    #[serde(default)]
    pub signatures: Vec<String>,
    pub client_tx_id: Option<String>,
    pub committed_at: i64,
    pub response: String,
}

impl TxRecord {
    /// Build and hash-chain a record over a canonical transaction body.
    pub fn seal(
        tx_id: u64,
        prev_tx_hash: &str,
        body: &Value,
        client_tx_id: Option<String>,
        committed_at: i64,
        response: String,
    ) -> Result<Self> {
        let body_hash = hash::digest_json(body)?;
        let tx_hash = chain_hash(prev_tx_hash, &body_hash);
        Ok(Self {
            tx_id,
            prev_tx_hash: prev_tx_hash.to_string(),
            body_hash,
            tx_hash,
            signatures: Vec::new(),
            client_tx_id,
            committed_at,
            response,
        })
    }

    /// Recompute the chained hash and compare it with the stored one.
    pub fn verify_chain_link(&self, prev_tx_hash: &str) -> Result<()> {
        if self.prev_tx_hash != prev_tx_hash {
            return Err(Error::Integrity(format!(
                "tx {} links to {} but log has {}",
                self.tx_id, self.prev_tx_hash, prev_tx_hash
            )));
        }
        let expected = chain_hash(&self.prev_tx_hash, &self.body_hash);
        if self.tx_hash != expected {
            return Err(Error::Integrity(format!("tx {} hash mismatch", self.tx_id)));
        }
        Ok(())
    }
}

fn chain_hash(prev_tx_hash: &str, body_hash: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(prev_tx_hash.as_bytes());
    hasher.update(&[0]);
    hasher.update(body_hash.as_bytes());
    hasher.finalize().to_hex().to_string()
}
