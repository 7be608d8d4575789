//! Logical submit-transaction contract: the request a caller hands the
//! pipeline and the per-write results it gets back. Transport-agnostic; the
//! wire layer above the store owns envelopes and authorization.

use serde::{Deserialize, Serialize};

use crate::ids::BranchRef;

/// Optimistic-concurrency assertion: the submission is only valid while the
/// named branch still has exactly these heads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadCheck {
    #[serde(rename = "ref")]
    pub target: BranchRef,
    pub heads: Vec<String>,
}

/// Lineage hint recorded when a write represents a merge of another branch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSource {
    pub branch: String,
    pub heads: Vec<String>,
}

/// One write against one branch: raw change payloads causally rooted at
/// `base_heads`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOp {
    #[serde(rename = "ref")]
    pub target: BranchRef,
    #[serde(rename = "baseHeads")]
    pub base_heads: Vec<String>,
    pub changes: Vec<ChangePayload>,
    /// When the causal base is stale, let the space synthesize a merge
    /// change instead of reporting a conflict (subject to space settings).
    #[serde(rename = "allowServerMerge", default)]
    pub allow_server_merge: bool,
    #[serde(rename = "mergeOf", default)]
    pub merge_of: Vec<MergeSource>,
}

/// Raw CRDT change bytes. The pipeline decodes the header; the store never
/// interprets the payload beyond that.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePayload {
    pub bytes: Vec<u8>,
}

/// A batch of reads (validated) and writes (applied) spanning any number of
/// documents and branches, committed atomically.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRequest {
    /// Caller-chosen idempotency key. Resubmitting a committed id returns
    /// the recorded response, marked `replayed`.
    #[serde(rename = "clientTxId", default)]
    pub client_tx_id: Option<String>,
    #[serde(default)]
    pub reads: Vec<ReadCheck>,
    #[serde(default)]
    pub writes: Vec<WriteOp>,
    /// All-or-nothing mode: any per-write conflict prevents every write
    /// from applying. Rejections always roll back the whole submission,
    /// strict or not.
    #[serde(default)]
    pub strict: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteStatus {
    Ok,
    Conflict,
    Rejected,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    #[serde(rename = "ref")]
    pub target: BranchRef,
    pub status: WriteStatus,
    #[serde(rename = "newHeads", skip_serializing_if = "Option::is_none")]
    pub new_heads: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Number of changes applied by this write, synthesized merges included.
    pub applied: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictInfo {
    #[serde(rename = "ref")]
    pub target: BranchRef,
    pub expected: Vec<String>,
    pub actual: Vec<String>,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResponse {
    /// 0 when nothing committed.
    #[serde(rename = "txId")]
    pub tx_id: u64,
    #[serde(rename = "committedAt")]
    pub committed_at: i64,
    pub results: Vec<WriteResult>,
    pub conflicts: Vec<ConflictInfo>,
    /// True when this response was served from the transaction log for a
    /// previously committed `client_tx_id`.
    #[serde(default)]
    pub replayed: bool,
}

impl TxResponse {
    pub fn committed(&self) -> bool {
        self.tx_id != 0
    }
}
