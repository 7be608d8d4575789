//! The space engine: branch lifecycle, the transaction pipeline, and the
//! audit surface. A `Space` wires a storage backend, settings, and an
//! invariant registry together and is the only writer to its store.
//!
//! A space serializes submissions (`&mut self`); callers that share one
//! across threads wrap it in a lock. Writes to different branches within a
//! submission are independent, and readers never mutate.

use std::collections::{btree_map::Entry, BTreeMap, HashSet};

use serde_json::{json, Value};
use tracing::{debug, trace, warn};

use crate::branch::BranchState;
use crate::cas::{CasEntry, CasKind};
use crate::codec::{self, ChangeHeader, Doc};
use crate::error::{Error, Result};
use crate::hash;
use crate::ids::{BranchRef, DocId, SpaceId};
use crate::invariants::{InvariantInput, InvariantRegistry};
use crate::pit;
use crate::record::{ChangeEntry, JsonCacheEntry, SnapshotEntry, TxRecord};
use crate::settings::{MergeActorPolicy, SpaceSettings};
use crate::store::{CommitBatch, SpaceStore};
use crate::tx::{
    ConflictInfo, TxRequest, TxResponse, WriteOp, WriteResult, WriteStatus,
};

pub struct Space<S: SpaceStore> {
    pub(crate) id: SpaceId,
    pub(crate) store: S,
    pub(crate) settings: SpaceSettings,
    pub(crate) invariants: InvariantRegistry,
}

/// Mutable view of one branch while a submission is staged: its state, the
/// reconstructed document, and everything this submission would append.
struct WorkingBranch {
    state: BranchState,
    doc: Doc,
    pending: Vec<PendingChange>,
    snapshots: Vec<(u64, Vec<u8>)>,
    dirty: bool,
}

struct PendingChange {
    header: ChangeHeader,
    bytes: Vec<u8>,
    seq_no: u64,
}

enum Outcome {
    Applied { new_heads: Vec<String>, applied: u64 },
    Conflict { reason: String, expected: Vec<String>, actual: Vec<String> },
    Rejected { reason: String },
}

impl<S: SpaceStore> Space<S> {
    /// Open a space over a store, reusing persisted settings when present.
    pub fn open(id: SpaceId, store: S) -> Result<Self> {
        let settings = store.load_settings()?.unwrap_or_default();
        Self::open_with(id, store, settings)
    }

    /// Open a space with explicit settings, persisting them.
    pub fn open_with(id: SpaceId, mut store: S, settings: SpaceSettings) -> Result<Self> {
        settings.validate()?;
        store.save_settings(&settings)?;
        debug!(space = %id, "space opened");
        Ok(Self {
            id,
            store,
            settings,
            invariants: InvariantRegistry::new(),
        })
    }

    pub fn id(&self) -> &SpaceId {
        &self.id
    }

    pub fn settings(&self) -> &SpaceSettings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn invariants(&self) -> &InvariantRegistry {
        &self.invariants
    }

    pub fn invariants_mut(&mut self) -> &mut InvariantRegistry {
        &mut self.invariants
    }

    /// Replace the registry wholesale, e.g. with one shared across spaces.
    pub fn set_invariants(&mut self, registry: InvariantRegistry) {
        self.invariants = registry;
    }

    /// Existing state, or a newly persisted empty branch.
    pub fn get_or_create_branch(&mut self, doc: &DocId, branch: &str) -> Result<BranchState> {
        let target = BranchRef::new(doc.clone(), branch)?;
        if let Some(existing) = self.store.branch(doc, branch)? {
            return Ok(existing);
        }
        let state = BranchState::new(&target)?;
        self.store.put_branch(&state)?;
        debug!(space = %self.id, branch = %target, "branch created");
        Ok(state)
    }

    /// Pure read. Unknown branches come back empty-initialized rather than
    /// erroring; they are created lazily on first write.
    pub fn branch_state(&self, doc: &DocId, branch: &str) -> Result<BranchState> {
        self.peek_branch(&BranchRef::new(doc.clone(), branch)?)
    }

    pub(crate) fn peek_branch(&self, target: &BranchRef) -> Result<BranchState> {
        match self.store.branch(&target.doc, &target.branch)? {
            Some(state) => Ok(state),
            None => BranchState::new(target),
        }
    }

    /// Apply one submission: validate reads, stage every write, and commit
    /// all effects atomically. Conflicts are reported per write; any
    /// rejection (invariant violation, malformed change, closed branch)
    /// rolls back the entire submission.
    pub fn submit(&mut self, req: TxRequest) -> Result<TxResponse> {
        if let Some(client_tx_id) = &req.client_tx_id {
            if let Some(prior) = self.store.tx_by_client_id(client_tx_id)? {
                let mut response: TxResponse = serde_json::from_str(&prior.response)
                    .map_err(|e| Error::Storage(format!("recorded response unreadable: {e}")))?;
                response.replayed = true;
                debug!(space = %self.id, client_tx_id = %client_tx_id, tx_id = response.tx_id,
                    "served replayed submission");
                return Ok(response);
            }
        }

        let committed_at = chrono::Utc::now().timestamp_millis();
        let mut conflicts: Vec<ConflictInfo> = Vec::new();

        for read in &req.reads {
            let state = self.peek_branch(&read.target)?;
            if !state.base_matches(&read.heads) {
                conflicts.push(ConflictInfo {
                    target: read.target.clone(),
                    expected: sorted_heads(&read.heads),
                    actual: state.heads,
                    reason: "read precondition failed: heads have moved".into(),
                });
            }
        }
        if !conflicts.is_empty() {
            warn!(space = %self.id, conflicts = conflicts.len(), "submission aborted by stale read");
            let results = req
                .writes
                .iter()
                .map(|w| failed_result(w, WriteStatus::Conflict, "submission aborted: stale read precondition"))
                .collect();
            return Ok(TxResponse {
                tx_id: 0,
                committed_at,
                results,
                conflicts,
                replayed: false,
            });
        }

        let merge_actor = self.merge_actor_bytes()?;
        let mut working: BTreeMap<String, WorkingBranch> = BTreeMap::new();
        let mut outcomes: Vec<Outcome> = Vec::with_capacity(req.writes.len());
        for write in &req.writes {
            outcomes.push(stage_write(
                &self.store,
                &self.settings,
                &self.invariants,
                &merge_actor,
                &mut working,
                write,
            )?);
        }

        for (write, outcome) in req.writes.iter().zip(&outcomes) {
            if let Outcome::Conflict { reason, expected, actual } = outcome {
                trace!(space = %self.id, branch = %write.target, reason = %reason, "write conflicted");
                conflicts.push(ConflictInfo {
                    target: write.target.clone(),
                    expected: expected.clone(),
                    actual: actual.clone(),
                    reason: reason.clone(),
                });
            }
        }

        let any_rejected = outcomes.iter().any(|o| matches!(o, Outcome::Rejected { .. }));
        let any_conflict = outcomes.iter().any(|o| matches!(o, Outcome::Conflict { .. }));

        if any_rejected || (req.strict && any_conflict) {
            let abort_reason = if any_rejected {
                "submission rolled back"
            } else {
                "strict submission aborted by a conflicting write"
            };
            warn!(space = %self.id, reason = abort_reason, "submission rolled back");
            let results = req
                .writes
                .iter()
                .zip(&outcomes)
                .map(|(write, outcome)| match outcome {
                    Outcome::Applied { .. } => failed_result(write, WriteStatus::Rejected, abort_reason),
                    Outcome::Conflict { reason, .. } => failed_result(write, WriteStatus::Conflict, reason),
                    Outcome::Rejected { reason } => failed_result(write, WriteStatus::Rejected, reason),
                })
                .collect();
            return Ok(TxResponse {
                tx_id: 0,
                committed_at,
                results,
                conflicts,
                replayed: false,
            });
        }

        let applied_total: u64 = outcomes
            .iter()
            .map(|o| match o {
                Outcome::Applied { applied, .. } => *applied,
                _ => 0,
            })
            .sum();
        let last_tx = self.store.last_tx()?;
        let tx_id = if applied_total == 0 {
            0
        } else {
            last_tx.as_ref().map(|t| t.tx_id).unwrap_or(0) + 1
        };

        let results: Vec<WriteResult> = req
            .writes
            .iter()
            .zip(&outcomes)
            .map(|(write, outcome)| match outcome {
                Outcome::Applied { new_heads, applied } => WriteResult {
                    target: write.target.clone(),
                    status: WriteStatus::Ok,
                    new_heads: Some(new_heads.clone()),
                    reason: None,
                    applied: *applied,
                },
                Outcome::Conflict { reason, .. } => failed_result(write, WriteStatus::Conflict, reason),
                Outcome::Rejected { reason } => failed_result(write, WriteStatus::Rejected, reason),
            })
            .collect();

        let response = TxResponse {
            tx_id,
            committed_at,
            results,
            conflicts,
            replayed: false,
        };
        if applied_total == 0 {
            return Ok(response);
        }

        let mut batch = CommitBatch::default();
        for (branch_id, wb) in working {
            if !wb.dirty {
                continue;
            }
            let mut state = wb.state;
            state.epoch = tx_id;
            for pending in wb.pending {
                let bytes_hash = hash::digest_bytes(&pending.bytes);
                batch.changes.push(ChangeEntry {
                    doc_id: state.doc_id.clone(),
                    branch_id: branch_id.clone(),
                    seq_no: pending.seq_no,
                    change_hash: pending.header.hash,
                    bytes_hash: bytes_hash.clone(),
                    deps: pending.header.deps,
                    lamport: pending.header.start_op,
                    actor_id: pending.header.actor_id,
                    actor_seq: pending.header.actor_seq,
                    tx_id,
                    committed_at,
                });
                batch.cas.push(CasEntry::new(CasKind::Change, pending.bytes, None));
            }
            for (seq_no, bytes) in wb.snapshots {
                let entry = CasEntry::new(CasKind::Snapshot, bytes, None);
                debug!(space = %self.id, branch_id = %branch_id, seq_no, digest = %entry.digest,
                    "snapshot materialized");
                batch.snapshots.push(SnapshotEntry {
                    doc_id: state.doc_id.clone(),
                    branch_id: branch_id.clone(),
                    seq_no,
                    tx_id,
                    digest: entry.digest.clone(),
                });
                batch.cas.push(entry);
            }
            let view = wb.doc.to_json()?;
            let json_text = String::from_utf8(hash::canonical_json_bytes(&view)?)
                .map_err(|e| Error::Codec(e.to_string()))?;
            batch.json_cache.push(JsonCacheEntry {
                doc_id: state.doc_id.clone(),
                branch_id: branch_id.clone(),
                seq_no: state.seq_no,
                json: json_text,
            });
            batch.branches.push(state);
        }

        let body = json!({
            "txId": tx_id,
            "clientTxId": &req.client_tx_id,
            "committedAt": committed_at,
            "reads": &req.reads,
            "results": &response.results,
        });
        let prev_tx_hash = last_tx.map(|t| t.tx_hash).unwrap_or_default();
        let response_text =
            serde_json::to_string(&response).map_err(|e| Error::Codec(e.to_string()))?;
        batch.tx = Some(TxRecord::seal(
            tx_id,
            &prev_tx_hash,
            &body,
            req.client_tx_id.clone(),
            committed_at,
            response_text,
        )?);

        self.store.commit(batch)?;
        debug!(space = %self.id, tx_id, applied = applied_total, "submission committed");
        Ok(response)
    }

    /// Store arbitrary caller bytes in the CAS.
    pub fn put_blob(&mut self, bytes: Vec<u8>, meta: Option<Value>) -> Result<String> {
        let entry = CasEntry::new(CasKind::Blob, bytes, meta);
        let digest = entry.digest.clone();
        self.store.commit(CommitBatch {
            cas: vec![entry],
            ..CommitBatch::default()
        })?;
        Ok(digest)
    }

    pub fn cas_entry(&self, digest: &str) -> Result<Option<CasEntry>> {
        self.store.cas_get(digest)
    }

    pub fn cas_has(&self, digest: &str) -> Result<bool> {
        self.store.cas_has(digest)
    }

    /// Ledger entry at one branch position.
    pub fn find_change_by_seq(
        &self,
        doc: &DocId,
        branch: &str,
        seq_no: u64,
    ) -> Result<Option<ChangeEntry>> {
        let target = BranchRef::new(doc.clone(), branch)?;
        self.store.change_by_seq(&target.branch_id(), seq_no)
    }

    /// Every ledger entry a transaction committed onto one branch.
    pub fn find_by_tx(&self, doc: &DocId, branch: &str, tx_id: u64) -> Result<Vec<ChangeEntry>> {
        let target = BranchRef::new(doc.clone(), branch)?;
        self.store.changes_by_tx(&target.branch_id(), tx_id)
    }

    pub fn transaction(&self, tx_id: u64) -> Result<Option<TxRecord>> {
        self.store.tx(tx_id)
    }

    /// Walk the whole transaction log recomputing the hash chain. Returns
    /// the number of records verified.
    pub fn verify_tx_chain(&self) -> Result<u64> {
        let Some(last) = self.store.last_tx()? else {
            return Ok(0);
        };
        let mut prev_tx_hash = String::new();
        let mut checked = 0;
        for tx_id in 1..=last.tx_id {
            let Some(tx) = self.store.tx(tx_id)? else {
                return Err(Error::Integrity(format!("transaction log gap at {tx_id}")));
            };
            tx.verify_chain_link(&prev_tx_hash)?;
            prev_tx_hash = tx.tx_hash;
            checked += 1;
        }
        Ok(checked)
    }

    /// Recompute a branch's integrity digest and confirm each head is a
    /// change the ledger knows.
    pub fn verify_branch(&self, doc: &DocId, branch: &str) -> Result<()> {
        let target = BranchRef::new(doc.clone(), branch)?;
        let state = self.peek_branch(&target)?;
        if !state.verify_root_hash()? {
            return Err(Error::Integrity(format!("root hash mismatch on {target}")));
        }
        for head in &state.heads {
            if !self.store.has_change(&state.branch_id, head)? {
                return Err(Error::Integrity(format!("head {head} unknown to the ledger of {target}")));
            }
        }
        Ok(())
    }

    pub(crate) fn merge_actor_bytes(&self) -> Result<Vec<u8>> {
        match &self.settings.merge_actor {
            Some(actor) => hex::decode(actor)
                .map_err(|e| Error::InvalidRequest(format!("merge_actor is not valid hex: {e}"))),
            // Stable per-space actor so synthesized merges are attributable.
            None => Ok(blake3::hash(self.id.as_str().as_bytes()).as_bytes()[..16].to_vec()),
        }
    }
}

fn sorted_heads(heads: &[String]) -> Vec<String> {
    let mut out = heads.to_vec();
    out.sort_unstable();
    out.dedup();
    out
}

fn failed_result(write: &WriteOp, status: WriteStatus, reason: &str) -> WriteResult {
    WriteResult {
        target: write.target.clone(),
        status,
        new_heads: None,
        reason: Some(reason.to_string()),
        applied: 0,
    }
}

fn load_working<S: SpaceStore>(
    store: &S,
    target: &BranchRef,
    settings: &SpaceSettings,
) -> Result<WorkingBranch> {
    let state = match store.branch(&target.doc, &target.branch)? {
        Some(state) => state,
        None => BranchState::new(target)?,
    };
    let doc = pit::reconstruct(store, &state, state.seq_no, settings.snapshots_enabled)?;
    Ok(WorkingBranch {
        state,
        doc,
        pending: Vec::new(),
        snapshots: Vec::new(),
        dirty: false,
    })
}

/// Validate and tentatively apply one write against the working set.
/// Conflicts are detected before any working state mutates; rejections may
/// leave the working set dirty, but a rejection aborts the whole submission
/// so nothing staged ever reaches the store.
fn stage_write<S: SpaceStore>(
    store: &S,
    settings: &SpaceSettings,
    invariants: &InvariantRegistry,
    merge_actor: &[u8],
    working: &mut BTreeMap<String, WorkingBranch>,
    write: &WriteOp,
) -> Result<Outcome> {
    let branch_id = write.target.branch_id();
    let wb = match working.entry(branch_id.clone()) {
        Entry::Occupied(entry) => entry.into_mut(),
        Entry::Vacant(slot) => slot.insert(load_working(store, &write.target, settings)?),
    };

    if wb.state.closed {
        return Ok(Outcome::Rejected {
            reason: format!("branch {} is closed", write.target),
        });
    }

    let mut headers = Vec::with_capacity(write.changes.len());
    for payload in &write.changes {
        match codec::decode_header(&payload.bytes) {
            Ok(header) => headers.push(header),
            Err(e) => {
                return Ok(Outcome::Rejected { reason: e.to_string() });
            }
        }
    }

    let mut synthesize_merge = false;
    if !wb.state.base_matches(&write.base_heads) {
        if write.allow_server_merge && settings.server_merge_enabled {
            if let MergeActorPolicy::Only(allowed) = &settings.merge_actor_policy {
                if hex::encode(merge_actor) != *allowed {
                    return Ok(Outcome::Conflict {
                        reason: "server merge actor not permitted".into(),
                        expected: sorted_heads(&write.base_heads),
                        actual: wb.state.heads.clone(),
                    });
                }
            }
            synthesize_merge = true;
        } else {
            return Ok(Outcome::Conflict {
                reason: "base heads do not match current branch heads".into(),
                expected: sorted_heads(&write.base_heads),
                actual: wb.state.heads.clone(),
            });
        }
    }

    // Every dependency must be known to the branch (ledger or earlier in
    // this submission) before anything mutates.
    let mut known: HashSet<String> = wb.pending.iter().map(|p| p.header.hash.clone()).collect();
    for header in &headers {
        for dep in &header.deps {
            if !known.contains(dep) && !store.has_change(&branch_id, dep)? {
                return Ok(Outcome::Conflict {
                    reason: format!("missing dependency {dep}"),
                    expected: sorted_heads(&write.base_heads),
                    actual: wb.state.heads.clone(),
                });
            }
        }
        known.insert(header.hash.clone());
    }

    let mut applied = 0u64;
    let mut applied_hashes: HashSet<String> =
        wb.pending.iter().map(|p| p.header.hash.clone()).collect();
    for (payload, header) in write.changes.iter().zip(headers) {
        // Changes the ledger already holds are skipped, not re-accepted.
        if applied_hashes.contains(&header.hash) || store.has_change(&branch_id, &header.hash)? {
            continue;
        }
        if let Err(e) = wb.doc.apply_change(&payload.bytes) {
            return Ok(Outcome::Rejected { reason: e.to_string() });
        }
        wb.state.accept(&header.deps, &header.hash)?;
        applied_hashes.insert(header.hash.clone());
        let seq_no = wb.state.seq_no;
        if settings.snapshot_due(seq_no) {
            wb.snapshots.push((seq_no, wb.doc.save()));
        }
        wb.pending.push(PendingChange {
            header,
            bytes: payload.bytes.clone(),
            seq_no,
        });
        applied += 1;
    }

    if synthesize_merge {
        let (hash, bytes) = wb.doc.merge_marker(merge_actor, "server merge")?;
        wb.doc.apply_change(&bytes)?;
        let header = codec::decode_header(&bytes)?;
        wb.state.accept(&header.deps, &header.hash)?;
        let seq_no = wb.state.seq_no;
        if settings.snapshot_due(seq_no) {
            wb.snapshots.push((seq_no, wb.doc.save()));
        }
        debug!(branch = %write.target, head = %hash, "synthesized server-side merge");
        wb.pending.push(PendingChange {
            header,
            bytes,
            seq_no,
        });
        applied += 1;
    }

    if applied > 0 {
        let view = wb.doc.to_json()?;
        let input = InvariantInput {
            doc: &write.target.doc,
            branch: &write.target.branch,
            json: &view,
        };
        if let Err(message) = invariants.check(&input) {
            return Ok(Outcome::Rejected {
                reason: format!("invariant violation: {message}"),
            });
        }
        wb.dirty = true;
    }

    Ok(Outcome::Applied {
        new_heads: wb.state.heads.clone(),
        applied,
    })
}
