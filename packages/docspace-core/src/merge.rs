//! Explicit branch merge: fold a source branch into a target through the
//! normal transaction path, then close the source once the target frontier
//! collapses to a single head.

use tracing::debug;

use crate::error::{Error, Result};
use crate::ids::{BranchRef, DocId};
use crate::pit;
use crate::space::Space;
use crate::store::SpaceStore;
use crate::tx::{ChangePayload, MergeSource, TxRequest, WriteOp, WriteStatus};

impl<S: SpaceStore> Space<S> {
    /// Merge `source` into `target` on the same document. Applies every
    /// source change the target lacks plus a synthesized merge change whose
    /// dependencies cover the union of both head sets, and returns the new
    /// head hash. The source branch is closed (with lineage recorded) only
    /// if the merge leaves the target with a single head; otherwise it stays
    /// open and untouched.
    pub fn merge_branches(&mut self, doc: &DocId, source: &str, target: &str) -> Result<String> {
        if source == target {
            return Err(Error::InvalidRequest("cannot merge a branch into itself".into()));
        }
        let source_ref = BranchRef::new(doc.clone(), source)?;
        let target_ref = BranchRef::new(doc.clone(), target)?;
        let source_state = self.peek_branch(&source_ref)?;
        if source_state.closed {
            return Err(Error::BranchClosed(source_ref.to_string()));
        }
        let target_state = self.peek_branch(&target_ref)?;
        if target_state.closed {
            return Err(Error::BranchClosed(target_ref.to_string()));
        }

        // Source changes the target ledger does not hold, in source order.
        let mut payloads = Vec::new();
        for entry in self
            .store
            .changes_in_range(&source_state.branch_id, 0, source_state.seq_no)?
        {
            if self.store.has_change(&target_state.branch_id, &entry.change_hash)? {
                continue;
            }
            let blob = self.store.cas_get(&entry.bytes_hash)?.ok_or_else(|| {
                Error::Integrity(format!("change blob {} missing from cas", entry.bytes_hash))
            })?;
            payloads.push(ChangePayload { bytes: blob.bytes });
        }

        // Synthesize the merge change over the combined history.
        let mut combined = pit::reconstruct(
            &self.store,
            &target_state,
            target_state.seq_no,
            self.settings.snapshots_enabled,
        )?;
        for payload in &payloads {
            combined.apply_change(&payload.bytes)?;
        }
        let actor = self.merge_actor_bytes()?;
        let (merge_hash, merge_bytes) =
            combined.merge_marker(&actor, &format!("merge {source} into {target}"))?;
        payloads.push(ChangePayload { bytes: merge_bytes });

        let response = self.submit(TxRequest {
            client_tx_id: None,
            reads: Vec::new(),
            writes: vec![WriteOp {
                target: target_ref.clone(),
                base_heads: target_state.heads.clone(),
                changes: payloads,
                allow_server_merge: false,
                merge_of: vec![MergeSource {
                    branch: source.to_string(),
                    heads: source_state.heads.clone(),
                }],
            }],
            strict: true,
        })?;

        let result = response
            .results
            .first()
            .ok_or_else(|| Error::Storage("merge submission returned no result".into()))?;
        if result.status != WriteStatus::Ok {
            return Err(Error::InvalidRequest(format!(
                "merge of {source_ref} into {target_ref} failed: {}",
                result.reason.clone().unwrap_or_default()
            )));
        }

        let new_heads = result.new_heads.clone().unwrap_or_default();
        if new_heads.len() == 1 {
            let mut closed = source_state;
            closed.closed = true;
            closed.merged_into = Some(target_state.branch_id.clone());
            self.store.put_branch(&closed)?;
            debug!(source = %source_ref, target = %target_ref, head = %merge_hash,
                "source branch closed after merge");
        } else {
            debug!(source = %source_ref, target = %target_ref, heads = new_heads.len(),
                "merge left multiple heads; source stays open");
        }
        Ok(merge_hash)
    }
}
