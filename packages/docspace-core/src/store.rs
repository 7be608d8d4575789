//! Persistence boundary. The pipeline computes every effect of a submission
//! up front and hands the store one [`CommitBatch`]; an implementation must
//! apply the whole batch atomically or not at all. Reads are plain lookups
//! with no side effects.

use std::collections::{BTreeMap, HashMap};

use crate::branch::BranchState;
use crate::cas::CasEntry;
use crate::error::{Error, Result};
use crate::ids::DocId;
use crate::record::{ChangeEntry, JsonCacheEntry, SnapshotEntry, TxRecord};
use crate::settings::SpaceSettings;

/// Every durable effect of one committed submission.
#[derive(Debug, Default)]
pub struct CommitBatch {
    pub tx: Option<TxRecord>,
    pub branches: Vec<BranchState>,
    pub changes: Vec<ChangeEntry>,
    pub cas: Vec<CasEntry>,
    pub snapshots: Vec<SnapshotEntry>,
    pub json_cache: Vec<JsonCacheEntry>,
}

/// Storage contract for one space. One implementation instance backs exactly
/// one space; spaces never share storage.
pub trait SpaceStore {
    fn branch(&self, doc: &DocId, name: &str) -> Result<Option<BranchState>>;
    /// Used for lazy branch creation and administrative state flips (branch
    /// close on merge); everything else goes through [`Self::commit`].
    fn put_branch(&mut self, branch: &BranchState) -> Result<()>;

    /// Ledger entries with `seq_no` in `(after, upto]`, ascending.
    fn changes_in_range(&self, branch_id: &str, after: u64, upto: u64) -> Result<Vec<ChangeEntry>>;
    fn change_by_seq(&self, branch_id: &str, seq_no: u64) -> Result<Option<ChangeEntry>>;
    fn changes_by_tx(&self, branch_id: &str, tx_id: u64) -> Result<Vec<ChangeEntry>>;
    fn has_change(&self, branch_id: &str, change_hash: &str) -> Result<bool>;
    /// Highest `seq_no` on the branch committed by a transaction `<= tx_id`.
    fn seq_at_tx(&self, branch_id: &str, tx_id: u64) -> Result<Option<u64>>;

    fn cas_get(&self, digest: &str) -> Result<Option<CasEntry>>;
    fn cas_has(&self, digest: &str) -> Result<bool>;

    fn snapshot_at_or_before(&self, branch_id: &str, seq_no: u64) -> Result<Option<SnapshotEntry>>;

    fn json_cache(&self, branch_id: &str) -> Result<Option<JsonCacheEntry>>;

    fn tx(&self, tx_id: u64) -> Result<Option<TxRecord>>;
    fn tx_by_client_id(&self, client_tx_id: &str) -> Result<Option<TxRecord>>;
    fn last_tx(&self) -> Result<Option<TxRecord>>;

    fn load_settings(&self) -> Result<Option<SpaceSettings>>;
    fn save_settings(&mut self, settings: &SpaceSettings) -> Result<()>;

    /// Apply the batch atomically. CAS inserts are idempotent: a digest that
    /// already exists is left untouched.
    fn commit(&mut self, batch: CommitBatch) -> Result<()>;
}

/// In-memory store for prototyping and tests. Mirrors the semantics the
/// SQLite adapter provides on disk.
#[derive(Default)]
pub struct MemoryStore {
    branches: BTreeMap<String, BranchState>,
    branch_names: HashMap<(String, String), String>,
    changes: BTreeMap<(String, u64), ChangeEntry>,
    cas: BTreeMap<String, CasEntry>,
    snapshots: BTreeMap<(String, u64), SnapshotEntry>,
    json_cache: BTreeMap<String, JsonCacheEntry>,
    txs: BTreeMap<u64, TxRecord>,
    client_tx_ids: HashMap<String, u64>,
    settings: Option<SpaceSettings>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn store_branch(&mut self, branch: &BranchState) {
        self.branch_names.insert(
            (branch.doc_id.as_str().to_string(), branch.name.clone()),
            branch.branch_id.clone(),
        );
        self.branches.insert(branch.branch_id.clone(), branch.clone());
    }
}

impl SpaceStore for MemoryStore {
    fn branch(&self, doc: &DocId, name: &str) -> Result<Option<BranchState>> {
        let key = (doc.as_str().to_string(), name.to_string());
        Ok(self
            .branch_names
            .get(&key)
            .and_then(|id| self.branches.get(id))
            .cloned())
    }

    fn put_branch(&mut self, branch: &BranchState) -> Result<()> {
        self.store_branch(branch);
        Ok(())
    }

    fn changes_in_range(&self, branch_id: &str, after: u64, upto: u64) -> Result<Vec<ChangeEntry>> {
        if upto <= after {
            return Ok(Vec::new());
        }
        Ok(self
            .changes
            .range((branch_id.to_string(), after + 1)..=(branch_id.to_string(), upto))
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    fn change_by_seq(&self, branch_id: &str, seq_no: u64) -> Result<Option<ChangeEntry>> {
        Ok(self.changes.get(&(branch_id.to_string(), seq_no)).cloned())
    }

    fn changes_by_tx(&self, branch_id: &str, tx_id: u64) -> Result<Vec<ChangeEntry>> {
        Ok(self
            .changes
            .range((branch_id.to_string(), 0)..=(branch_id.to_string(), u64::MAX))
            .filter(|(_, e)| e.tx_id == tx_id)
            .map(|(_, e)| e.clone())
            .collect())
    }

    fn has_change(&self, branch_id: &str, change_hash: &str) -> Result<bool> {
        Ok(self
            .changes
            .range((branch_id.to_string(), 0)..=(branch_id.to_string(), u64::MAX))
            .any(|(_, e)| e.change_hash == change_hash))
    }

    fn seq_at_tx(&self, branch_id: &str, tx_id: u64) -> Result<Option<u64>> {
        Ok(self
            .changes
            .range((branch_id.to_string(), 0)..=(branch_id.to_string(), u64::MAX))
            .filter(|(_, e)| e.tx_id <= tx_id)
            .map(|(_, e)| e.seq_no)
            .max())
    }

    fn cas_get(&self, digest: &str) -> Result<Option<CasEntry>> {
        Ok(self.cas.get(digest).cloned())
    }

    fn cas_has(&self, digest: &str) -> Result<bool> {
        Ok(self.cas.contains_key(digest))
    }

    fn snapshot_at_or_before(&self, branch_id: &str, seq_no: u64) -> Result<Option<SnapshotEntry>> {
        Ok(self
            .snapshots
            .range((branch_id.to_string(), 0)..=(branch_id.to_string(), seq_no))
            .next_back()
            .map(|(_, s)| s.clone()))
    }

    fn json_cache(&self, branch_id: &str) -> Result<Option<JsonCacheEntry>> {
        Ok(self.json_cache.get(branch_id).cloned())
    }

    fn tx(&self, tx_id: u64) -> Result<Option<TxRecord>> {
        Ok(self.txs.get(&tx_id).cloned())
    }

    fn tx_by_client_id(&self, client_tx_id: &str) -> Result<Option<TxRecord>> {
        Ok(self
            .client_tx_ids
            .get(client_tx_id)
            .and_then(|id| self.txs.get(id))
            .cloned())
    }

    fn last_tx(&self) -> Result<Option<TxRecord>> {
        Ok(self.txs.values().next_back().cloned())
    }

    fn load_settings(&self) -> Result<Option<SpaceSettings>> {
        Ok(self.settings.clone())
    }

    fn save_settings(&mut self, settings: &SpaceSettings) -> Result<()> {
        self.settings = Some(settings.clone());
        Ok(())
    }

    fn commit(&mut self, batch: CommitBatch) -> Result<()> {
        if let Some(tx) = &batch.tx {
            if self.txs.contains_key(&tx.tx_id) {
                return Err(Error::Storage(format!("tx id {} already committed", tx.tx_id)));
            }
            if let Some(cid) = &tx.client_tx_id {
                self.client_tx_ids.insert(cid.clone(), tx.tx_id);
            }
            self.txs.insert(tx.tx_id, tx.clone());
        }
        for branch in &batch.branches {
            self.store_branch(branch);
        }
        for entry in batch.changes {
            self.changes.insert((entry.branch_id.clone(), entry.seq_no), entry);
        }
        for entry in batch.cas {
            self.cas.entry(entry.digest.clone()).or_insert(entry);
        }
        for snapshot in batch.snapshots {
            self.snapshots.insert((snapshot.branch_id.clone(), snapshot.seq_no), snapshot);
        }
        for cache in batch.json_cache {
            self.json_cache.insert(cache.branch_id.clone(), cache);
        }
        Ok(())
    }
}
