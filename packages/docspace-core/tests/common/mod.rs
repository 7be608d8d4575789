#![allow(dead_code)]

use automerge::transaction::Transactable;
use automerge::{ActorId, AutoCommit, Change, ROOT};

use docspace_core::{
    BranchRef, ChangePayload, DocId, MemoryStore, Space, SpaceId, SpaceSettings, TxRequest,
    WriteOp,
};

/// A client editing session producing real CRDT changes.
pub struct Session {
    doc: AutoCommit,
}

impl Session {
    pub fn new(actor: &[u8]) -> Self {
        let mut doc = AutoCommit::new();
        doc.set_actor(ActorId::from(actor));
        Self { doc }
    }

    /// Concurrent session sharing this one's committed history.
    pub fn fork(&mut self, actor: &[u8]) -> Self {
        let mut doc = AutoCommit::load(&self.doc.save()).expect("fork session");
        doc.set_actor(ActorId::from(actor));
        Self { doc }
    }

    pub fn put_int(&mut self, key: &str, value: i64) -> &mut Self {
        self.doc.put(ROOT, key, value).expect("put int");
        self
    }

    pub fn put_text(&mut self, key: &str, value: &str) -> &mut Self {
        self.doc.put(ROOT, key, value).expect("put text");
        self
    }

    /// Commit pending edits into one change payload.
    pub fn change(&mut self) -> ChangePayload {
        self.doc.commit();
        ChangePayload {
            bytes: self.doc.save_incremental(),
        }
    }

    /// Absorb a change another session produced (e.g. to author a covering
    /// change after a fork).
    pub fn merge_bytes(&mut self, payload: &ChangePayload) {
        let change = Change::from_bytes(payload.bytes.clone()).expect("parse change");
        self.doc.apply_changes([change]).expect("apply change");
        // Re-baseline so the next `change()` holds only local edits.
        let _ = self.doc.save();
    }

    pub fn heads(&mut self) -> Vec<String> {
        let mut heads: Vec<String> = self.doc.get_heads().iter().map(|h| h.to_string()).collect();
        heads.sort_unstable();
        heads
    }
}

pub fn space() -> Space<MemoryStore> {
    space_with(SpaceSettings::default())
}

pub fn space_with(settings: SpaceSettings) -> Space<MemoryStore> {
    let id = SpaceId::new("did:test:space").expect("space id");
    Space::open_with(id, MemoryStore::new(), settings).expect("open space")
}

pub fn doc(id: &str) -> DocId {
    DocId::new(id).expect("doc id")
}

pub fn target(doc_id: &str, branch: &str) -> BranchRef {
    BranchRef::new(doc(doc_id), branch).expect("branch ref")
}

pub fn write(target: &BranchRef, base_heads: Vec<String>, changes: Vec<ChangePayload>) -> WriteOp {
    WriteOp {
        target: target.clone(),
        base_heads,
        changes,
        allow_server_merge: false,
        merge_of: Vec::new(),
    }
}

pub fn submit_one(target: &BranchRef, base_heads: Vec<String>, changes: Vec<ChangePayload>) -> TxRequest {
    TxRequest {
        client_tx_id: None,
        reads: Vec::new(),
        writes: vec![write(target, base_heads, changes)],
        strict: false,
    }
}
