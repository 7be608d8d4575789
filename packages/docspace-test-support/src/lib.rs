#![forbid(unsafe_code)]
//! Shared helpers for exercising docspace backends: a builder for real
//! automerge changes and a conformance suite any `SpaceStore` must pass.

use automerge::transaction::Transactable;
use automerge::{ActorId, AutoCommit, ROOT};

use docspace_core::{
    Accept, BranchRef, CasKind, ChangePayload, DocId, ReadOptions, Space, SpaceId, SpaceSettings,
    SpaceStore, TxRequest, WriteOp, WriteStatus,
};

/// Builds genuine CRDT changes the way a client editing session would:
/// mutate, commit, hand the incremental bytes to the store.
pub struct Scribe {
    doc: AutoCommit,
}

impl Scribe {
    pub fn new(actor: &[u8]) -> Self {
        let mut doc = AutoCommit::new();
        doc.set_actor(ActorId::from(actor));
        Self { doc }
    }

    /// Independent session sharing this one's history, for concurrent-edit
    /// scenarios.
    pub fn fork(&mut self, actor: &[u8]) -> Self {
        let mut doc = AutoCommit::load(&self.doc.save()).expect("fork scribe");
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

    /// Commit pending edits and return the raw bytes of the new change.
    pub fn change(&mut self) -> Vec<u8> {
        self.doc.commit();
        self.doc.save_incremental()
    }

    /// Current heads of the underlying session, sorted hex.
    pub fn heads(&mut self) -> Vec<String> {
        let mut heads: Vec<String> = self.doc.get_heads().iter().map(|h| h.to_string()).collect();
        heads.sort_unstable();
        heads
    }

    /// Convenience: one `put` committed as one change payload.
    pub fn change_putting_int(&mut self, key: &str, value: i64) -> ChangePayload {
        self.put_int(key, value);
        ChangePayload { bytes: self.change() }
    }
}

/// A single-branch write request rooted at `base_heads`.
pub fn write_request(target: &BranchRef, base_heads: Vec<String>, changes: Vec<ChangePayload>) -> TxRequest {
    TxRequest {
        client_tx_id: None,
        reads: Vec::new(),
        writes: vec![WriteOp {
            target: target.clone(),
            base_heads,
            changes,
            allow_server_merge: false,
            merge_of: Vec::new(),
        }],
        strict: false,
    }
}

fn doc_id() -> DocId {
    DocId::new("conformance-doc").expect("doc id")
}

fn open_space<S: SpaceStore>(store: S) -> Space<S> {
    let id = SpaceId::new("did:test:conformance").expect("space id");
    Space::open_with(id, store, SpaceSettings::default()).expect("open space")
}

/// Run every backend conformance check against fresh stores.
pub fn run_conformance<S, F>(mut fresh: F)
where
    S: SpaceStore,
    F: FnMut() -> S,
{
    check_chain_and_monotonic_seq(fresh());
    check_conflict_then_success(fresh());
    check_idempotent_replay(fresh());
    check_snapshot_cadence(fresh());
    check_cas_round_trip(fresh());
}

/// Sequential writes advance `seq_no` once per change and keep one head.
pub fn check_chain_and_monotonic_seq<S: SpaceStore>(store: S) {
    let mut space = open_space(store);
    let doc = doc_id();
    let target = BranchRef::new(doc.clone(), "main").expect("target");
    let mut scribe = Scribe::new(b"writer");

    let mut base = Vec::new();
    for i in 0..3 {
        let payload = scribe.change_putting_int("count", i);
        let resp = space.submit(write_request(&target, base.clone(), vec![payload])).expect("submit");
        assert_eq!(resp.results[0].status, WriteStatus::Ok, "write {i} should apply");
        base = resp.results[0].new_heads.clone().expect("heads");
        assert_eq!(base.len(), 1);
    }
    let state = space.branch_state(&doc, "main").expect("state");
    assert_eq!(state.seq_no, 3);
    assert_eq!(state.heads, base);
}

/// A stale causal base conflicts; retrying from the current heads applies.
pub fn check_conflict_then_success<S: SpaceStore>(store: S) {
    let mut space = open_space(store);
    let doc = doc_id();
    let target = BranchRef::new(doc.clone(), "main").expect("target");
    let mut scribe = Scribe::new(b"writer");

    let first = scribe.change_putting_int("a", 1);
    let resp = space.submit(write_request(&target, Vec::new(), vec![first])).expect("submit");
    let heads = resp.results[0].new_heads.clone().expect("heads");

    let mut rival = Scribe::new(b"rival");
    let stale = rival.change_putting_int("b", 2);
    let resp = space
        .submit(write_request(&target, Vec::new(), vec![stale.clone()]))
        .expect("submit");
    assert_eq!(resp.results[0].status, WriteStatus::Conflict);
    assert_eq!(resp.tx_id, 0);

    // The rival refetches and rebases by submitting against current heads;
    // its change is concurrent, so the branch forks to two sorted heads.
    let resp = space.submit(write_request(&target, heads, vec![stale])).expect("submit");
    assert_eq!(resp.results[0].status, WriteStatus::Ok);
    let new_heads = resp.results[0].new_heads.clone().expect("heads");
    assert_eq!(new_heads.len(), 2);
    let mut sorted = new_heads.clone();
    sorted.sort_unstable();
    assert_eq!(new_heads, sorted);
}

/// Resubmitting a committed `client_tx_id` replays the recorded outcome.
pub fn check_idempotent_replay<S: SpaceStore>(store: S) {
    let mut space = open_space(store);
    let doc = doc_id();
    let target = BranchRef::new(doc.clone(), "main").expect("target");
    let mut scribe = Scribe::new(b"writer");

    let mut request = write_request(&target, Vec::new(), vec![scribe.change_putting_int("a", 1)]);
    request.client_tx_id = Some("req-1".into());

    let first = space.submit(request.clone()).expect("submit");
    assert!(!first.replayed);
    let second = space.submit(request).expect("submit");
    assert!(second.replayed);
    assert_eq!(first.tx_id, second.tx_id);
    assert_eq!(first.results[0].new_heads, second.results[0].new_heads);
    assert_eq!(space.branch_state(&doc, "main").expect("state").seq_no, 1);
}

/// With the default cadence, the fifth accepted change leaves a snapshot
/// that bounds later replays.
pub fn check_snapshot_cadence<S: SpaceStore>(store: S) {
    let mut space = open_space(store);
    let doc = doc_id();
    let target = BranchRef::new(doc.clone(), "main").expect("target");
    let mut scribe = Scribe::new(b"writer");

    let mut base = Vec::new();
    for i in 0..6 {
        let payload = scribe.change_putting_int("i", i);
        let resp = space.submit(write_request(&target, base, vec![payload])).expect("submit");
        base = resp.results[0].new_heads.clone().expect("heads");
    }

    let branch_id = target.branch_id();
    let snapshot = space
        .store()
        .snapshot_at_or_before(&branch_id, 6)
        .expect("snapshot lookup")
        .expect("snapshot exists");
    assert_eq!(snapshot.seq_no, 5);
    assert!(space.store().cas_has(&snapshot.digest).expect("cas"));

    let bytes = space
        .doc_bytes(&doc, "main", &ReadOptions::automerge().at_seq(6))
        .expect("pit read");
    let again = space
        .doc_bytes(&doc, "main", &ReadOptions::automerge().at_seq(6))
        .expect("pit read");
    assert_eq!(bytes, again, "reconstruction must be deterministic");
    assert_eq!(opts_tip(&mut space, &doc), bytes, "seq 6 is the tip");
}

fn opts_tip<S: SpaceStore>(space: &mut Space<S>, doc: &DocId) -> Vec<u8> {
    space
        .doc_bytes(doc, "main", &ReadOptions { accept: Accept::Automerge, seq: None, epoch: None, paths: None })
        .expect("tip read")
}

/// CAS entries dedupe by digest and survive round trips.
pub fn check_cas_round_trip<S: SpaceStore>(store: S) {
    let mut space = open_space(store);
    let digest = space.put_blob(b"blob bytes".to_vec(), None).expect("put blob");
    let same = space.put_blob(b"blob bytes".to_vec(), None).expect("put blob");
    assert_eq!(digest, same);
    let entry = space.cas_entry(&digest).expect("get").expect("present");
    assert_eq!(entry.kind, CasKind::Blob);
    assert_eq!(entry.bytes, b"blob bytes");
}
