mod common;

use common::{doc, space, space_with, submit_one, target, write, Session};
use docspace_core::{
    MergeActorPolicy, ReadCheck, ReadOptions, SpaceSettings, TxRequest, WriteStatus,
};
use serde_json::json;

#[test]
fn empty_branch_then_conflict_then_success() {
    let mut space = space();
    let t = target("doc-1", "main");
    let mut alice = Session::new(b"alice");
    let mut bob = Session::new(b"bob");

    alice.put_int("a", 1);
    let c1 = alice.change();
    let resp = space.submit(submit_one(&t, Vec::new(), vec![c1])).unwrap();
    assert_eq!(resp.results[0].status, WriteStatus::Ok);
    let heads1 = resp.results[0].new_heads.clone().unwrap();
    assert_eq!(heads1.len(), 1);

    // A second writer submits against the (now stale) empty base.
    bob.put_int("b", 2);
    let c2 = bob.change();
    let resp = space.submit(submit_one(&t, Vec::new(), vec![c2.clone()])).unwrap();
    assert_eq!(resp.tx_id, 0);
    assert_eq!(resp.results[0].status, WriteStatus::Conflict);
    assert_eq!(resp.conflicts.len(), 1);
    assert_eq!(resp.conflicts[0].actual, heads1);

    // Refetching current heads and resubmitting applies; the concurrent
    // change forks the frontier into two sorted heads.
    let resp = space.submit(submit_one(&t, heads1.clone(), vec![c2])).unwrap();
    assert_eq!(resp.results[0].status, WriteStatus::Ok);
    let heads2 = resp.results[0].new_heads.clone().unwrap();
    assert_eq!(heads2.len(), 2);
    let mut sorted = heads2.clone();
    sorted.sort_unstable();
    assert_eq!(heads2, sorted);
    assert!(heads2.contains(&heads1[0]));
}

#[test]
fn seq_no_counts_accepted_submissions() {
    let mut space = space();
    let t = target("doc-1", "main");
    let mut session = Session::new(b"writer");

    let mut base = Vec::new();
    for i in 0..5 {
        session.put_int("n", i);
        let resp = space.submit(submit_one(&t, base, vec![session.change()])).unwrap();
        base = resp.results[0].new_heads.clone().unwrap();
        let state = space.branch_state(&doc("doc-1"), "main").unwrap();
        assert_eq!(state.seq_no, i as u64 + 1);
        assert_eq!(state.epoch, resp.tx_id);
        assert_eq!(state.heads, base);
    }
}

#[test]
fn replayed_client_tx_id_returns_prior_result() {
    let mut space = space();
    let t = target("doc-1", "main");
    let mut session = Session::new(b"writer");

    session.put_int("a", 1);
    let mut request = submit_one(&t, Vec::new(), vec![session.change()]);
    request.client_tx_id = Some("client-req-1".into());

    let first = space.submit(request.clone()).unwrap();
    assert!(!first.replayed);
    assert!(first.committed());

    let second = space.submit(request).unwrap();
    assert!(second.replayed, "replay must be observably distinct");
    assert_eq!(second.tx_id, first.tx_id);
    assert_eq!(second.results, first.results);

    let state = space.branch_state(&doc("doc-1"), "main").unwrap();
    assert_eq!(state.seq_no, 1);
    assert_eq!(Some(state.heads), first.results[0].new_heads.clone());
}

#[test]
fn strict_submission_is_all_or_nothing() {
    let mut space = space();
    let t1 = target("doc-1", "main");
    let t2 = target("doc-2", "main");
    let mut a = Session::new(b"alice");
    let mut b = Session::new(b"bob");

    a.put_int("a", 1);
    let resp = space.submit(submit_one(&t1, Vec::new(), vec![a.change()])).unwrap();
    assert!(resp.committed());
    let before_one = space.branch_state(&doc("doc-1"), "main").unwrap();
    let before_two = space.branch_state(&doc("doc-2"), "main").unwrap();

    // One valid write, one with a mismatched base, strict mode.
    a.put_int("a", 2);
    b.put_int("b", 1);
    let request = TxRequest {
        client_tx_id: None,
        reads: Vec::new(),
        writes: vec![
            write(&t1, before_one.heads.clone(), vec![a.change()]),
            write(&t2, vec!["stalehead".into()], vec![b.change()]),
        ],
        strict: true,
    };
    let resp = space.submit(request).unwrap();
    assert_eq!(resp.tx_id, 0);
    assert_eq!(resp.results[0].status, WriteStatus::Rejected);
    assert_eq!(resp.results[1].status, WriteStatus::Conflict);

    assert_eq!(space.branch_state(&doc("doc-1"), "main").unwrap(), before_one);
    assert_eq!(space.branch_state(&doc("doc-2"), "main").unwrap(), before_two);
}

#[test]
fn default_mode_commits_clean_writes_beside_conflicts() {
    let mut space = space();
    let t1 = target("doc-1", "main");
    let t2 = target("doc-2", "main");
    let mut a = Session::new(b"alice");
    let mut b = Session::new(b"bob");

    a.put_int("a", 1);
    b.put_int("b", 1);
    let request = TxRequest {
        client_tx_id: None,
        reads: Vec::new(),
        writes: vec![
            write(&t1, Vec::new(), vec![a.change()]),
            write(&t2, vec!["stalehead".into()], vec![b.change()]),
        ],
        strict: false,
    };
    let resp = space.submit(request).unwrap();
    assert!(resp.committed());
    assert_eq!(resp.results[0].status, WriteStatus::Ok);
    assert_eq!(resp.results[1].status, WriteStatus::Conflict);
    assert_eq!(resp.conflicts.len(), 1);

    assert_eq!(space.branch_state(&doc("doc-1"), "main").unwrap().seq_no, 1);
    assert_eq!(space.branch_state(&doc("doc-2"), "main").unwrap().seq_no, 0);
}

#[test]
fn invariant_violation_fails_closed() {
    let mut space = space();
    let t = target("doc-1", "main");
    space.invariants_mut().register(|input| {
        if input.json.get("a") == Some(&json!(1)) {
            Err("a must not be 1".into())
        } else {
            Ok(())
        }
    });

    let mut session = Session::new(b"writer");
    session.put_int("a", 1);
    let resp = space.submit(submit_one(&t, Vec::new(), vec![session.change()])).unwrap();
    assert_eq!(resp.tx_id, 0);
    assert_eq!(resp.results[0].status, WriteStatus::Rejected);
    assert!(resp.results[0].reason.as_deref().unwrap().contains("invariant"));

    let state = space.branch_state(&doc("doc-1"), "main").unwrap();
    assert_eq!(state.seq_no, 0);
    assert!(state.heads.is_empty());
}

#[test]
fn invariant_violation_rolls_back_unrelated_writes() {
    let mut space = space();
    let t1 = target("doc-1", "main");
    let t2 = target("doc-2", "main");
    space.invariants_mut().register(|input| {
        if input.json.get("forbidden").is_some() {
            Err("forbidden key".into())
        } else {
            Ok(())
        }
    });

    let mut a = Session::new(b"alice");
    let mut b = Session::new(b"bob");
    a.put_int("fine", 1);
    b.put_int("forbidden", 1);
    let request = TxRequest {
        client_tx_id: None,
        reads: Vec::new(),
        writes: vec![
            write(&t1, Vec::new(), vec![a.change()]),
            write(&t2, Vec::new(), vec![b.change()]),
        ],
        strict: false,
    };
    let resp = space.submit(request).unwrap();
    assert_eq!(resp.tx_id, 0);
    assert!(resp.results.iter().all(|r| r.status == WriteStatus::Rejected));
    assert_eq!(space.branch_state(&doc("doc-1"), "main").unwrap().seq_no, 0);
    assert_eq!(space.branch_state(&doc("doc-2"), "main").unwrap().seq_no, 0);
}

#[test]
fn malformed_change_rejects_whole_submission() {
    let mut space = space();
    let t1 = target("doc-1", "main");
    let t2 = target("doc-2", "main");
    let mut a = Session::new(b"alice");

    a.put_int("a", 1);
    let request = TxRequest {
        client_tx_id: None,
        reads: Vec::new(),
        writes: vec![
            write(&t1, Vec::new(), vec![a.change()]),
            write(
                &t2,
                Vec::new(),
                vec![docspace_core::ChangePayload {
                    bytes: b"definitely not a change".to_vec(),
                }],
            ),
        ],
        strict: false,
    };
    let resp = space.submit(request).unwrap();
    assert_eq!(resp.tx_id, 0);
    assert_eq!(resp.results[0].status, WriteStatus::Rejected);
    assert_eq!(resp.results[1].status, WriteStatus::Rejected);
    assert_eq!(space.branch_state(&doc("doc-1"), "main").unwrap().seq_no, 0);
}

#[test]
fn stale_read_precondition_aborts() {
    let mut space = space();
    let t = target("doc-1", "main");
    let mut session = Session::new(b"writer");

    session.put_int("a", 1);
    let resp = space.submit(submit_one(&t, Vec::new(), vec![session.change()])).unwrap();
    let heads = resp.results[0].new_heads.clone().unwrap();

    session.put_int("a", 2);
    let request = TxRequest {
        client_tx_id: None,
        reads: vec![ReadCheck {
            target: target("doc-1", "main"),
            heads: Vec::new(), // stale: the branch has moved past genesis
        }],
        writes: vec![write(&t, heads.clone(), vec![session.change()])],
        strict: false,
    };
    let resp = space.submit(request).unwrap();
    assert_eq!(resp.tx_id, 0);
    assert_eq!(resp.results[0].status, WriteStatus::Conflict);
    assert_eq!(resp.conflicts[0].actual, heads);
    assert_eq!(space.branch_state(&doc("doc-1"), "main").unwrap().seq_no, 1);
}

#[test]
fn server_merge_applies_stale_write_and_collapses() {
    let mut space = space();
    let t = target("doc-1", "main");
    let mut alice = Session::new(b"alice");
    let mut bob = Session::new(b"bob");

    alice.put_int("a", 1);
    let resp = space.submit(submit_one(&t, Vec::new(), vec![alice.change()])).unwrap();
    assert!(resp.committed());

    // Bob's base is stale, but he allows the space to merge for him.
    bob.put_int("b", 2);
    let mut request = submit_one(&t, Vec::new(), vec![bob.change()]);
    request.writes[0].allow_server_merge = true;
    let resp = space.submit(request).unwrap();
    assert_eq!(resp.results[0].status, WriteStatus::Ok);
    // Bob's change plus the synthesized merge marker.
    assert_eq!(resp.results[0].applied, 2);
    let heads = resp.results[0].new_heads.clone().unwrap();
    assert_eq!(heads.len(), 1);

    let state = space.branch_state(&doc("doc-1"), "main").unwrap();
    assert_eq!(state.seq_no, 3);
    let view = space
        .doc_bytes(&doc("doc-1"), "main", &ReadOptions::json())
        .unwrap();
    let view: serde_json::Value = serde_json::from_slice(&view).unwrap();
    assert_eq!(view, json!({"a": 1, "b": 2}));
}

#[test]
fn server_merge_disabled_reports_conflict() {
    let mut space = space_with(SpaceSettings {
        server_merge_enabled: false,
        ..SpaceSettings::default()
    });
    let t = target("doc-1", "main");
    let mut alice = Session::new(b"alice");
    let mut bob = Session::new(b"bob");

    alice.put_int("a", 1);
    space.submit(submit_one(&t, Vec::new(), vec![alice.change()])).unwrap();

    bob.put_int("b", 2);
    let mut request = submit_one(&t, Vec::new(), vec![bob.change()]);
    request.writes[0].allow_server_merge = true;
    let resp = space.submit(request).unwrap();
    assert_eq!(resp.results[0].status, WriteStatus::Conflict);
    assert_eq!(space.branch_state(&doc("doc-1"), "main").unwrap().seq_no, 1);
}

#[test]
fn merge_actor_policy_can_veto_synthesis() {
    let mut space = space_with(SpaceSettings {
        merge_actor_policy: MergeActorPolicy::Only("00ff".into()),
        ..SpaceSettings::default()
    });
    let t = target("doc-1", "main");
    let mut alice = Session::new(b"alice");
    let mut bob = Session::new(b"bob");

    alice.put_int("a", 1);
    space.submit(submit_one(&t, Vec::new(), vec![alice.change()])).unwrap();

    bob.put_int("b", 2);
    let mut request = submit_one(&t, Vec::new(), vec![bob.change()]);
    request.writes[0].allow_server_merge = true;
    let resp = space.submit(request).unwrap();
    assert_eq!(resp.results[0].status, WriteStatus::Conflict);
    assert!(resp.results[0].reason.as_deref().unwrap().contains("not permitted"));
}

#[test]
fn unknown_dependency_is_a_conflict() {
    let mut space = space();
    let t = target("doc-1", "main");
    let mut alice = Session::new(b"alice");

    // Alice commits twice locally but only submits the second change; its
    // dependency is unknown to the branch.
    alice.put_int("a", 1);
    let _withheld = alice.change();
    alice.put_int("a", 2);
    let second = alice.change();

    let resp = space.submit(submit_one(&t, Vec::new(), vec![second])).unwrap();
    assert_eq!(resp.tx_id, 0);
    assert_eq!(resp.results[0].status, WriteStatus::Conflict);
    assert!(resp.results[0].reason.as_deref().unwrap().contains("missing dependency"));
}

#[test]
fn lazy_branches_read_empty_and_persist_on_create() {
    let mut space = space();
    let d = doc("doc-1");

    let state = space.branch_state(&d, "main").unwrap();
    assert_eq!(state.seq_no, 0);
    assert!(state.heads.is_empty());
    assert!(!state.closed);

    let created = space.get_or_create_branch(&d, "main").unwrap();
    assert_eq!(created, state);
    // Second call returns the persisted row.
    assert_eq!(space.get_or_create_branch(&d, "main").unwrap(), created);
}

#[test]
fn tx_chain_verifies_after_commits() {
    let mut space = space();
    let t = target("doc-1", "main");
    let mut session = Session::new(b"writer");

    let mut base = Vec::new();
    for i in 0..4 {
        session.put_int("n", i);
        let resp = space.submit(submit_one(&t, base, vec![session.change()])).unwrap();
        base = resp.results[0].new_heads.clone().unwrap();
    }
    assert_eq!(space.verify_tx_chain().unwrap(), 4);
    space.verify_branch(&doc("doc-1"), "main").unwrap();

    let last = space.transaction(4).unwrap().unwrap();
    let prev = space.transaction(3).unwrap().unwrap();
    assert_eq!(last.prev_tx_hash, prev.tx_hash);
}

#[test]
fn changes_are_indexed_by_seq_and_tx() {
    let mut space = space();
    let t = target("doc-1", "main");
    let mut session = Session::new(b"writer");

    session.put_int("a", 1);
    session.put_int("b", 2);
    let c1 = session.change();
    session.put_int("c", 3);
    let c2 = session.change();
    let resp = space.submit(submit_one(&t, Vec::new(), vec![c1, c2])).unwrap();
    assert_eq!(resp.results[0].applied, 2);

    let d = doc("doc-1");
    let first = space.find_change_by_seq(&d, "main", 1).unwrap().unwrap();
    let second = space.find_change_by_seq(&d, "main", 2).unwrap().unwrap();
    assert_eq!(second.deps, vec![first.change_hash.clone()]);
    assert_eq!(first.tx_id, resp.tx_id);
    assert!(second.lamport > first.lamport);
    assert_eq!(first.actor_id, second.actor_id);
    assert_eq!(first.actor_seq + 1, second.actor_seq);

    let by_tx = space.find_by_tx(&d, "main", resp.tx_id).unwrap();
    assert_eq!(by_tx.len(), 2);
    assert!(space.find_change_by_seq(&d, "main", 3).unwrap().is_none());

    // The raw bytes landed in the CAS under the indexed digest.
    let blob = space.cas_entry(&first.bytes_hash).unwrap().unwrap();
    assert_eq!(blob.digest, first.bytes_hash);
}
