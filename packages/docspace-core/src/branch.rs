use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::hash;
use crate::ids::{BranchRef, DocId};

/// Authoritative state of one branch: the causal frontier (`heads`), the
/// count of changes ever accepted (`seq_no`), and the transaction that
/// produced the current heads (`epoch`).
///
/// `root_hash` is recomputed from the sorted heads on every update. It is
/// stored redundantly for integrity verification and never treated as
/// authoritative over `heads` itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchState {
    pub branch_id: String,
    pub doc_id: DocId,
    pub name: String,
    /// Sorted hex change hashes with no recorded descendants.
    pub heads: Vec<String>,
    pub seq_no: u64,
    pub epoch: u64,
    pub root_hash: String,
    pub closed: bool,
    pub merged_into: Option<String>,
}

impl BranchState {
    /// Empty-initialized state for a branch that has accepted nothing yet.
    pub fn new(target: &BranchRef) -> Result<Self> {
        Ok(Self {
            branch_id: target.branch_id(),
            doc_id: target.doc.clone(),
            name: target.branch.clone(),
            heads: Vec::new(),
            seq_no: 0,
            epoch: 0,
            root_hash: hash::root_hash(&[])?,
            closed: false,
            merged_into: None,
        })
    }

    pub fn target(&self) -> BranchRef {
        BranchRef {
            doc: self.doc_id.clone(),
            branch: self.name.clone(),
        }
    }

    /// Whether a caller-supplied causal base matches the current frontier.
    /// Both sides compare as sorted sets.
    pub fn base_matches(&self, base_heads: &[String]) -> bool {
        let mut base = base_heads.to_vec();
        base.sort_unstable();
        base.dedup();
        base == self.heads
    }

    /// Accept one change onto the branch: every head named in `deps` is
    /// superseded and removed, the new hash becomes a head, heads re-sort,
    /// `seq_no` increments, and `root_hash` is recomputed.
    pub fn accept(&mut self, deps: &[String], change_hash: &str) -> Result<()> {
        self.heads.retain(|h| !deps.iter().any(|d| d == h));
        if !self.heads.iter().any(|h| h == change_hash) {
            self.heads.push(change_hash.to_string());
        }
        self.heads.sort_unstable();
        self.seq_no += 1;
        self.root_hash = hash::root_hash(&self.heads)?;
        Ok(())
    }

    /// Recompute the integrity digest from the current heads and compare it
    /// with the stored one.
    pub fn verify_root_hash(&self) -> Result<bool> {
        Ok(self.root_hash == hash::root_hash(&self.heads)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn branch() -> BranchState {
        let doc = DocId::new("doc").unwrap();
        BranchState::new(&BranchRef::new(doc, "main").unwrap()).unwrap()
    }

    #[test]
    fn fresh_branch_is_empty() {
        let b = branch();
        assert!(b.heads.is_empty());
        assert_eq!(b.seq_no, 0);
        assert_eq!(b.epoch, 0);
        assert!(b.verify_root_hash().unwrap());
    }

    #[test]
    fn chain_keeps_a_single_head() {
        let mut b = branch();
        b.accept(&[], "h1").unwrap();
        assert_eq!(b.heads, vec!["h1"]);
        b.accept(&["h1".into()], "h2").unwrap();
        assert_eq!(b.heads, vec!["h2"]);
        assert_eq!(b.seq_no, 2);
    }

    #[test]
    fn concurrent_changes_fork_then_collapse() {
        let mut b = branch();
        b.accept(&[], "h1").unwrap();
        // A change rooted in history but not at the tip forks the frontier.
        b.accept(&[], "h2").unwrap();
        assert_eq!(b.heads, vec!["h1", "h2"]);
        // A change covering both heads collapses the branch.
        b.accept(&["h1".into(), "h2".into()], "h3").unwrap();
        assert_eq!(b.heads, vec!["h3"]);
        assert_eq!(b.seq_no, 3);
    }

    #[test]
    fn base_match_ignores_supplied_order() {
        let mut b = branch();
        b.accept(&[], "h2").unwrap();
        b.accept(&[], "h1").unwrap();
        assert!(b.base_matches(&["h2".into(), "h1".into()]));
        assert!(!b.base_matches(&["h1".into()]));
        assert!(!b.base_matches(&[]));
    }

    proptest! {
        #[test]
        fn seq_no_counts_accepted_changes(hashes in proptest::collection::vec("[a-f0-9]{8}", 1..20)) {
            let mut b = branch();
            let mut expected = 0u64;
            for h in &hashes {
                b.accept(&[], h).unwrap();
                expected += 1;
                prop_assert_eq!(b.seq_no, expected);
                prop_assert!(b.verify_root_hash().unwrap());
                let mut sorted = b.heads.clone();
                sorted.sort_unstable();
                prop_assert_eq!(&b.heads, &sorted);
            }
        }
    }
}
