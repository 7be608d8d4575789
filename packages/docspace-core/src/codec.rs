//! Boundary to the CRDT document engine (automerge). Everything the rest of
//! the crate needs is funneled through this module: change-header decoding,
//! batch application, head computation, native/JSON encoding, and synthesis
//! of empty merge changes. No other module names automerge types.

use automerge::transaction::CommitOptions;
use automerge::{ActorId, AutoCommit, AutoSerde, Automerge, Change};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Causal metadata decoded from one raw change, without applying it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeHeader {
    /// Hex hash identifying the change in the DAG.
    pub hash: String,
    /// Hex hashes of the causal parents.
    pub deps: Vec<String>,
    /// Hex id of the authoring actor.
    pub actor_id: String,
    /// Per-actor sequence number.
    pub actor_seq: u64,
    /// Logical ordering value (the change's starting operation counter).
    pub start_op: u64,
}

/// Decode the header of a single raw change.
pub fn decode_header(bytes: &[u8]) -> Result<ChangeHeader> {
    let change = parse_change(bytes)?;
    Ok(ChangeHeader {
        hash: change.hash().to_string(),
        deps: change.deps().iter().map(|d| d.to_string()).collect(),
        actor_id: change.actor_id().to_hex_string(),
        actor_seq: change.seq(),
        start_op: change.start_op().get(),
    })
}

fn parse_change(bytes: &[u8]) -> Result<Change> {
    Change::from_bytes(bytes.to_vec()).map_err(|e| Error::InvalidChange(e.to_string()))
}

/// A loaded document. Documents carry their full change history, so a saved
/// snapshot is a complete replay base for anything that comes after it.
pub struct Doc(Automerge);

impl Doc {
    /// Empty genesis document.
    pub fn empty() -> Self {
        Self(Automerge::new())
    }

    pub fn load(bytes: &[u8]) -> Result<Self> {
        Automerge::load(bytes).map(Self).map_err(|e| Error::Codec(e.to_string()))
    }

    /// Apply one raw change. Fails if the change is malformed or its
    /// dependencies are not present in the document's history.
    pub fn apply_change(&mut self, bytes: &[u8]) -> Result<()> {
        let change = parse_change(bytes)?;
        self.0
            .apply_changes([change])
            .map_err(|e| Error::InvalidChange(e.to_string()))
    }

    /// Sorted hex hashes of the document's causal frontier.
    pub fn heads(&self) -> Vec<String> {
        let mut heads: Vec<String> = self.0.get_heads().iter().map(|h| h.to_string()).collect();
        heads.sort_unstable();
        heads
    }

    /// Canonical native byte encoding. Deterministic for a given history.
    pub fn save(&self) -> Vec<u8> {
        self.0.save()
    }

    /// Decoded JSON view of the current state.
    pub fn to_json(&self) -> Result<Value> {
        serde_json::to_value(AutoSerde::from(&self.0)).map_err(|e| Error::Codec(e.to_string()))
    }

    /// Synthesize a zero-payload merge change depending on all current
    /// heads, authored by `actor`. Returns the change's hash and raw bytes;
    /// the document itself is not modified.
    pub fn merge_marker(&self, actor: &[u8], message: &str) -> Result<(String, Vec<u8>)> {
        let mut doc =
            AutoCommit::load(&self.0.save()).map_err(|e| Error::Codec(e.to_string()))?;
        doc.set_actor(ActorId::from(actor));
        let options = CommitOptions::default().with_message(message.to_owned()).with_time(0);
        let hash = doc.empty_change(options);
        let bytes = doc.save_incremental();
        Ok((hash.to_string(), bytes))
    }
}

/// Project a decoded JSON view down to the requested `/`-separated paths.
/// Map keys and array indices are both addressed by segment; array hits are
/// re-keyed by their index. Paths that resolve to nothing are dropped.
pub fn project_paths(value: &Value, paths: &[String]) -> Value {
    let mut out = Map::new();
    for path in paths {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return value.clone();
        }
        if let Some(found) = lookup(value, &segments) {
            insert_at(&mut out, &segments, found.clone());
        }
    }
    Value::Object(out)
}

fn lookup<'a>(value: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(*segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn insert_at(out: &mut Map<String, Value>, segments: &[&str], found: Value) {
    let mut current = out;
    for segment in &segments[..segments.len() - 1] {
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        match slot.as_object_mut() {
            Some(map) => current = map,
            // A shorter path already claimed this slot with a leaf; the
            // longer path loses.
            None => return,
        }
    }
    current.insert(segments[segments.len() - 1].to_string(), found);
}

#[cfg(test)]
mod tests {
    use super::*;
    use automerge::transaction::Transactable;
    use automerge::ROOT;
    use serde_json::json;

    fn change_bytes(doc: &mut AutoCommit) -> Vec<u8> {
        doc.commit();
        doc.save_incremental()
    }

    #[test]
    fn header_decodes_hash_deps_actor_seq() {
        let mut doc = AutoCommit::new();
        doc.set_actor(ActorId::from(b"actor-one".as_slice()));
        doc.put(ROOT, "a", 1u64).unwrap();
        let first = change_bytes(&mut doc);
        doc.put(ROOT, "b", 2u64).unwrap();
        let second = change_bytes(&mut doc);

        let h1 = decode_header(&first).unwrap();
        let h2 = decode_header(&second).unwrap();
        assert!(h1.deps.is_empty());
        assert_eq!(h2.deps, vec![h1.hash.clone()]);
        assert_eq!(h1.actor_id, h2.actor_id);
        assert_eq!(h1.actor_seq, 1);
        assert_eq!(h2.actor_seq, 2);
        assert!(h2.start_op > h1.start_op);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_header(b"not a change").is_err());
    }

    #[test]
    fn apply_and_heads_follow_the_dag() {
        let mut author = AutoCommit::new();
        author.put(ROOT, "k", "v").unwrap();
        let bytes = change_bytes(&mut author);
        let header = decode_header(&bytes).unwrap();

        let mut doc = Doc::empty();
        assert!(doc.heads().is_empty());
        doc.apply_change(&bytes).unwrap();
        assert_eq!(doc.heads(), vec![header.hash]);
        assert_eq!(doc.to_json().unwrap(), json!({"k": "v"}));
    }

    #[test]
    fn apply_without_deps_present_fails() {
        let mut author = AutoCommit::new();
        author.put(ROOT, "a", 1u64).unwrap();
        let _first = change_bytes(&mut author);
        author.put(ROOT, "b", 2u64).unwrap();
        let second = change_bytes(&mut author);

        let mut doc = Doc::empty();
        assert!(doc.apply_change(&second).is_err());
    }

    #[test]
    fn merge_marker_covers_all_heads() {
        let mut a = AutoCommit::new();
        a.set_actor(ActorId::from(b"aa".as_slice()));
        a.put(ROOT, "x", 1u64).unwrap();
        let base = change_bytes(&mut a);

        let mut b = AutoCommit::load(&a.save()).unwrap();
        b.set_actor(ActorId::from(b"bb".as_slice()));
        a.put(ROOT, "y", 2u64).unwrap();
        b.put(ROOT, "z", 3u64).unwrap();
        let left = change_bytes(&mut a);
        let right = change_bytes(&mut b);

        let mut doc = Doc::empty();
        doc.apply_change(&base).unwrap();
        doc.apply_change(&left).unwrap();
        doc.apply_change(&right).unwrap();
        assert_eq!(doc.heads().len(), 2);

        let (hash, bytes) = doc.merge_marker(b"server", "merge").unwrap();
        let header = decode_header(&bytes).unwrap();
        assert_eq!(header.hash, hash);
        assert_eq!(header.deps, doc.heads());

        doc.apply_change(&bytes).unwrap();
        assert_eq!(doc.heads(), vec![hash]);
    }

    #[test]
    fn save_load_round_trip_preserves_heads() {
        let mut author = AutoCommit::new();
        author.put(ROOT, "k", "v").unwrap();
        let bytes = change_bytes(&mut author);

        let mut doc = Doc::empty();
        doc.apply_change(&bytes).unwrap();
        let reloaded = Doc::load(&doc.save()).unwrap();
        assert_eq!(doc.heads(), reloaded.heads());
        assert_eq!(doc.save(), reloaded.save());
    }

    #[test]
    fn projection_selects_nested_paths() {
        let value = json!({
            "profile": {"name": "ada", "email": "a@b"},
            "items": [{"id": 1}, {"id": 2}],
            "count": 3
        });
        let projected = project_paths(
            &value,
            &["profile/name".into(), "items/1/id".into(), "missing/path".into()],
        );
        assert_eq!(
            projected,
            json!({"profile": {"name": "ada"}, "items": {"1": {"id": 2}}})
        );
    }

    #[test]
    fn empty_path_list_projects_nothing() {
        let value = json!({"a": 1});
        assert_eq!(project_paths(&value, &[]), json!({}));
    }
}
