use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default number of accepted changes between snapshots.
pub const DEFAULT_SNAPSHOT_CADENCE: u64 = 5;

/// Policy applied to the actor identity used for synthesized server-side
/// merge changes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy", content = "actor")]
pub enum MergeActorPolicy {
    /// Any actor may synthesize merges.
    #[default]
    Any,
    /// Only the named actor (hex) may synthesize merges; a mismatch turns
    /// the server-merge attempt into a per-write conflict.
    Only(String),
}

/// Per-space configuration. Persisted alongside the space data so a reopened
/// space keeps its behavior.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceSettings {
    /// Snapshot every `snapshot_cadence` accepted changes. Must be >= 1.
    pub snapshot_cadence: u64,
    /// When false, no snapshots are written and point-in-time reads replay
    /// the full change log from genesis.
    pub snapshots_enabled: bool,
    /// When false, `allow_server_merge` hints on writes are ignored and a
    /// stale causal base is always reported as a conflict.
    pub server_merge_enabled: bool,
    /// Actor id (hex) used when the space synthesizes merge changes.
    /// Defaults to an actor derived from the space id.
    pub merge_actor: Option<String>,
    pub merge_actor_policy: MergeActorPolicy,
}

impl Default for SpaceSettings {
    fn default() -> Self {
        Self {
            snapshot_cadence: DEFAULT_SNAPSHOT_CADENCE,
            snapshots_enabled: true,
            server_merge_enabled: true,
            merge_actor: None,
            merge_actor_policy: MergeActorPolicy::Any,
        }
    }
}

impl SpaceSettings {
    pub fn validate(&self) -> Result<()> {
        if self.snapshot_cadence == 0 {
            return Err(Error::InvalidRequest(
                "snapshot_cadence must be >= 1; disable snapshots via snapshots_enabled".into(),
            ));
        }
        if let Some(actor) = &self.merge_actor {
            if hex::decode(actor).is_err() || actor.is_empty() {
                return Err(Error::InvalidRequest(format!("merge_actor is not valid hex: {actor:?}")));
            }
        }
        if let MergeActorPolicy::Only(actor) = &self.merge_actor_policy {
            if hex::decode(actor).is_err() || actor.is_empty() {
                return Err(Error::InvalidRequest(format!(
                    "merge_actor_policy actor is not valid hex: {actor:?}"
                )));
            }
        }
        Ok(())
    }

    /// Whether a branch that just reached `seq_no` is due for a snapshot.
    pub fn snapshot_due(&self, seq_no: u64) -> bool {
        self.snapshots_enabled && seq_no > 0 && seq_no % self.snapshot_cadence == 0
    }
}
