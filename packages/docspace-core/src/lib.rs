#![forbid(unsafe_code)]
//! Core primitives for a per-identity document storage engine: mergeable
//! CRDT documents on named branches, a content-addressable store for changes
//! and snapshots, atomic multi-document transactions with conflict
//! detection, and point-in-time reads. Storage is pluggable behind
//! [`SpaceStore`] so the engine can sit on SQLite, memory, or any host that
//! can apply a commit batch atomically.

pub mod branch;
pub mod cas;
pub mod codec;
pub mod error;
pub mod hash;
pub mod ids;
pub mod invariants;
pub mod merge;
pub mod pit;
pub mod record;
pub mod settings;
pub mod space;
pub mod store;
pub mod tx;

pub use branch::BranchState;
pub use cas::{CasEntry, CasKind};
pub use codec::{ChangeHeader, Doc};
pub use error::{Error, Result};
pub use ids::{BranchRef, DocId, SpaceId};
pub use invariants::{InvariantInput, InvariantRegistry};
pub use pit::{Accept, ReadOptions};
pub use record::{ChangeEntry, JsonCacheEntry, SnapshotEntry, TxRecord};
pub use settings::{MergeActorPolicy, SpaceSettings, DEFAULT_SNAPSHOT_CADENCE};
pub use space::Space;
pub use store::{CommitBatch, MemoryStore, SpaceStore};
pub use tx::{
    ChangePayload, ConflictInfo, MergeSource, ReadCheck, TxRequest, TxResponse, WriteOp,
    WriteResult, WriteStatus,
};
