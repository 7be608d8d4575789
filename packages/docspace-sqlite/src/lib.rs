#![forbid(unsafe_code)]
//! SQLite persistence for docspace. One database file per space; the
//! engine's commit batches map onto single SQLite transactions, so a space
//! gets durable atomicity and write serialization from the database itself.

mod store;
pub use store::SqliteStore;

use docspace_core::{Result, Space, SpaceId};

/// Open (or create) the space stored at `path`.
pub fn open_space(id: SpaceId, path: &str) -> Result<Space<SqliteStore>> {
    Space::open(id, SqliteStore::new(path)?)
}

/// Open a throwaway in-memory space, mostly for tests and prototyping.
pub fn open_in_memory(id: SpaceId) -> Result<Space<SqliteStore>> {
    Space::open(id, SqliteStore::new_in_memory()?)
}
