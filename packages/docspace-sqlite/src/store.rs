use rusqlite::{params, Connection, OptionalExtension, Row};

use docspace_core::{
    BranchState, CasEntry, CasKind, ChangeEntry, CommitBatch, DocId, Error, JsonCacheEntry,
    SnapshotEntry, SpaceSettings, SpaceStore, TxRecord,
};

/// SQLite-backed `SpaceStore`. One database file holds one space: its
/// branches, change ledger, CAS blobs, snapshot index, transaction log,
/// JSON cache, and settings. Commit batches apply inside one SQLite
/// transaction, which also provides the per-space write serialization the
/// pipeline expects.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn new_in_memory() -> docspace_core::Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::Storage(e.to_string()))?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn new(path: &str) -> docspace_core::Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::Storage(e.to_string()))?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> docspace_core::Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS branches (
                    branch_id TEXT PRIMARY KEY,
                    doc_id TEXT NOT NULL,
                    name TEXT NOT NULL,
                    heads TEXT NOT NULL,
                    seq_no INTEGER NOT NULL,
                    epoch INTEGER NOT NULL,
                    root_hash TEXT NOT NULL,
                    closed INTEGER NOT NULL DEFAULT 0,
                    merged_into TEXT,
                    UNIQUE (doc_id, name)
                );
                CREATE TABLE IF NOT EXISTS changes (
                    branch_id TEXT NOT NULL,
                    seq_no INTEGER NOT NULL,
                    doc_id TEXT NOT NULL,
                    change_hash TEXT NOT NULL,
                    bytes_hash TEXT NOT NULL,
                    deps TEXT NOT NULL,
                    lamport INTEGER NOT NULL,
                    actor_id TEXT NOT NULL,
                    actor_seq INTEGER NOT NULL,
                    tx_id INTEGER NOT NULL,
                    committed_at INTEGER NOT NULL,
                    PRIMARY KEY (branch_id, seq_no)
                );
                CREATE INDEX IF NOT EXISTS idx_changes_hash ON changes(branch_id, change_hash);
                CREATE INDEX IF NOT EXISTS idx_changes_tx ON changes(branch_id, tx_id);
                CREATE TABLE IF NOT EXISTS cas (
                    digest TEXT PRIMARY KEY,
                    kind TEXT NOT NULL,
                    bytes BLOB NOT NULL,
                    meta TEXT
                );
                CREATE TABLE IF NOT EXISTS snapshots (
                    branch_id TEXT NOT NULL,
                    seq_no INTEGER NOT NULL,
                    doc_id TEXT NOT NULL,
                    tx_id INTEGER NOT NULL,
                    digest TEXT NOT NULL,
                    PRIMARY KEY (branch_id, seq_no)
                );
                CREATE TABLE IF NOT EXISTS tx_log (
                    tx_id INTEGER PRIMARY KEY,
                    prev_tx_hash TEXT NOT NULL,
                    body_hash TEXT NOT NULL,
                    tx_hash TEXT NOT NULL,
                    signatures TEXT NOT NULL,
                    client_tx_id TEXT,
                    committed_at INTEGER NOT NULL,
                    response TEXT NOT NULL
                );
                CREATE UNIQUE INDEX IF NOT EXISTS idx_tx_client
                    ON tx_log(client_tx_id) WHERE client_tx_id IS NOT NULL;
                CREATE TABLE IF NOT EXISTS json_cache (
                    branch_id TEXT PRIMARY KEY,
                    doc_id TEXT NOT NULL,
                    seq_no INTEGER NOT NULL,
                    json TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS settings (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );",
            )
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(())
    }
}

fn json_column<T: serde::Serialize>(value: &T) -> docspace_core::Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Storage(e.to_string()))
}

fn from_json_column<T: serde::de::DeserializeOwned>(text: &str) -> docspace_core::Result<T> {
    serde_json::from_str(text).map_err(|e| Error::Storage(e.to_string()))
}

fn seq_to_i64(seq: u64) -> docspace_core::Result<i64> {
    i64::try_from(seq).map_err(|_| Error::Storage("sequence overflow".into()))
}

fn row_to_branch(row: &Row<'_>) -> rusqlite::Result<(String, String, String, String, i64, i64, String, bool, Option<String>)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn branch_from_parts(
    parts: (String, String, String, String, i64, i64, String, bool, Option<String>),
) -> docspace_core::Result<BranchState> {
    let (branch_id, doc_id, name, heads, seq_no, epoch, root_hash, closed, merged_into) = parts;
    Ok(BranchState {
        branch_id,
        doc_id: DocId::new(doc_id)?,
        name,
        heads: from_json_column(&heads)?,
        seq_no: seq_no as u64,
        epoch: epoch as u64,
        root_hash,
        closed,
        merged_into,
    })
}

fn row_to_change(row: &Row<'_>) -> rusqlite::Result<(String, i64, String, String, String, String, i64, String, i64, i64, i64)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
    ))
}

fn change_from_parts(
    parts: (String, i64, String, String, String, String, i64, String, i64, i64, i64),
) -> docspace_core::Result<ChangeEntry> {
    let (branch_id, seq_no, doc_id, change_hash, bytes_hash, deps, lamport, actor_id, actor_seq, tx_id, committed_at) =
        parts;
    Ok(ChangeEntry {
        doc_id: DocId::new(doc_id)?,
        branch_id,
        seq_no: seq_no as u64,
        change_hash,
        bytes_hash,
        deps: from_json_column(&deps)?,
        lamport: lamport as u64,
        actor_id,
        actor_seq: actor_seq as u64,
        tx_id: tx_id as u64,
        committed_at,
    })
}

const CHANGE_COLUMNS: &str =
    "branch_id, seq_no, doc_id, change_hash, bytes_hash, deps, lamport, actor_id, actor_seq, tx_id, committed_at";

fn row_to_tx(row: &Row<'_>) -> rusqlite::Result<(i64, String, String, String, String, Option<String>, i64, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn tx_from_parts(
    parts: (i64, String, String, String, String, Option<String>, i64, String),
) -> docspace_core::Result<TxRecord> {
    let (tx_id, prev_tx_hash, body_hash, tx_hash, signatures, client_tx_id, committed_at, response) = parts;
    Ok(TxRecord {
        tx_id: tx_id as u64,
        prev_tx_hash,
        body_hash,
        tx_hash,
        signatures: from_json_column(&signatures)?,
        client_tx_id,
        committed_at,
        response,
    })
}

const TX_COLUMNS: &str =
    "tx_id, prev_tx_hash, body_hash, tx_hash, signatures, client_tx_id, committed_at, response";

impl SpaceStore for SqliteStore {
    fn branch(&self, doc: &DocId, name: &str) -> docspace_core::Result<Option<BranchState>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT branch_id, doc_id, name, heads, seq_no, epoch, root_hash, closed, merged_into
                 FROM branches WHERE doc_id = ?1 AND name = ?2",
            )
            .map_err(|e| Error::Storage(e.to_string()))?;
        let parts = stmt
            .query_row(params![doc.as_str(), name], row_to_branch)
            .optional()
            .map_err(|e| Error::Storage(e.to_string()))?;
        parts.map(branch_from_parts).transpose()
    }

    fn put_branch(&mut self, branch: &BranchState) -> docspace_core::Result<()> {
        upsert_branch(&self.conn, branch)
    }

    fn changes_in_range(
        &self,
        branch_id: &str,
        after: u64,
        upto: u64,
    ) -> docspace_core::Result<Vec<ChangeEntry>> {
        if upto <= after {
            return Ok(Vec::new());
        }
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {CHANGE_COLUMNS} FROM changes
                 WHERE branch_id = ?1 AND seq_no > ?2 AND seq_no <= ?3
                 ORDER BY seq_no ASC"
            ))
            .map_err(|e| Error::Storage(e.to_string()))?;
        let rows = stmt
            .query_map(params![branch_id, seq_to_i64(after)?, seq_to_i64(upto)?], row_to_change)
            .map_err(|e| Error::Storage(e.to_string()))?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(change_from_parts(row.map_err(|e| Error::Storage(e.to_string()))?)?);
        }
        Ok(entries)
    }

    fn change_by_seq(&self, branch_id: &str, seq_no: u64) -> docspace_core::Result<Option<ChangeEntry>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {CHANGE_COLUMNS} FROM changes WHERE branch_id = ?1 AND seq_no = ?2"
            ))
            .map_err(|e| Error::Storage(e.to_string()))?;
        let parts = stmt
            .query_row(params![branch_id, seq_to_i64(seq_no)?], row_to_change)
            .optional()
            .map_err(|e| Error::Storage(e.to_string()))?;
        parts.map(change_from_parts).transpose()
    }

    fn changes_by_tx(&self, branch_id: &str, tx_id: u64) -> docspace_core::Result<Vec<ChangeEntry>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {CHANGE_COLUMNS} FROM changes
                 WHERE branch_id = ?1 AND tx_id = ?2 ORDER BY seq_no ASC"
            ))
            .map_err(|e| Error::Storage(e.to_string()))?;
        let rows = stmt
            .query_map(params![branch_id, seq_to_i64(tx_id)?], row_to_change)
            .map_err(|e| Error::Storage(e.to_string()))?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(change_from_parts(row.map_err(|e| Error::Storage(e.to_string()))?)?);
        }
        Ok(entries)
    }

    fn has_change(&self, branch_id: &str, change_hash: &str) -> docspace_core::Result<bool> {
        let mut stmt = self
            .conn
            .prepare("SELECT 1 FROM changes WHERE branch_id = ?1 AND change_hash = ?2 LIMIT 1")
            .map_err(|e| Error::Storage(e.to_string()))?;
        let found = stmt
            .query_row(params![branch_id, change_hash], |_| Ok(()))
            .optional()
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(found.is_some())
    }

    fn seq_at_tx(&self, branch_id: &str, tx_id: u64) -> docspace_core::Result<Option<u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT MAX(seq_no) FROM changes WHERE branch_id = ?1 AND tx_id <= ?2")
            .map_err(|e| Error::Storage(e.to_string()))?;
        let max: Option<i64> = stmt
            .query_row(params![branch_id, seq_to_i64(tx_id)?], |row| row.get(0))
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(max.map(|v| v as u64))
    }

    fn cas_get(&self, digest: &str) -> docspace_core::Result<Option<CasEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT kind, bytes, meta FROM cas WHERE digest = ?1")
            .map_err(|e| Error::Storage(e.to_string()))?;
        let parts: Option<(String, Vec<u8>, Option<String>)> = stmt
            .query_row(params![digest], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .optional()
            .map_err(|e| Error::Storage(e.to_string()))?;
        let Some((kind, bytes, meta)) = parts else {
            return Ok(None);
        };
        Ok(Some(CasEntry {
            kind: CasKind::parse(&kind)?,
            digest: digest.to_string(),
            bytes,
            meta: meta.as_deref().map(from_json_column).transpose()?,
        }))
    }

    fn cas_has(&self, digest: &str) -> docspace_core::Result<bool> {
        let mut stmt = self
            .conn
            .prepare("SELECT 1 FROM cas WHERE digest = ?1")
            .map_err(|e| Error::Storage(e.to_string()))?;
        let found = stmt
            .query_row(params![digest], |_| Ok(()))
            .optional()
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(found.is_some())
    }

    fn snapshot_at_or_before(
        &self,
        branch_id: &str,
        seq_no: u64,
    ) -> docspace_core::Result<Option<SnapshotEntry>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT branch_id, seq_no, doc_id, tx_id, digest FROM snapshots
                 WHERE branch_id = ?1 AND seq_no <= ?2
                 ORDER BY seq_no DESC LIMIT 1",
            )
            .map_err(|e| Error::Storage(e.to_string()))?;
        let parts: Option<(String, i64, String, i64, String)> = stmt
            .query_row(params![branch_id, seq_to_i64(seq_no)?], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })
            .optional()
            .map_err(|e| Error::Storage(e.to_string()))?;
        let Some((branch_id, seq_no, doc_id, tx_id, digest)) = parts else {
            return Ok(None);
        };
        Ok(Some(SnapshotEntry {
            doc_id: DocId::new(doc_id)?,
            branch_id,
            seq_no: seq_no as u64,
            tx_id: tx_id as u64,
            digest,
        }))
    }

    fn json_cache(&self, branch_id: &str) -> docspace_core::Result<Option<JsonCacheEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT doc_id, seq_no, json FROM json_cache WHERE branch_id = ?1")
            .map_err(|e| Error::Storage(e.to_string()))?;
        let parts: Option<(String, i64, String)> = stmt
            .query_row(params![branch_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .optional()
            .map_err(|e| Error::Storage(e.to_string()))?;
        let Some((doc_id, seq_no, json)) = parts else {
            return Ok(None);
        };
        Ok(Some(JsonCacheEntry {
            doc_id: DocId::new(doc_id)?,
            branch_id: branch_id.to_string(),
            seq_no: seq_no as u64,
            json,
        }))
    }

    fn tx(&self, tx_id: u64) -> docspace_core::Result<Option<TxRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {TX_COLUMNS} FROM tx_log WHERE tx_id = ?1"))
            .map_err(|e| Error::Storage(e.to_string()))?;
        let parts = stmt
            .query_row(params![seq_to_i64(tx_id)?], row_to_tx)
            .optional()
            .map_err(|e| Error::Storage(e.to_string()))?;
        parts.map(tx_from_parts).transpose()
    }

    fn tx_by_client_id(&self, client_tx_id: &str) -> docspace_core::Result<Option<TxRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {TX_COLUMNS} FROM tx_log WHERE client_tx_id = ?1"))
            .map_err(|e| Error::Storage(e.to_string()))?;
        let parts = stmt
            .query_row(params![client_tx_id], row_to_tx)
            .optional()
            .map_err(|e| Error::Storage(e.to_string()))?;
        parts.map(tx_from_parts).transpose()
    }

    fn last_tx(&self) -> docspace_core::Result<Option<TxRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {TX_COLUMNS} FROM tx_log ORDER BY tx_id DESC LIMIT 1"))
            .map_err(|e| Error::Storage(e.to_string()))?;
        let parts = stmt
            .query_row([], row_to_tx)
            .optional()
            .map_err(|e| Error::Storage(e.to_string()))?;
        parts.map(tx_from_parts).transpose()
    }

    fn load_settings(&self) -> docspace_core::Result<Option<SpaceSettings>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM settings WHERE key = 'space'")
            .map_err(|e| Error::Storage(e.to_string()))?;
        let value: Option<String> = stmt
            .query_row([], |row| row.get(0))
            .optional()
            .map_err(|e| Error::Storage(e.to_string()))?;
        value.as_deref().map(from_json_column).transpose()
    }

    fn save_settings(&mut self, settings: &SpaceSettings) -> docspace_core::Result<()> {
        self.conn
            .execute(
                "INSERT INTO settings (key, value) VALUES ('space', ?1)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![json_column(settings)?],
            )
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(())
    }

    fn commit(&mut self, batch: CommitBatch) -> docspace_core::Result<()> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| Error::Storage(e.to_string()))?;

        if let Some(record) = &batch.tx {
            tx.execute(
                &format!(
                    "INSERT INTO tx_log ({TX_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                ),
                params![
                    seq_to_i64(record.tx_id)?,
                    record.prev_tx_hash,
                    record.body_hash,
                    record.tx_hash,
                    json_column(&record.signatures)?,
                    record.client_tx_id,
                    record.committed_at,
                    record.response,
                ],
            )
            .map_err(|e| Error::Storage(e.to_string()))?;
        }

        for branch in &batch.branches {
            upsert_branch(&tx, branch)?;
        }

        for entry in &batch.changes {
            tx.execute(
                &format!(
                    "INSERT INTO changes ({CHANGE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    entry.branch_id,
                    seq_to_i64(entry.seq_no)?,
                    entry.doc_id.as_str(),
                    entry.change_hash,
                    entry.bytes_hash,
                    json_column(&entry.deps)?,
                    seq_to_i64(entry.lamport)?,
                    entry.actor_id,
                    seq_to_i64(entry.actor_seq)?,
                    seq_to_i64(entry.tx_id)?,
                    entry.committed_at,
                ],
            )
            .map_err(|e| Error::Storage(e.to_string()))?;
        }

        for entry in &batch.cas {
            tx.execute(
                "INSERT OR IGNORE INTO cas (digest, kind, bytes, meta) VALUES (?1, ?2, ?3, ?4)",
                params![
                    entry.digest,
                    entry.kind.as_str(),
                    entry.bytes,
                    entry.meta.as_ref().map(json_column).transpose()?,
                ],
            )
            .map_err(|e| Error::Storage(e.to_string()))?;
        }

        for snapshot in &batch.snapshots {
            tx.execute(
                "INSERT OR REPLACE INTO snapshots (branch_id, seq_no, doc_id, tx_id, digest)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    snapshot.branch_id,
                    seq_to_i64(snapshot.seq_no)?,
                    snapshot.doc_id.as_str(),
                    seq_to_i64(snapshot.tx_id)?,
                    snapshot.digest,
                ],
            )
            .map_err(|e| Error::Storage(e.to_string()))?;
        }

        for cache in &batch.json_cache {
            tx.execute(
                "INSERT INTO json_cache (branch_id, doc_id, seq_no, json)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(branch_id) DO UPDATE SET
                    doc_id = excluded.doc_id,
                    seq_no = excluded.seq_no,
                    json = excluded.json",
                params![
                    cache.branch_id,
                    cache.doc_id.as_str(),
                    seq_to_i64(cache.seq_no)?,
                    cache.json,
                ],
            )
            .map_err(|e| Error::Storage(e.to_string()))?;
        }

        tx.commit().map_err(|e| Error::Storage(e.to_string()))
    }
}

fn upsert_branch(conn: &Connection, branch: &BranchState) -> docspace_core::Result<()> {
    conn.execute(
        "INSERT INTO branches (branch_id, doc_id, name, heads, seq_no, epoch, root_hash, closed, merged_into)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(branch_id) DO UPDATE SET
            heads = excluded.heads,
            seq_no = excluded.seq_no,
            epoch = excluded.epoch,
            root_hash = excluded.root_hash,
            closed = excluded.closed,
            merged_into = excluded.merged_into",
        params![
            branch.branch_id,
            branch.doc_id.as_str(),
            branch.name,
            json_column(&branch.heads)?,
            seq_to_i64(branch.seq_no)?,
            seq_to_i64(branch.epoch)?,
            branch.root_hash,
            branch.closed,
            branch.merged_into,
        ],
    )
    .map_err(|e| Error::Storage(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docspace_core::{BranchRef, MergeActorPolicy};

    #[test]
    fn branch_upsert_round_trips() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let doc = DocId::new("doc").unwrap();
        let target = BranchRef::new(doc.clone(), "main").unwrap();
        let mut branch = BranchState::new(&target).unwrap();
        store.put_branch(&branch).unwrap();

        branch.accept(&[], "h1").unwrap();
        branch.epoch = 7;
        branch.closed = true;
        branch.merged_into = Some("other".into());
        store.put_branch(&branch).unwrap();

        let loaded = store.branch(&doc, "main").unwrap().unwrap();
        assert_eq!(loaded, branch);
        assert!(store.branch(&doc, "absent").unwrap().is_none());
    }

    #[test]
    fn settings_round_trip() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        assert!(store.load_settings().unwrap().is_none());

        let settings = SpaceSettings {
            snapshot_cadence: 9,
            snapshots_enabled: false,
            server_merge_enabled: false,
            merge_actor: Some("ab".into()),
            merge_actor_policy: MergeActorPolicy::Only("ab".into()),
        };
        store.save_settings(&settings).unwrap();
        assert_eq!(store.load_settings().unwrap().unwrap(), settings);

        let updated = SpaceSettings::default();
        store.save_settings(&updated).unwrap();
        assert_eq!(store.load_settings().unwrap().unwrap(), updated);
    }

    #[test]
    fn commit_rolls_back_on_duplicate_seq() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let entry = ChangeEntry {
            doc_id: DocId::new("doc").unwrap(),
            branch_id: "b1".into(),
            seq_no: 1,
            change_hash: "h1".into(),
            bytes_hash: "y1".into(),
            deps: Vec::new(),
            lamport: 1,
            actor_id: "actor".into(),
            actor_seq: 1,
            tx_id: 1,
            committed_at: 0,
        };
        store
            .commit(CommitBatch {
                changes: vec![entry.clone()],
                ..CommitBatch::default()
            })
            .unwrap();

        // Same (branch, seq) again plus a cas blob: the whole batch must fail
        // and the blob must not appear.
        let blob = CasEntry::new(CasKind::Blob, b"x".to_vec(), None);
        let digest = blob.digest.clone();
        let result = store.commit(CommitBatch {
            changes: vec![entry],
            cas: vec![blob],
            ..CommitBatch::default()
        });
        assert!(result.is_err());
        assert!(!store.cas_has(&digest).unwrap());
    }
}
