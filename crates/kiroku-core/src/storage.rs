use std::collections::HashMap;
use std::path::Path;

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::{debug, warn};

use crate::error::KirokuError;
use crate::models::Show;
use crate::record::{ShowRecord, ValidationError};

const SCHEMA_V1: &str = include_str!("../../../migrations/001_initial.sql");

/// SQLite-backed store of show records, keyed by show identity with a
/// unique index on display rank.
pub struct Storage {
    conn: Connection,
}

/// Index a full load can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    /// Display rank (`order`), the unique secondary index.
    Order,
    /// Primary key.
    Key,
}

impl Index {
    fn column(self) -> &'static str {
        match self {
            Self::Order => "ord",
            Self::Key => "key",
        }
    }
}

/// One operation inside a [`Storage::transaction`].
#[derive(Debug, Clone)]
pub enum StoreOp {
    Put { key: String, record: ShowRecord },
    Delete { key: String },
    Get { key: String },
    /// Move a row below every rank in use so it no longer holds a display slot.
    Park { key: String },
}

impl StoreOp {
    pub fn put(show: &Show) -> Self {
        Self::Put {
            key: show.key(),
            record: show.to_record(),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Put { key, .. } | Self::Delete { key } | Self::Get { key } | Self::Park { key } => {
                key
            }
        }
    }
}

/// Successful result of a single [`StoreOp`].
#[derive(Debug, Clone, PartialEq)]
pub enum OpValue {
    Stored,
    Deleted(bool),
    Found(Option<ShowRecord>),
    Parked(bool),
}

/// Per-operation result of a transaction.
#[derive(Debug)]
pub struct OpOutcome {
    pub key: String,
    pub result: Result<OpValue, KirokuError>,
}

/// A row from a full load: its key, the rank column, and the show rebuilt
/// from it.
#[derive(Debug)]
pub struct StoredShow {
    pub key: String,
    /// Negative while the row is parked.
    pub rank: i64,
    pub show: Result<Show, ValidationError>,
}

impl Storage {
    /// Open (or create) the database at the given path and run migrations.
    ///
    /// Safe to call repeatedly on the same file.
    pub fn open(path: &Path) -> Result<Self, KirokuError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, KirokuError> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    // ── Single-record operations ────────────────────────────────

    /// Insert or replace the record stored under `key`.
    ///
    /// Fails with [`KirokuError::OrderTaken`] when another key already holds
    /// the record's rank.
    pub fn put(&self, key: &str, record: &ShowRecord) -> Result<(), KirokuError> {
        put_record(&self.conn, key, record)
    }

    pub fn get(&self, key: &str) -> Result<Option<ShowRecord>, KirokuError> {
        get_record(&self.conn, key)
    }

    /// Remove one record. Re-ranking the rest is up to the caller.
    pub fn delete(&self, key: &str) -> Result<bool, KirokuError> {
        let removed = self
            .conn
            .execute("DELETE FROM shows WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }

    pub fn count(&self) -> Result<usize, KirokuError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM shows", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ── Batches ─────────────────────────────────────────────────

    /// Run a batch of operations as one transaction with per-item outcomes.
    ///
    /// Each operation runs in its own savepoint, so a failing item is rolled
    /// back alone and its siblings still commit. Rows about to be rewritten
    /// are first parked at fresh negative ranks so a batch can permute
    /// ranks freely; a row whose rewrite fails gets its old rank back.
    pub fn transaction(&mut self, ops: Vec<StoreOp>) -> Result<Vec<OpOutcome>, KirokuError> {
        let mut tx = self.conn.transaction()?;

        let mut parked = HashMap::new();
        for op in &ops {
            if let StoreOp::Put { key, .. } = op {
                if let Some(rank) = park(&tx, key)? {
                    parked.entry(key.clone()).or_insert(rank);
                }
            }
        }

        let mut outcomes = Vec::with_capacity(ops.len());
        for op in ops {
            let key = op.key().to_string();
            let sp = tx.savepoint()?;
            let result = match &op {
                StoreOp::Put { key, record } => put_record(&sp, key, record).map(|_| OpValue::Stored),
                StoreOp::Delete { key } => sp
                    .execute("DELETE FROM shows WHERE key = ?1", params![key])
                    .map(|n| OpValue::Deleted(n > 0))
                    .map_err(Into::into),
                StoreOp::Get { key } => get_record(&sp, key).map(OpValue::Found),
                StoreOp::Park { key } => park(&sp, key).map(|rank| OpValue::Parked(rank.is_some())),
            };
            if result.is_ok() {
                sp.commit()?;
            } else {
                drop(sp);
            }

            if let Err(e) = &result {
                warn!(key = %key, "Store operation failed: {e}");
                if let (StoreOp::Put { .. }, Some(&rank)) = (&op, parked.get(&key)) {
                    unpark(&tx, &key, rank);
                }
            }
            outcomes.push(OpOutcome { key, result });
        }

        tx.commit()?;
        debug!(ops = outcomes.len(), "Committed store transaction");
        Ok(outcomes)
    }

    /// Load every record in ascending `index` order, rebuilding shows.
    ///
    /// Records that fail validation are returned as errors in place rather
    /// than aborting the load.
    pub fn load_all_ordered_by(&self, index: Index) -> Result<Vec<StoredShow>, KirokuError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT key, ord, record FROM shows ORDER BY {}",
            index.column()
        ))?;
        let rows = stmt
            .query_map([], |row| {
                let key: String = row.get(0)?;
                let rank: i64 = row.get(1)?;
                let record: String = row.get(2)?;
                Ok((key, rank, record))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .map(|(key, rank, record)| {
                let show = serde_json::from_str::<ShowRecord>(&record)
                    .map_err(|e| ValidationError::unreadable(e.to_string()))
                    .and_then(Show::from_record);
                StoredShow { key, rank, show }
            })
            .collect())
    }
}

// ── Migrations ──────────────────────────────────────────────────

/// Run schema migrations using `PRAGMA user_version` for version tracking.
fn run_migrations(conn: &Connection) -> Result<(), KirokuError> {
    let version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        conn.execute_batch(SCHEMA_V1)?;
        conn.pragma_update(None, "user_version", 1)?;
    }
    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────

fn put_record(conn: &Connection, key: &str, record: &ShowRecord) -> Result<(), KirokuError> {
    let order = record.order.unwrap_or_default();
    let json = serde_json::to_string(record)?;
    conn.execute(
        "INSERT INTO shows (key, ord, record) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET ord = excluded.ord, record = excluded.record",
        params![key, order, json],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation => {
            KirokuError::OrderTaken { order }
        }
        other => other.into(),
    })?;
    Ok(())
}

fn get_record(conn: &Connection, key: &str) -> Result<Option<ShowRecord>, KirokuError> {
    let json: Option<String> = conn
        .query_row(
            "SELECT record FROM shows WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    json.map(|j| serde_json::from_str::<ShowRecord>(&j))
        .transpose()
        .map_err(KirokuError::from)
}

/// Move a ranked row to one below the lowest rank in the table. Returns
/// the rank it held, or `None` if it is missing or already parked.
fn park(conn: &Connection, key: &str) -> Result<Option<i64>, KirokuError> {
    let rank: Option<i64> = conn
        .query_row(
            "SELECT ord FROM shows WHERE key = ?1 AND ord >= 0",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    if rank.is_some() {
        conn.execute(
            "UPDATE shows SET ord = (SELECT MIN(MIN(ord), 0) FROM shows) - 1 WHERE key = ?1",
            params![key],
        )?;
    }
    Ok(rank)
}

/// Give a parked row its rank back after its replacement failed.
///
/// If the rank has been taken meanwhile the row stays parked; the next load
/// re-ranks it.
fn unpark(conn: &Connection, key: &str, rank: i64) {
    if let Err(e) = conn.execute(
        "UPDATE shows SET ord = ?2 WHERE key = ?1 AND ord < 0",
        params![key, rank],
    ) {
        warn!(key = %key, "Could not restore rank of parked row: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExternalLink, Season};

    fn show(title: &str, order: u32) -> Show {
        let mut show = Show::new(title, ExternalLink::None);
        let _ = show.add_seasons(vec![Season::new("Season 1", ["a", "b"])], None);
        let _ = show.set_order(order);
        show
    }

    fn put(db: &Storage, show: &Show) -> Result<(), KirokuError> {
        db.put(&show.key(), &show.to_record())
    }

    fn titles(db: &Storage) -> Vec<String> {
        db.load_all_ordered_by(Index::Order)
            .unwrap()
            .into_iter()
            .map(|row| row.show.unwrap().title().to_string())
            .collect()
    }

    #[test]
    fn test_put_get_delete() {
        let db = Storage::open_memory().unwrap();
        let frieren = show("Frieren", 0);
        put(&db, &frieren).unwrap();

        let record = db.get("Frieren").unwrap().unwrap();
        assert_eq!(Show::from_record(record).unwrap(), frieren);

        assert!(db.delete("Frieren").unwrap());
        assert!(!db.delete("Frieren").unwrap());
        assert_eq!(db.get("Frieren").unwrap(), None);
    }

    #[test]
    fn test_put_replaces_by_key() {
        let db = Storage::open_memory().unwrap();
        put(&db, &show("Frieren", 0)).unwrap();
        put(&db, &show("Frieren", 3)).unwrap();
        assert_eq!(db.count().unwrap(), 1);
        assert_eq!(db.get("Frieren").unwrap().unwrap().order, Some(3));
    }

    #[test]
    fn test_order_is_unique() {
        let db = Storage::open_memory().unwrap();
        put(&db, &show("Frieren", 0)).unwrap();
        let err = put(&db, &show("Mushishi", 0)).unwrap_err();
        assert!(matches!(err, KirokuError::OrderTaken { order: 0 }));
        assert_eq!(db.count().unwrap(), 1);
    }

    #[test]
    fn test_load_ordered() {
        let db = Storage::open_memory().unwrap();
        put(&db, &show("C", 0)).unwrap();
        put(&db, &show("A", 2)).unwrap();
        put(&db, &show("B", 1)).unwrap();
        assert_eq!(titles(&db), vec!["C", "B", "A"]);

        let by_key: Vec<String> = db
            .load_all_ordered_by(Index::Key)
            .unwrap()
            .into_iter()
            .map(|row| row.key)
            .collect();
        assert_eq!(by_key, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_transaction_swaps_ranks() {
        let mut db = Storage::open_memory().unwrap();
        put(&db, &show("A", 0)).unwrap();
        put(&db, &show("B", 1)).unwrap();

        let outcomes = db
            .transaction(vec![StoreOp::put(&show("A", 1)), StoreOp::put(&show("B", 0))])
            .unwrap();
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
        assert_eq!(titles(&db), vec!["B", "A"]);
    }

    #[test]
    fn test_transaction_partial_failure() {
        let mut db = Storage::open_memory().unwrap();
        put(&db, &show("Existing", 0)).unwrap();

        let outcomes = db
            .transaction(vec![
                StoreOp::put(&show("Collides", 0)),
                StoreOp::put(&show("Fine", 1)),
                StoreOp::Get { key: "Fine".into() },
                StoreOp::Delete { key: "Missing".into() },
            ])
            .unwrap();

        assert!(matches!(
            outcomes[0].result,
            Err(KirokuError::OrderTaken { order: 0 })
        ));
        assert!(matches!(outcomes[1].result, Ok(OpValue::Stored)));
        assert!(matches!(&outcomes[2].result, Ok(OpValue::Found(Some(_)))));
        assert!(matches!(outcomes[3].result, Ok(OpValue::Deleted(false))));
        assert_eq!(titles(&db), vec!["Existing", "Fine"]);
    }

    #[test]
    fn test_failed_put_restores_parked_row() {
        let mut db = Storage::open_memory().unwrap();
        put(&db, &show("A", 0)).unwrap();
        put(&db, &show("B", 1)).unwrap();

        // A tries to take B's rank while B stays put.
        let outcomes = db.transaction(vec![StoreOp::put(&show("A", 1))]).unwrap();
        assert!(outcomes[0].result.is_err());
        assert_eq!(db.get("A").unwrap().unwrap().order, Some(0));
        assert_eq!(titles(&db), vec!["A", "B"]);
    }

    #[test]
    fn test_delete_and_shift_in_one_transaction() {
        let mut db = Storage::open_memory().unwrap();
        for (i, title) in ["A", "B", "C"].iter().enumerate() {
            put(&db, &show(title, i as u32)).unwrap();
        }
        let outcomes = db
            .transaction(vec![
                StoreOp::Delete { key: "A".into() },
                StoreOp::put(&show("B", 0)),
                StoreOp::put(&show("C", 1)),
            ])
            .unwrap();
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
        assert_eq!(titles(&db), vec!["B", "C"]);
    }

    #[test]
    fn test_corrupt_record_is_reported_in_place() {
        let db = Storage::open_memory().unwrap();
        put(&db, &show("Good", 1)).unwrap();
        db.conn
            .execute(
                "INSERT INTO shows (key, ord, record) VALUES ('Bad', 0, '{\"seasons\": []}')",
                [],
            )
            .unwrap();

        let rows = db.load_all_ordered_by(Index::Order).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, "Bad");
        assert!(rows[0].show.is_err());
        assert!(rows[1].show.is_ok());
    }

    #[test]
    fn test_parked_row_frees_its_rank() {
        let mut db = Storage::open_memory().unwrap();
        put(&db, &show("A", 0)).unwrap();

        let outcomes = db
            .transaction(vec![
                StoreOp::Park { key: "A".into() },
                StoreOp::put(&show("B", 0)),
            ])
            .unwrap();
        assert!(matches!(outcomes[0].result, Ok(OpValue::Parked(true))));
        assert!(outcomes[1].result.is_ok());
        assert_eq!(titles(&db), vec!["A", "B"]);
        assert_eq!(db.get("A").unwrap().unwrap().order, Some(0));
    }

    #[test]
    fn test_rank_freed_by_parked_row_stays_writable() {
        let mut db = Storage::open_memory().unwrap();
        db.conn
            .execute(
                "INSERT INTO shows (key, ord, record) VALUES ('Broken', 0, '{\"seasons\": []}')",
                [],
            )
            .unwrap();
        put(&db, &show("Fine", 1)).unwrap();
        put(&db, &show("Next", 2)).unwrap();

        let outcomes = db
            .transaction(vec![
                StoreOp::Park { key: "Broken".into() },
                StoreOp::put(&show("Fine", 0)),
                StoreOp::put(&show("Next", 1)),
            ])
            .unwrap();
        assert!(outcomes.iter().all(|o| o.result.is_ok()));

        // Rewriting the rank the broken row gave up must not collide with it.
        let mut fine = show("Fine", 0);
        let _ = fine.set_image_link(Some("x.jpg".into()));
        for _ in 0..3 {
            let outcomes = db
                .transaction(vec![StoreOp::put(&fine), StoreOp::put(&show("Next", 1))])
                .unwrap();
            assert!(outcomes.iter().all(|o| o.result.is_ok()));
        }
        assert_eq!(db.get("Fine").unwrap().unwrap().image_link.as_deref(), Some("x.jpg"));

        let keys: Vec<String> = db
            .load_all_ordered_by(Index::Order)
            .unwrap()
            .into_iter()
            .map(|row| row.key)
            .collect();
        assert_eq!(keys, vec!["Broken", "Fine", "Next"]);
        assert_eq!(db.count().unwrap(), 3);
    }

    #[test]
    fn test_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiroku.db");
        {
            let db = Storage::open(&path).unwrap();
            put(&db, &show("Frieren", 0)).unwrap();
        }
        let db = Storage::open(&path).unwrap();
        assert_eq!(titles(&db), vec!["Frieren"]);
    }
}
