//! Relational index over stored objects and batches
//!
//! A single SQLite database at `<repo>/db/index.sqlite` with two tables:
//! `objects` (one row per ingested imaging/record pair) and `batches`
//! (one row per ingested batch, keyed by batch id).

use crate::domain::{Result, VaultError};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// One indexed imaging/record pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexedObject {
    pub id: i64,
    pub imaging_id: String,
    pub patient_id: String,
    pub imaging_hash: String,
    pub record_hash: String,
    pub masked_pixels: i64,
    pub batch_id: String,
    pub ts_ms: i64,
    pub imaging_cas_ref: String,
    pub record_cas_ref: String,
}

/// Object row to insert; the id is assigned by the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewObject {
    pub imaging_id: String,
    pub patient_id: String,
    pub imaging_hash: String,
    pub record_hash: String,
    pub batch_id: String,
    pub ts_ms: i64,
}

/// One indexed batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexedBatch {
    pub id: String,
    pub manifest_hash: Option<String>,
    pub signature_hash: Option<String>,
    pub pubkey_hash: Option<String>,
    pub count: i64,
    pub ts_ms: i64,
}

/// Outcome of recording one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordOutcome {
    pub inserted: usize,
    pub already_present: usize,
}

const OBJECT_COLUMNS: &str = "id, imaging_id, patient_id, imaging_hash, record_hash, masked_pixels, \
                              batch_id, ts_ms, imaging_cas_ref, record_cas_ref";

/// SQLite-backed index
pub struct Index {
    conn: Mutex<Connection>,
}

impl Index {
    /// Open (creating if needed) the index database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| VaultError::Index(format!("failed to open {}: {e}", path.display())))?;
        Self::from_connection(conn)
    }

    /// In-memory index, used by tests
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create tables and indexes
    pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS objects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                imaging_id TEXT NOT NULL,
                patient_id TEXT NOT NULL,
                imaging_hash TEXT NOT NULL,
                record_hash TEXT NOT NULL,
                masked_pixels INTEGER NOT NULL DEFAULT 0,
                batch_id TEXT NOT NULL,
                ts_ms INTEGER NOT NULL,
                imaging_cas_ref TEXT NOT NULL,
                record_cas_ref TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS batches (
                id TEXT PRIMARY KEY,
                manifest_hash TEXT,
                signature_hash TEXT,
                pubkey_hash TEXT,
                count INTEGER NOT NULL,
                ts_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_objects_imaging_id ON objects(imaging_id);
            CREATE INDEX IF NOT EXISTS idx_objects_patient_id ON objects(patient_id);
            CREATE INDEX IF NOT EXISTS idx_objects_batch_id ON objects(batch_id);",
        )
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| VaultError::Index("index connection lock poisoned".to_string()))
    }

    /// Record a batch and its objects in one transaction
    ///
    /// The batch row is upserted. Objects already present for the same
    /// batch with identical content hashes are not inserted again, so
    /// re-ingesting a batch leaves the index unchanged.
    pub fn record_batch(&self, batch: &IndexedBatch, objects: &[NewObject]) -> Result<RecordOutcome> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut outcome = RecordOutcome::default();

        for object in objects {
            let exists: Option<i64> = tx
                .query_row(
                    "SELECT id FROM objects
                     WHERE batch_id = ?1 AND imaging_hash = ?2 AND record_hash = ?3
                     LIMIT 1",
                    params![object.batch_id, object.imaging_hash, object.record_hash],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() {
                outcome.already_present += 1;
                continue;
            }
            tx.execute(
                "INSERT INTO objects (imaging_id, patient_id, imaging_hash, record_hash,
                                      masked_pixels, batch_id, ts_ms, imaging_cas_ref, record_cas_ref)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?3, ?4)",
                params![
                    object.imaging_id,
                    object.patient_id,
                    object.imaging_hash,
                    object.record_hash,
                    object.batch_id,
                    object.ts_ms
                ],
            )?;
            outcome.inserted += 1;
        }

        tx.execute(
            "INSERT OR REPLACE INTO batches (id, manifest_hash, signature_hash, pubkey_hash, count, ts_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                batch.id,
                batch.manifest_hash,
                batch.signature_hash,
                batch.pubkey_hash,
                batch.count,
                batch.ts_ms
            ],
        )?;

        tx.commit()?;
        Ok(outcome)
    }

    /// Objects ordered by id descending
    pub fn list_objects(&self, limit: u32, offset: u32) -> Result<Vec<IndexedObject>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {OBJECT_COLUMNS} FROM objects ORDER BY id DESC LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt.query_map(params![limit, offset], object_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Batches ordered by timestamp descending
    pub fn list_batches(&self, limit: u32) -> Result<Vec<IndexedBatch>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, manifest_hash, signature_hash, pubkey_hash, count, ts_ms
             FROM batches ORDER BY ts_ms DESC, rowid DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], batch_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Most recently inserted object for a patient
    pub fn latest_by_patient(&self, patient_id: &str) -> Result<Option<IndexedObject>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {OBJECT_COLUMNS} FROM objects WHERE patient_id = ?1 ORDER BY id DESC LIMIT 1"
                ),
                params![patient_id],
                object_from_row,
            )
            .optional()?)
    }

    pub fn batch(&self, batch_id: &str) -> Result<Option<IndexedBatch>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                "SELECT id, manifest_hash, signature_hash, pubkey_hash, count, ts_ms
                 FROM batches WHERE id = ?1",
                params![batch_id],
                batch_from_row,
            )
            .optional()?)
    }

    /// (objects, batches) row counts
    pub fn counts(&self) -> Result<(u64, u64)> {
        let conn = self.lock()?;
        let objects: i64 = conn.query_row("SELECT COUNT(*) FROM objects", [], |row| row.get(0))?;
        let batches: i64 = conn.query_row("SELECT COUNT(*) FROM batches", [], |row| row.get(0))?;
        Ok((objects.max(0) as u64, batches.max(0) as u64))
    }

    /// Every CAS reference held by an object row
    pub fn referenced_blobs(&self) -> Result<BTreeSet<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT imaging_cas_ref, record_cas_ref FROM objects")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut refs = BTreeSet::new();
        for row in rows {
            let (imaging, record) = row?;
            refs.insert(imaging);
            refs.insert(record);
        }
        Ok(refs)
    }
}

fn object_from_row(row: &Row<'_>) -> rusqlite::Result<IndexedObject> {
    Ok(IndexedObject {
        id: row.get(0)?,
        imaging_id: row.get(1)?,
        patient_id: row.get(2)?,
        imaging_hash: row.get(3)?,
        record_hash: row.get(4)?,
        masked_pixels: row.get(5)?,
        batch_id: row.get(6)?,
        ts_ms: row.get(7)?,
        imaging_cas_ref: row.get(8)?,
        record_cas_ref: row.get(9)?,
    })
}

fn batch_from_row(row: &Row<'_>) -> rusqlite::Result<IndexedBatch> {
    Ok(IndexedBatch {
        id: row.get(0)?,
        manifest_hash: row.get(1)?,
        signature_hash: row.get(2)?,
        pubkey_hash: row.get(3)?,
        count: row.get(4)?,
        ts_ms: row.get(5)?,
    })
}
