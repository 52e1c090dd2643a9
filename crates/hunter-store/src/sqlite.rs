//! SQLite implementation of [`SignatureStore`] and [`AuditLog`].
//!
//! One connection guarded by a mutex; every scan reads inside its own
//! transaction and so sees a consistent snapshot. Signatures are stored as packed
//! little-endian `f32` blobs next to their model version.

use chrono::{DateTime, Utc};
use hunter_core::{
    AuditLog, Error, MatchRecord, NewPerson, PersonId, PersonMetadata, PersonRecord, Provenance,
    RecordScan, Result, Signature, SignatureStore,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS persons (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    age INTEGER,
    description TEXT NOT NULL,
    category TEXT NOT NULL,
    gender TEXT,
    ethnicity TEXT,
    image_ref TEXT NOT NULL,
    signature_version TEXT NOT NULL,
    signature BLOB NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_persons_category ON persons(category, seq);

CREATE TABLE IF NOT EXISTS matches (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    age INTEGER,
    description TEXT NOT NULL,
    category TEXT NOT NULL,
    gender TEXT,
    ethnicity TEXT,
    person_image_ref TEXT NOT NULL,
    confidence REAL NOT NULL,
    query_image_ref TEXT NOT NULL,
    longitude REAL,
    latitude REAL,
    created_at TEXT NOT NULL
);
"#;

const PERSON_COLUMNS: &str = "id, name, age, description, category, gender, ethnicity, \
     image_ref, signature_version, signature, created_at";

/// A person row as read from disk, signature still encoded.
struct PersonRow {
    id: String,
    metadata: PersonMetadata,
    image_ref: String,
    signature_version: String,
    signature: Vec<u8>,
    created_at: DateTime<Utc>,
}

impl PersonRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            metadata: PersonMetadata {
                name: row.get(1)?,
                age: row.get(2)?,
                description: row.get(3)?,
                category: row.get(4)?,
                gender: row.get(5)?,
                ethnicity: row.get(6)?,
            },
            image_ref: row.get(7)?,
            signature_version: row.get(8)?,
            signature: row.get(9)?,
            created_at: column_timestamp(row, 10)?,
        })
    }

    fn decode(self) -> Result<PersonRecord> {
        let signature = Signature::from_blob(self.signature_version, &self.signature).map_err(|e| {
            Error::CorruptSignature {
                id: self.id.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(PersonRecord {
            id: self.id,
            metadata: self.metadata,
            signature,
            image_ref: self.image_ref,
            created_at: self.created_at,
        })
    }
}

/// Read an RFC 3339 text column.
fn column_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn storage(e: rusqlite::Error) -> Error {
    Error::StorageUnavailable(e.to_string())
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(storage)?;
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(storage)?;
        conn.busy_timeout(std::time::Duration::from_secs(5)).map_err(storage)?;
        tracing::info!(path = %path.display(), journal_mode = %mode, "opened SQLite store");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().map_err(storage)?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(storage)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::StorageUnavailable("connection lock poisoned".into()))
    }

    /// Read matching person rows inside one read transaction.
    fn query_persons(&self, filter: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<PersonRow>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;
        let sql = format!("SELECT {PERSON_COLUMNS} FROM persons {filter} ORDER BY seq");
        let rows = tx
            .prepare(&sql)
            .map_err(storage)?
            .query_map(args, PersonRow::from_row)
            .map_err(storage)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage)?;
        tx.commit().map_err(storage)?;
        Ok(rows)
    }
}

impl SignatureStore for SqliteStore {
    fn enroll(&self, person: NewPerson) -> Result<PersonId> {
        let id = uuid::Uuid::new_v4().to_string();
        let m = &person.metadata;
        self.conn()?
            .execute(
                "INSERT INTO persons (id, name, age, description, category, gender, ethnicity, \
                 image_ref, signature_version, signature, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    id,
                    m.name,
                    m.age,
                    m.description,
                    m.category,
                    m.gender,
                    m.ethnicity,
                    person.image_ref,
                    person.signature.version,
                    person.signature.to_blob(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(storage)?;
        Ok(id)
    }

    /// Rows are read inside a read transaction (a consistent snapshot);
    /// signatures are decoded lazily as the iterator advances.
    fn scan(&self) -> Result<RecordScan> {
        let rows = self.query_persons("", &[])?;
        Ok(Box::new(rows.into_iter().map(PersonRow::decode)))
    }

    fn get(&self, id: &str) -> Result<PersonRecord> {
        let row = self
            .conn()?
            .query_row(
                &format!("SELECT {PERSON_COLUMNS} FROM persons WHERE id = ?1"),
                params![id],
                PersonRow::from_row,
            )
            .optional()
            .map_err(storage)?;
        row.ok_or_else(|| Error::NotFound(id.to_string()))?.decode()
    }

    fn delete(&self, id: &str) -> Result<()> {
        let removed = self
            .conn()?
            .execute("DELETE FROM persons WHERE id = ?1", params![id])
            .map_err(storage)?;
        if removed == 0 {
            tracing::debug!(%id, "delete: no such person");
        }
        Ok(())
    }

    fn list_by_category(&self, category: &str) -> Result<Vec<PersonRecord>> {
        self.query_persons("WHERE category = ?1", &[&category])?
            .into_iter()
            .map(PersonRow::decode)
            .collect()
    }
}

impl AuditLog for SqliteStore {
    fn append(&self, record: MatchRecord) -> Result<()> {
        let p = &record.person;
        self.conn()?
            .execute(
                "INSERT INTO matches (id, name, age, description, category, gender, ethnicity, \
                 person_image_ref, confidence, query_image_ref, longitude, latitude, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    record.id,
                    p.name,
                    p.age,
                    p.description,
                    p.category,
                    p.gender,
                    p.ethnicity,
                    record.person_image_ref,
                    record.confidence as f64,
                    record.provenance.image_ref,
                    record.provenance.longitude,
                    record.provenance.latitude,
                    record.created_at.to_rfc3339(),
                ],
            )
            .map_err(storage)?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<MatchRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, age, description, category, gender, ethnicity, \
                 person_image_ref, confidence, query_image_ref, longitude, latitude, created_at \
                 FROM matches ORDER BY seq",
            )
            .map_err(storage)?;

        let entries = stmt
            .query_map([], |row| {
                let confidence: f64 = row.get(8)?;
                Ok(MatchRecord {
                    id: row.get(0)?,
                    person: PersonMetadata {
                        name: row.get(1)?,
                        age: row.get(2)?,
                        description: row.get(3)?,
                        category: row.get(4)?,
                        gender: row.get(5)?,
                        ethnicity: row.get(6)?,
                    },
                    person_image_ref: row.get(7)?,
                    confidence: confidence as f32,
                    provenance: Provenance {
                        image_ref: row.get(9)?,
                        longitude: row.get(10)?,
                        latitude: row.get(11)?,
                    },
                    created_at: column_timestamp(row, 12)?,
                })
            })
            .map_err(storage)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage)?;
        Ok(entries)
    }
}
