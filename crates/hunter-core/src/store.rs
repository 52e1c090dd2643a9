//! Storage seams: the Signature Store and the Audit Log.
//!
//! Both traits take `&self` and are `Send + Sync`: implementations own their
//! locking, so the matching pipeline never synchronizes in memory. The
//! in-memory implementations here back the test suite and embedded use.

use crate::error::{Error, Result};
use crate::types::{MatchRecord, NewPerson, PersonId, PersonRecord};
use chrono::Utc;
use std::sync::{Arc, RwLock};

/// Lazy, finite sequence of stored records.
///
/// Each item is fallible so that a record whose signature cannot be decoded
/// surfaces as an error in the scan instead of being skipped.
pub type RecordScan = Box<dyn Iterator<Item = Result<PersonRecord>> + Send>;

/// Durable mapping from person id to metadata and signature.
pub trait SignatureStore: Send + Sync {
    /// Persist a new record. Visible to every scan started afterwards.
    fn enroll(&self, person: NewPerson) -> Result<PersonId>;

    /// Point-in-time view of all records, in enrollment order.
    ///
    /// Every call starts a fresh, independent sequence; writes that land after
    /// the call are not observed by the returned iterator.
    fn scan(&self) -> Result<RecordScan>;

    fn get(&self, id: &str) -> Result<PersonRecord>;

    /// Remove a record. Removing an absent id is a no-op.
    fn delete(&self, id: &str) -> Result<()>;

    /// Records whose category equals `category` exactly, in enrollment order.
    fn list_by_category(&self, category: &str) -> Result<Vec<PersonRecord>>;
}

/// Append-only log of confirmed matches.
pub trait AuditLog: Send + Sync {
    fn append(&self, record: MatchRecord) -> Result<()>;

    /// All entries in insertion order.
    fn list(&self) -> Result<Vec<MatchRecord>>;
}

impl<T: SignatureStore + ?Sized> SignatureStore for Arc<T> {
    fn enroll(&self, person: NewPerson) -> Result<PersonId> {
        (**self).enroll(person)
    }
    fn scan(&self) -> Result<RecordScan> {
        (**self).scan()
    }
    fn get(&self, id: &str) -> Result<PersonRecord> {
        (**self).get(id)
    }
    fn delete(&self, id: &str) -> Result<()> {
        (**self).delete(id)
    }
    fn list_by_category(&self, category: &str) -> Result<Vec<PersonRecord>> {
        (**self).list_by_category(category)
    }
}

impl<T: AuditLog + ?Sized> AuditLog for Arc<T> {
    fn append(&self, record: MatchRecord) -> Result<()> {
        (**self).append(record)
    }
    fn list(&self) -> Result<Vec<MatchRecord>> {
        (**self).list()
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::StorageUnavailable("in-memory store lock poisoned".into())
}

/// In-memory [`SignatureStore`].
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<PersonRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SignatureStore for MemoryStore {
    fn enroll(&self, person: NewPerson) -> Result<PersonId> {
        let id = uuid::Uuid::new_v4().to_string();
        let record = PersonRecord {
            id: id.clone(),
            metadata: person.metadata,
            signature: person.signature,
            image_ref: person.image_ref,
            created_at: Utc::now(),
        };
        self.records.write().map_err(poisoned)?.push(record);
        Ok(id)
    }

    fn scan(&self) -> Result<RecordScan> {
        let snapshot = self.records.read().map_err(poisoned)?.clone();
        Ok(Box::new(snapshot.into_iter().map(Ok)))
    }

    fn get(&self, id: &str) -> Result<PersonRecord> {
        self.records
            .read()
            .map_err(poisoned)?
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.records.write().map_err(poisoned)?.retain(|r| r.id != id);
        Ok(())
    }

    fn list_by_category(&self, category: &str) -> Result<Vec<PersonRecord>> {
        Ok(self
            .records
            .read()
            .map_err(poisoned)?
            .iter()
            .filter(|r| r.metadata.category == category)
            .cloned()
            .collect())
    }
}

/// In-memory [`AuditLog`].
#[derive(Default)]
pub struct MemoryAuditLog {
    entries: RwLock<Vec<MatchRecord>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditLog for MemoryAuditLog {
    fn append(&self, record: MatchRecord) -> Result<()> {
        self.entries.write().map_err(poisoned)?.push(record);
        Ok(())
    }

    fn list(&self) -> Result<Vec<MatchRecord>> {
        Ok(self.entries.read().map_err(poisoned)?.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PersonMetadata, Signature};

    fn person(name: &str, category: &str) -> NewPerson {
        NewPerson {
            metadata: PersonMetadata {
                name: name.into(),
                age: None,
                description: String::new(),
                category: category.into(),
                gender: None,
                ethnicity: None,
            },
            image_ref: format!("file/{name}.jpg"),
            signature: Signature::new("test", vec![1.0, 0.0]),
        }
    }

    #[test]
    fn test_enroll_visible_to_get_and_scan() {
        let store = MemoryStore::new();
        let id = store.enroll(person("a", "missing")).unwrap();
        assert_eq!(store.get(&id).unwrap().metadata.name, "a");
        let scanned: Vec<_> = store.scan().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].id, id);
    }

    #[test]
    fn test_scan_is_a_snapshot() {
        let store = MemoryStore::new();
        store.enroll(person("a", "missing")).unwrap();
        let scan = store.scan().unwrap();
        store.enroll(person("b", "missing")).unwrap();
        assert_eq!(scan.count(), 1);
        assert_eq!(store.scan().unwrap().count(), 2);
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(store.get("nope"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        let id = store.enroll(person("a", "missing")).unwrap();
        store.delete(&id).unwrap();
        store.delete(&id).unwrap();
        store.delete("never-existed").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_list_by_category_exact_and_ordered() {
        let store = MemoryStore::new();
        store.enroll(person("a", "missing")).unwrap();
        store.enroll(person("b", "criminal")).unwrap();
        store.enroll(person("c", "missing")).unwrap();
        store.enroll(person("d", "Missing")).unwrap();

        let names: Vec<_> = store
            .list_by_category("missing")
            .unwrap()
            .into_iter()
            .map(|r| r.metadata.name)
            .collect();
        assert_eq!(names, ["a", "c"]);
    }

    #[test]
    fn test_concurrent_writers_lose_nothing() {
        const WRITERS: usize = 6;
        const PER_WRITER: usize = 40;

        let store = Arc::new(MemoryStore::new());
        let audit = Arc::new(MemoryAuditLog::new());
        let seed_id = store.enroll(person("seed", "wanted")).unwrap();
        let seed = store.get(&seed_id).unwrap();

        let writers: Vec<_> = (0..WRITERS)
            .map(|w| {
                let store = Arc::clone(&store);
                let audit = Arc::clone(&audit);
                let seed = seed.clone();
                std::thread::spawn(move || {
                    for i in 0..PER_WRITER {
                        store.enroll(person(&format!("w{w}-{i}"), "missing")).unwrap();
                        audit
                            .append(MatchRecord::new(&seed, 0.9, Default::default()))
                            .unwrap();
                    }
                })
            })
            .collect();

        let reader = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                (0..20)
                    .map(|_| {
                        store
                            .scan()
                            .unwrap()
                            .map(|r| r.unwrap().id)
                            .collect::<Vec<_>>()
                    })
                    .collect::<Vec<_>>()
            })
        };

        for w in writers {
            w.join().unwrap();
        }
        let snapshots = reader.join().unwrap();

        let final_ids: Vec<_> = store.scan().unwrap().map(|r| r.unwrap().id).collect();
        assert_eq!(final_ids.len(), 1 + WRITERS * PER_WRITER);
        assert_eq!(audit.list().unwrap().len(), WRITERS * PER_WRITER);
        for snapshot in snapshots {
            assert_eq!(snapshot[..], final_ids[..snapshot.len()]);
        }
    }
}
