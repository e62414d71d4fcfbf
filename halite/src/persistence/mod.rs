//! Persistence collaborator interfaces.
//!
//! The store treats durability as an external concern: after every committed
//! mutation it hands the persistence collaborator an ordered list of records
//! (full documents on insert/update, `{$$deleted: true, _id}` tombstones on
//! remove, and `$$indexCreated`/`$$indexRemoved` lifecycle markers), and on
//! load it replays the collaborator's record stream. The collaborator in
//! turn talks to a [Storage] backend through `get_item`/`set_item`/
//! `remove_item` only.

use crate::common::{atomic, Atomic, ReadExecutor, WriteExecutor};
use crate::document::Document;
use crate::errors::{ErrorKind, HaliteError, HaliteResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Key-value storage backend used by the persistence collaborator.
pub trait Storage: Send + Sync {
    fn get_item(&self, key: &str) -> HaliteResult<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> HaliteResult<()>;
    fn remove_item(&self, key: &str) -> HaliteResult<()>;
}

/// In-memory [Storage] implementation.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    items: Atomic<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage {
            items: atomic(HashMap::new()),
        }
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> HaliteResult<Option<String>> {
        Ok(self.items.read_with(|items| items.get(key).cloned()))
    }

    fn set_item(&self, key: &str, value: &str) -> HaliteResult<()> {
        self.items
            .write_with(|items| items.insert(key.to_string(), value.to_string()));
        Ok(())
    }

    fn remove_item(&self, key: &str) -> HaliteResult<()> {
        self.items.write_with(|items| items.remove(key));
        Ok(())
    }
}

/// The persistence collaborator.
///
/// `persist_new_state` receives the records produced by a committed
/// mutation, in commit order; its acknowledgement governs when the
/// operation's completion signal fires. `load` returns the full ordered
/// record stream for replay.
pub trait Persistence: Send + Sync {
    fn load(&self) -> HaliteResult<Vec<Document>>;
    fn persist_new_state(&self, records: &[Document]) -> HaliteResult<()>;
}

/// Journal-style [Persistence] implementation over a [Storage] backend.
///
/// Records are serialized one JSON document per line and appended under a
/// single storage key. Replay order is append order, which is commit order.
#[derive(Clone)]
pub struct MemoryPersistence {
    storage: Arc<dyn Storage>,
    key: String,
}

impl MemoryPersistence {
    /// Creates a collaborator over its own private [MemoryStorage].
    pub fn new() -> Self {
        MemoryPersistence::with_storage(Arc::new(MemoryStorage::new()), "halite")
    }

    /// Creates a collaborator journaling under `key` in the given backend.
    pub fn with_storage(storage: Arc<dyn Storage>, key: impl Into<String>) -> Self {
        MemoryPersistence {
            storage,
            key: key.into(),
        }
    }
}

impl Default for MemoryPersistence {
    fn default() -> Self {
        MemoryPersistence::new()
    }
}

impl Persistence for MemoryPersistence {
    fn load(&self) -> HaliteResult<Vec<Document>> {
        let journal = match self.storage.get_item(&self.key)? {
            Some(journal) => journal,
            None => return Ok(Vec::new()),
        };
        let mut records = Vec::new();
        for line in journal.lines() {
            if line.is_empty() {
                continue;
            }
            let record: Document = serde_json::from_str(line).map_err(|err| {
                log::error!("Corrupt journal record: {}", err);
                HaliteError::new_with_cause(
                    "Corrupt journal record",
                    ErrorKind::PersistenceError,
                    err.into(),
                )
            })?;
            records.push(record);
        }
        Ok(records)
    }

    fn persist_new_state(&self, records: &[Document]) -> HaliteResult<()> {
        let mut journal = self.storage.get_item(&self.key)?.unwrap_or_default();
        for record in records {
            journal.push_str(&serde_json::to_string(record)?);
            journal.push('\n');
        }
        self.storage.set_item(&self.key, &journal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{doc, val};

    #[test]
    fn test_memory_storage_round_trip() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get_item("k").unwrap(), None);
        storage.set_item("k", "v").unwrap();
        assert_eq!(storage.get_item("k").unwrap(), Some("v".to_string()));
        storage.remove_item("k").unwrap();
        assert_eq!(storage.get_item("k").unwrap(), None);
    }

    #[test]
    fn test_load_empty_journal() {
        let persistence = MemoryPersistence::new();
        assert!(persistence.load().unwrap().is_empty());
    }

    #[test]
    fn test_persist_then_load_preserves_order() {
        let persistence = MemoryPersistence::new();
        persistence
            .persist_new_state(&[doc! { "_id": "1", n: 1 }, doc! { "_id": "2", n: 2 }])
            .unwrap();
        persistence
            .persist_new_state(&[doc! { "_id": "1", n: 10 }])
            .unwrap();

        let records = persistence.load().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].id(), Some("1"));
        assert_eq!(records[1].id(), Some("2"));
        assert_eq!(records[2].get("n"), Some(&val!(10)));
    }

    #[test]
    fn test_tombstones_and_markers_survive_the_journal() {
        let persistence = MemoryPersistence::new();
        let mut tombstone = Document::new();
        tombstone.put("$$deleted", true).unwrap();
        tombstone.put("_id", "gone").unwrap();
        let mut marker = Document::new();
        marker
            .put("$$indexCreated", doc! { fieldName: "a", unique: true })
            .unwrap();
        persistence
            .persist_new_state(&[tombstone.clone(), marker.clone()])
            .unwrap();

        let records = persistence.load().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("$$deleted"), Some(&val!(true)));
        assert!(records[1].get("$$indexCreated").unwrap().is_document());
    }

    #[test]
    fn test_corrupt_journal_line_fails_load() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item("db", "{\"_id\":\"ok\"}\nnot json\n").unwrap();
        let persistence = MemoryPersistence::with_storage(storage, "db");
        let err = persistence.load().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::PersistenceError);
        assert!(err.cause().is_some());
    }

    #[test]
    fn test_shared_backend_namespacing() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let first = MemoryPersistence::with_storage(storage.clone(), "a");
        let second = MemoryPersistence::with_storage(storage, "b");
        first.persist_new_state(&[doc! { "_id": "1" }]).unwrap();
        assert_eq!(first.load().unwrap().len(), 1);
        assert!(second.load().unwrap().is_empty());
    }
}
