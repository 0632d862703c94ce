//! In-memory backends
//!
//! # Design
//!
//! - DashMap: sharded by context / collection, lock-free reads
//! - FxHashMap: O(1) document lookups inside a collection
//! - Conditional writes hold the shard write guard for the whole
//!   check-and-write, so they are atomic with respect to each other

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use folio_core::{FolioError, FolioResult, IdContext};
use rustc_hash::FxHashMap;

use crate::traits::{CounterStore, DocumentStore, StoredDocument, WriteCondition};

/// Counter rows kept in a DashMap
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    rows: DashMap<IdContext, u64>,
}

impl MemoryCounterStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of contexts with a row
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no context has been seen
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl CounterStore for MemoryCounterStore {
    fn read(&self, context: &IdContext) -> FolioResult<Option<u64>> {
        Ok(self.rows.get(context).map(|v| *v))
    }

    fn insert(&self, context: &IdContext, next_id: u64) -> FolioResult<bool> {
        match self.rows.entry(context.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(next_id);
                Ok(true)
            }
        }
    }

    fn compare_and_set(
        &self,
        context: &IdContext,
        expected: u64,
        next_id: u64,
    ) -> FolioResult<bool> {
        match self.rows.get_mut(context) {
            Some(mut current) if *current == expected => {
                *current = next_id;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Per-collection shard
type Collection = FxHashMap<String, StoredDocument>;

/// Versioned documents kept in a DashMap of collections
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: DashMap<String, Collection>,
}

impl MemoryDocumentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

fn check_condition(
    collection: &str,
    id: &str,
    existing: Option<&StoredDocument>,
    condition: WriteCondition,
) -> FolioResult<()> {
    match (condition, existing) {
        (WriteCondition::Any, _) => Ok(()),
        (WriteCondition::MustNotExist, None) => Ok(()),
        (WriteCondition::MustNotExist, Some(_)) => {
            Err(FolioError::conflict(collection, id, "document already exists"))
        }
        (WriteCondition::MatchVersion(_), None) => Err(FolioError::conflict(
            collection,
            id,
            "document was deleted concurrently",
        )),
        (WriteCondition::MatchVersion(expected), Some(doc)) if doc.version != expected => {
            Err(FolioError::conflict(
                collection,
                id,
                format!(
                    "document was modified concurrently (expected version {}, found {})",
                    expected, doc.version
                ),
            ))
        }
        (WriteCondition::MatchVersion(_), Some(_)) => Ok(()),
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn load(&self, collection: &str, id: &str) -> FolioResult<Option<StoredDocument>> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|c| c.get(id).cloned()))
    }

    fn save(
        &self,
        collection: &str,
        id: &str,
        body: serde_json::Value,
        condition: WriteCondition,
    ) -> FolioResult<u64> {
        let mut shard = self.collections.entry(collection.to_string()).or_default();
        let existing = shard.get(id);
        check_condition(collection, id, existing, condition)?;

        let version = existing.map(|d| d.version + 1).unwrap_or(1);
        shard.insert(id.to_string(), StoredDocument { version, body });
        Ok(version)
    }

    fn delete(&self, collection: &str, id: &str, condition: WriteCondition) -> FolioResult<bool> {
        if condition == WriteCondition::MustNotExist {
            return Err(FolioError::invalid_input(
                "MustNotExist is not a valid delete condition",
            ));
        }
        let Some(mut shard) = self.collections.get_mut(collection) else {
            check_condition(collection, id, None, condition)?;
            return Ok(false);
        };
        check_condition(collection, id, shard.get(id), condition)?;
        Ok(shard.remove(id).is_some())
    }

    fn list(&self, collection: &str) -> FolioResult<Vec<(String, StoredDocument)>> {
        let mut docs: Vec<(String, StoredDocument)> = self
            .collections
            .get(collection)
            .map(|c| c.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        docs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(docs)
    }
}
