//! Persistence traits
//!
//! Both traits are synchronous and object safe. Implementations may block on
//! network I/O; callers that must not block wrap the calls (commit handles
//! run on the blocking pool).

use folio_core::{FolioResult, IdContext};
use serde::{Deserialize, Serialize};

/// Persistent per-context counter rows
///
/// The counter holds the next id that has not been granted to anybody.
/// Writers never overwrite blindly: a brand-new context is inserted, an
/// existing one is advanced only if it still holds the value that was read.
pub trait CounterStore: Send + Sync {
    /// Read the stored `next_id` for a context, `None` if never seen
    fn read(&self, context: &IdContext) -> FolioResult<Option<u64>>;

    /// Insert the row for a brand-new context
    ///
    /// Returns `false` (zero rows affected) if the row already exists.
    fn insert(&self, context: &IdContext, next_id: u64) -> FolioResult<bool>;

    /// Advance the row only if it still equals `expected`
    ///
    /// Returns `false` (zero rows affected) when another writer got there first
    /// or the row does not exist.
    fn compare_and_set(&self, context: &IdContext, expected: u64, next_id: u64)
        -> FolioResult<bool>;
}

/// A document together with its store-assigned version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    /// Monotonic per-document version, starts at 1
    pub version: u64,
    /// Document body
    pub body: serde_json::Value,
}

/// Precondition checked atomically with a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteCondition {
    /// Unconditional write
    Any,
    /// Fail with `Conflict` if the document exists
    MustNotExist,
    /// Fail with `Conflict` unless the document exists at exactly this version
    MatchVersion(u64),
}

/// Versioned document storage
///
/// Failed preconditions are reported as `FolioError::Conflict`.
pub trait DocumentStore: Send + Sync {
    /// Load a document, `None` if absent
    fn load(&self, collection: &str, id: &str) -> FolioResult<Option<StoredDocument>>;

    /// Write a document, returning its new version
    fn save(
        &self,
        collection: &str,
        id: &str,
        body: serde_json::Value,
        condition: WriteCondition,
    ) -> FolioResult<u64>;

    /// Remove a document
    ///
    /// Returns `false` if nothing was stored under `id` and the condition
    /// allowed that.
    fn delete(&self, collection: &str, id: &str, condition: WriteCondition) -> FolioResult<bool>;

    /// All documents of a collection, ordered by id
    fn list(&self, collection: &str) -> FolioResult<Vec<(String, StoredDocument)>>;
}
