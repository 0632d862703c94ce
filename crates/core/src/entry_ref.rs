//! Cross-repository entry references
//!
//! An [`EntryReference`] is the only way one entry points at another (a
//! relationship pointing at a work, a note attached to a person). It never
//! carries a live object; resolution always goes through the resolver
//! registry so the caller does not need to know which repository owns the
//! target.
//!
//! ## Usage
//!
//! ```
//! use folio_core::EntryReference;
//!
//! let work = EntryReference::new("work", "42");
//! assert_eq!(work.entry_type(), "work");
//! assert_eq!(work.to_string(), "work:42");
//!
//! let pinned = work.clone().at_version(3);
//! assert_eq!(pinned.version(), Some(3));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Immutable pointer to an entry of some type
///
/// ## Invariants
///
/// - `entry_type` and `id` are fixed at construction
/// - Equality includes the optional version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryReference {
    #[serde(rename = "type")]
    entry_type: String,
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<u64>,
}

impl EntryReference {
    /// Create an unversioned reference
    pub fn new(entry_type: impl Into<String>, id: impl Into<String>) -> Self {
        EntryReference {
            entry_type: entry_type.into(),
            id: id.into(),
            version: None,
        }
    }

    /// Pin the reference to a specific version
    pub fn at_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    /// The entry type tag ("work", "person", ...)
    pub fn entry_type(&self) -> &str {
        &self.entry_type
    }

    /// The entry id within its type
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The pinned version, if any
    pub fn version(&self) -> Option<u64> {
        self.version
    }

    /// Same reference without a version pin
    pub fn unversioned(&self) -> Self {
        EntryReference::new(self.entry_type.clone(), self.id.clone())
    }
}

impl fmt::Display for EntryReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(v) => write!(f, "{}:{}@{}", self.entry_type, self.id, v),
            None => write!(f, "{}:{}", self.entry_type, self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let r = EntryReference::new("person", "p-9");
        assert_eq!(r.entry_type(), "person");
        assert_eq!(r.id(), "p-9");
        assert_eq!(r.version(), None);
    }

    #[test]
    fn test_version_participates_in_equality() {
        let a = EntryReference::new("work", "1");
        let b = a.clone().at_version(2);
        assert_ne!(a, b);
        assert_eq!(a, b.unversioned());
    }

    #[test]
    fn test_display() {
        assert_eq!(EntryReference::new("work", "1").to_string(), "work:1");
        assert_eq!(
            EntryReference::new("work", "1").at_version(5).to_string(),
            "work:1@5"
        );
    }

    #[test]
    fn test_serde_shape() {
        let r = EntryReference::new("work", "1");
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json, serde_json::json!({"type": "work", "id": "1"}));

        let back: EntryReference = serde_json::from_value(json).unwrap();
        assert_eq!(back, r);
    }
}
