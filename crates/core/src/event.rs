//! Update events published after a successful write
//!
//! An event names the entry and the action. The original (pre-write) and
//! current (post-write) states are supplied lazily: producing them may cost a
//! repository round trip, and most listeners only need the id. Each supplier
//! runs at most once per event instance; every listener sharing the event
//! sees the memoized value.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened to the entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateAction {
    /// Entry was created
    Create,
    /// Entry was modified
    Update,
    /// Entry was removed
    Delete,
}

impl fmt::Display for UpdateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpdateAction::Create => "create",
            UpdateAction::Update => "update",
            UpdateAction::Delete => "delete",
        };
        f.write_str(s)
    }
}

type Supplier<T> = Box<dyn Fn() -> Option<T> + Send + Sync>;

/// Lazily evaluated, memoized state slot
struct Lazy<T> {
    cell: OnceCell<Option<T>>,
    supplier: Option<Supplier<T>>,
}

impl<T> Lazy<T> {
    fn absent() -> Self {
        Lazy {
            cell: OnceCell::with_value(None),
            supplier: None,
        }
    }

    fn value(value: T) -> Self {
        Lazy {
            cell: OnceCell::with_value(Some(value)),
            supplier: None,
        }
    }

    fn deferred(supplier: Supplier<T>) -> Self {
        Lazy {
            cell: OnceCell::new(),
            supplier: Some(supplier),
        }
    }

    fn get(&self) -> Option<&T> {
        self.cell
            .get_or_init(|| self.supplier.as_ref().and_then(|s| s()))
            .as_ref()
    }
}

/// Notification about one entry mutation
pub struct UpdateEvent<T> {
    entity_id: String,
    action: UpdateAction,
    original: Lazy<T>,
    current: Lazy<T>,
}

impl<T> UpdateEvent<T> {
    /// Event for a newly created entry
    pub fn created(entity_id: impl Into<String>, current: T) -> Self {
        UpdateEvent {
            entity_id: entity_id.into(),
            action: UpdateAction::Create,
            original: Lazy::absent(),
            current: Lazy::value(current),
        }
    }

    /// Event for a modified entry
    pub fn updated(entity_id: impl Into<String>, original: T, current: T) -> Self {
        UpdateEvent {
            entity_id: entity_id.into(),
            action: UpdateAction::Update,
            original: Lazy::value(original),
            current: Lazy::value(current),
        }
    }

    /// Event for a removed entry
    pub fn deleted(entity_id: impl Into<String>, original: T) -> Self {
        UpdateEvent {
            entity_id: entity_id.into(),
            action: UpdateAction::Delete,
            original: Lazy::value(original),
            current: Lazy::absent(),
        }
    }

    /// Event whose states are produced on demand
    ///
    /// Each supplier is invoked at most once, the first time a listener asks.
    pub fn deferred(
        entity_id: impl Into<String>,
        action: UpdateAction,
        original: impl Fn() -> Option<T> + Send + Sync + 'static,
        current: impl Fn() -> Option<T> + Send + Sync + 'static,
    ) -> Self {
        UpdateEvent {
            entity_id: entity_id.into(),
            action,
            original: Lazy::deferred(Box::new(original)),
            current: Lazy::deferred(Box::new(current)),
        }
    }

    /// Id of the affected entry
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// What happened
    pub fn action(&self) -> UpdateAction {
        self.action
    }

    /// State before the write (`None` for creates)
    pub fn original(&self) -> Option<&T> {
        self.original.get()
    }

    /// State after the write (`None` for deletes)
    pub fn current(&self) -> Option<&T> {
        self.current.get()
    }
}

impl<T> fmt::Debug for UpdateEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateEvent")
            .field("entity_id", &self.entity_id)
            .field("action", &self.action)
            .finish_non_exhaustive()
    }
}
