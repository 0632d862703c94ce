//! Key-based reconciliation of nested collections
//!
//! Given the nested entities currently held by a working copy and an incoming
//! list of patch DTOs:
//!
//! - an incoming item whose key matches an existing entity patches it in place
//! - an incoming item without a key is new and gets a freshly allocated id
//! - an existing entity whose key is absent from the incoming set is removed
//!
//! The result follows the incoming order. Validation runs before anything is
//! touched and the new collection replaces the old one only if every step
//! succeeded.
//!
//! A [`Reconciler`] remembers the ids it allocated for key-less items, so
//! running it twice with the same input reuses them instead of creating a
//! second set of entities.

use folio_core::{FolioError, FolioResult};
use std::collections::HashSet;

/// Nested entity kept in a parent's collection
pub trait NestedEntity: Clone {
    /// Key within the parent
    fn id(&self) -> &str;

    /// Empty entity with an assigned id
    fn with_id(id: String) -> Self;
}

/// Incoming patch for a nested entity
pub trait NestedDto {
    /// Key of the entity to patch, `None` for a new one
    fn key(&self) -> Option<&str>;
}

/// Reconciliation state for one nested collection
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    assigned: Vec<String>,
}

impl Reconciler {
    /// New reconciler with no assigned ids
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids allocated for key-less items so far
    pub fn assigned(&self) -> &[String] {
        &self.assigned
    }

    /// Reconcile `existing` against `incoming`
    ///
    /// `kind` names the nested entity in errors ("edition", "volume").
    /// `allocate` is only called for key-less items with no reusable id.
    /// `apply` patches one entity with one DTO.
    ///
    /// Fails with `ValidationFailed` if an incoming key does not exist or
    /// appears twice; `existing` is unchanged on any error.
    pub fn reconcile<E, D>(
        &mut self,
        kind: &str,
        existing: &mut Vec<E>,
        incoming: &[D],
        mut allocate: impl FnMut() -> FolioResult<String>,
        mut apply: impl FnMut(&mut E, &D) -> FolioResult<()>,
    ) -> FolioResult<()>
    where
        E: NestedEntity,
        D: NestedDto,
    {
        let current: HashSet<&str> = existing.iter().map(|e| e.id()).collect();
        let mut keyed: HashSet<&str> = HashSet::new();
        for key in incoming.iter().filter_map(|d| d.key()) {
            if !current.contains(key) {
                return Err(FolioError::validation(format!("unknown {} id '{}'", kind, key)));
            }
            if !keyed.insert(key) {
                return Err(FolioError::validation(format!(
                    "{} id '{}' appears more than once",
                    kind, key
                )));
            }
        }

        // Ids for key-less items: earlier assignments first, then fresh ones
        let keyless = incoming.iter().filter(|d| d.key().is_none()).count();
        let mut fresh: Vec<String> = self
            .assigned
            .iter()
            .filter(|id| !keyed.contains(id.as_str()))
            .take(keyless)
            .cloned()
            .collect();
        while fresh.len() < keyless {
            let id = allocate()?;
            self.assigned.push(id.clone());
            fresh.push(id);
        }

        let mut fresh = fresh.into_iter();
        let mut next = Vec::with_capacity(incoming.len());
        for dto in incoming {
            let id = match dto.key() {
                Some(key) => key.to_string(),
                None => fresh.next().ok_or_else(|| {
                    FolioError::illegal_state(format!("ran out of assigned {} ids", kind))
                })?,
            };
            let mut entity = existing
                .iter()
                .find(|e| e.id() == id)
                .cloned()
                .unwrap_or_else(|| E::with_id(id));
            apply(&mut entity, dto)?;
            next.push(entity);
        }

        *existing = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: String,
        label: String,
        note: Option<String>,
    }

    impl NestedEntity for Item {
        fn id(&self) -> &str {
            &self.id
        }

        fn with_id(id: String) -> Self {
            Item {
                id,
                label: String::new(),
                note: None,
            }
        }
    }

    #[derive(Debug, Clone)]
    struct ItemDto {
        id: Option<String>,
        label: Option<String>,
    }

    impl NestedDto for ItemDto {
        fn key(&self) -> Option<&str> {
            self.id.as_deref()
        }
    }

    fn item(id: &str, label: &str) -> Item {
        Item {
            id: id.to_string(),
            label: label.to_string(),
            note: Some(format!("note {}", id)),
        }
    }

    fn dto(id: Option<&str>, label: Option<&str>) -> ItemDto {
        ItemDto {
            id: id.map(String::from),
            label: label.map(String::from),
        }
    }

    fn patch(e: &mut Item, d: &ItemDto) -> FolioResult<()> {
        if let Some(label) = &d.label {
            e.label = label.clone();
        }
        Ok(())
    }

    fn counter() -> impl FnMut() -> FolioResult<String> {
        let mut n = 100;
        move || {
            n += 1;
            Ok(n.to_string())
        }
    }

    #[test]
    fn test_update_create_remove() {
        let mut items = vec![item("A", "a"), item("B", "b"), item("C", "c")];
        let incoming = vec![dto(Some("B"), Some("b2")), dto(None, Some("d"))];

        let mut r = Reconciler::new();
        r.reconcile("item", &mut items, &incoming, counter(), patch).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "B");
        assert_eq!(items[0].label, "b2");
        // Untouched fields survive the patch
        assert_eq!(items[0].note.as_deref(), Some("note B"));
        assert_eq!(items[1].id, "101");
        assert_eq!(items[1].label, "d");
        assert!(items.iter().all(|i| i.id != "A" && i.id != "C"));
    }

    #[test]
    fn test_repeat_reuses_assigned_ids() {
        let mut items = vec![item("A", "a")];
        let incoming = vec![dto(Some("A"), None), dto(None, Some("x")), dto(None, Some("y"))];

        let mut r = Reconciler::new();
        let mut alloc = counter();
        r.reconcile("item", &mut items, &incoming, &mut alloc, patch).unwrap();
        let first = items.clone();
        r.reconcile("item", &mut items, &incoming, &mut alloc, patch).unwrap();

        assert_eq!(items, first);
        assert_eq!(r.assigned(), &["101".to_string(), "102".to_string()]);
    }

    #[test]
    fn test_unknown_key_leaves_collection_untouched() {
        let mut items = vec![item("A", "a"), item("B", "b")];
        let before = items.clone();
        let incoming = vec![dto(None, Some("new")), dto(Some("Z"), Some("z"))];

        let mut r = Reconciler::new();
        let err = r
            .reconcile("item", &mut items, &incoming, counter(), patch)
            .unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("unknown item id 'Z'"));
        assert_eq!(items, before);
        // Validation precedes allocation
        assert!(r.assigned().is_empty());
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut items = vec![item("A", "a")];
        let incoming = vec![dto(Some("A"), None), dto(Some("A"), Some("again"))];
        let err = Reconciler::new()
            .reconcile("item", &mut items, &incoming, counter(), patch)
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_allocation_failure_propagates() {
        let mut items = vec![item("A", "a")];
        let before = items.clone();
        let incoming = vec![dto(None, Some("x"))];
        let err = Reconciler::new()
            .reconcile(
                "item",
                &mut items,
                &incoming,
                || Err(FolioError::allocation_failed("items", "store down")),
                patch,
            )
            .unwrap_err();
        assert!(err.is_allocation_failed());
        assert_eq!(items, before);
    }

    #[test]
    fn test_apply_failure_leaves_collection_untouched() {
        let mut items = vec![item("A", "a")];
        let before = items.clone();
        let incoming = vec![dto(Some("A"), Some("bad"))];
        let err = Reconciler::new()
            .reconcile("item", &mut items, &incoming, counter(), |_, _| {
                Err(FolioError::validation("nested problem"))
            })
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(items, before);
    }

    #[test]
    fn test_empty_incoming_clears() {
        let mut items = vec![item("A", "a"), item("B", "b")];
        Reconciler::new()
            .reconcile::<Item, ItemDto>("item", &mut items, &[], counter(), patch)
            .unwrap();
        assert!(items.is_empty());
    }

    proptest! {
        #[test]
        fn reconcile_is_idempotent(
            existing in prop::collection::btree_set(0u8..20, 0..8),
            picks in prop::collection::vec((any::<bool>(), 0usize..8, any::<Option<u8>>()), 0..10),
        ) {
            let mut items: Vec<Item> = existing
                .iter()
                .map(|n| item(&n.to_string(), "orig"))
                .collect();
            let ids: Vec<String> = items.iter().map(|i| i.id.clone()).collect();

            let mut used = HashSet::new();
            let incoming: Vec<ItemDto> = picks
                .into_iter()
                .filter_map(|(keyed, idx, label)| {
                    let label = label.map(|l| l.to_string());
                    if keyed && !ids.is_empty() {
                        let id = ids[idx % ids.len()].clone();
                        used.insert(id.clone()).then(|| ItemDto { id: Some(id), label })
                    } else {
                        Some(ItemDto { id: None, label })
                    }
                })
                .collect();

            let mut r = Reconciler::new();
            let mut alloc = counter();
            r.reconcile("item", &mut items, &incoming, &mut alloc, patch).unwrap();
            let once = items.clone();
            r.reconcile("item", &mut items, &incoming, &mut alloc, patch).unwrap();

            prop_assert_eq!(&items, &once);
            prop_assert_eq!(items.len(), incoming.len());
        }
    }
}
