//! Document-backed entry repositories
//!
//! A [`Repository`] stores one entry type as JSON documents in one collection
//! of a [`DocumentStore`], allocates new ids from the allocator context named
//! after that collection, and announces every committed write through its
//! [`UpdateNotifier`].
//!
//! Writes go through a [`Draft`]: the working copy an edit command mutates.
//! A draft remembers the document version it was loaded at, and its commit
//! is conditional on that version, so a record deleted or rewritten in the
//! meantime surfaces as `Conflict` instead of being silently overwritten.

use folio_core::{EntryReference, FolioError, FolioResult, IdContext, UpdateEvent};
use folio_ids::IdAllocator;
use folio_storage::{DocumentStore, WriteCondition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::command::CommitHandle;
use crate::notifier::UpdateNotifier;
use crate::resolver::{EntryObject, EntryResolver};

/// A top-level record managed by a repository
pub trait Entry: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Type tag used in references ("work")
    const ENTRY_TYPE: &'static str;

    /// Document collection and id context ("works")
    const COLLECTION: &'static str;

    /// Empty record with an assigned id
    fn blank(id: String) -> Self;

    /// Record id
    fn id(&self) -> &str;
}

impl<E: Entry> EntryObject for E {
    fn entry_type(&self) -> &str {
        E::ENTRY_TYPE
    }

    fn entry_id(&self) -> &str {
        Entry::id(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct RepositoryInner<E: Entry> {
    documents: Arc<dyn DocumentStore>,
    ids: Arc<IdAllocator>,
    notifier: UpdateNotifier<E>,
    context: IdContext,
}

/// Store, id source and notifier for one entry type
pub struct Repository<E: Entry> {
    inner: Arc<RepositoryInner<E>>,
}

impl<E: Entry> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Repository {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Entry> Repository<E> {
    /// Create a repository
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        ids: Arc<IdAllocator>,
        notifier: UpdateNotifier<E>,
    ) -> FolioResult<Self> {
        Ok(Repository {
            inner: Arc::new(RepositoryInner {
                documents,
                ids,
                notifier,
                context: IdContext::new(E::COLLECTION)?,
            }),
        })
    }

    /// Entry by id, `None` if absent
    pub fn get(&self, id: &str) -> FolioResult<Option<E>> {
        Ok(self.load_versioned(id)?.map(|(entry, _)| entry))
    }

    /// Entry by id, `NotFound` if absent
    pub fn load(&self, id: &str) -> FolioResult<E> {
        self.get(id)?
            .ok_or_else(|| FolioError::not_found(E::ENTRY_TYPE, id))
    }

    /// Every stored entry, ordered by id
    pub fn list(&self) -> FolioResult<Vec<E>> {
        self.inner
            .documents
            .list(E::COLLECTION)?
            .into_iter()
            .map(|(_, doc)| serde_json::from_value(doc.body).map_err(FolioError::from))
            .collect()
    }

    /// Remove an entry and publish a delete event
    ///
    /// Returns the removed entry. Fails with `NotFound` if it does not exist
    /// and `Conflict` if it changed while being removed.
    pub fn delete(&self, id: &str) -> FolioResult<E> {
        let (entry, version) = self
            .load_versioned(id)?
            .ok_or_else(|| FolioError::not_found(E::ENTRY_TYPE, id))?;

        if !self
            .inner
            .documents
            .delete(E::COLLECTION, id, WriteCondition::MatchVersion(version))?
        {
            return Err(FolioError::conflict(
                E::ENTRY_TYPE,
                id,
                "document was deleted concurrently",
            ));
        }
        debug!(target: "folio::command", entry_type = E::ENTRY_TYPE, id, "entry deleted");

        self.publish(UpdateEvent::deleted(id, entry.clone()));
        Ok(entry)
    }

    /// Working copy for a new entry with a freshly allocated id
    pub fn draft_new(&self) -> FolioResult<Draft<E>> {
        let id = self.inner.ids.id_factory(&self.inner.context).next()?;
        Ok(Draft {
            repo: self.clone(),
            working: E::blank(id),
            original: None,
            deferred: None,
        })
    }

    /// Working copy of an existing entry, `NotFound` if absent
    pub fn draft_existing(&self, id: &str) -> FolioResult<Draft<E>> {
        let (entry, version) = self
            .load_versioned(id)?
            .ok_or_else(|| FolioError::not_found(E::ENTRY_TYPE, id))?;
        Ok(Draft {
            repo: self.clone(),
            working: entry.clone(),
            original: Some((entry, version)),
            deferred: None,
        })
    }

    /// Notifier announcing this repository's writes
    pub fn notifier(&self) -> &UpdateNotifier<E> {
        &self.inner.notifier
    }

    /// Allocator shared with nested id contexts
    pub fn ids(&self) -> &Arc<IdAllocator> {
        &self.inner.ids
    }

    /// Context new entry ids are drawn from
    pub fn context(&self) -> &IdContext {
        &self.inner.context
    }

    /// Stored document version of an entry
    pub fn version_of(&self, id: &str) -> FolioResult<Option<u64>> {
        Ok(self.load_versioned(id)?.map(|(_, version)| version))
    }

    fn load_versioned(&self, id: &str) -> FolioResult<Option<(E, u64)>> {
        match self.inner.documents.load(E::COLLECTION, id)? {
            Some(doc) => Ok(Some((serde_json::from_value(doc.body)?, doc.version))),
            None => Ok(None),
        }
    }

    fn save(&self, draft_id: &str, entry: &E, condition: WriteCondition) -> FolioResult<u64> {
        let body = serde_json::to_value(entry)?;
        self.inner
            .documents
            .save(E::COLLECTION, draft_id, body, condition)
    }

    // Writes are already durable here; listeners cannot undo them
    fn publish(&self, event: UpdateEvent<E>) {
        let id = event.entity_id().to_string();
        let action = event.action();
        if let Err(e) = self.inner.notifier.after(event) {
            warn!(
                target: "folio::command",
                entry_type = E::ENTRY_TYPE,
                id = %id,
                action = %action,
                error = %e,
                "update committed but not announced"
            );
        }
    }
}

impl<E: Entry> std::fmt::Debug for Repository<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("entry_type", &E::ENTRY_TYPE)
            .field("collection", &E::COLLECTION)
            .finish()
    }
}

/// Working copy of one entry, committed by an edit command
pub struct Draft<E: Entry> {
    repo: Repository<E>,
    working: E,
    original: Option<(E, u64)>,
    deferred: Option<FolioError>,
}

impl<E: Entry> Draft<E> {
    /// Id of the entry
    pub fn id(&self) -> &str {
        self.working.id()
    }

    /// Whether the commit creates the entry
    pub fn is_new(&self) -> bool {
        self.original.is_none()
    }

    /// The working copy
    pub fn working(&self) -> &E {
        &self.working
    }

    /// The working copy, mutably
    pub fn working_mut(&mut self) -> &mut E {
        &mut self.working
    }

    /// The working copy together with the deferred-failure slot
    ///
    /// Lets sub-mutators that borrow part of the working copy still fail the
    /// commit.
    pub fn working_and_deferred(&mut self) -> (&mut E, &mut Option<FolioError>) {
        (&mut self.working, &mut self.deferred)
    }

    /// The entry as loaded, `None` for new entries
    pub fn original(&self) -> Option<&E> {
        self.original.as_ref().map(|(entry, _)| entry)
    }

    /// Repository the draft commits to
    pub fn repository(&self) -> &Repository<E> {
        &self.repo
    }

    /// Record a failure to be reported by `commit`; the first one wins
    pub fn defer(&mut self, error: FolioError) {
        if self.deferred.is_none() {
            self.deferred = Some(error);
        }
    }

    /// Record the error of a fallible step, if any
    pub fn defer_result(&mut self, result: FolioResult<()>) {
        if let Err(e) = result {
            self.defer(e);
        }
    }

    /// Failure recorded so far
    pub fn deferred(&self) -> Option<&FolioError> {
        self.deferred.as_ref()
    }

    /// Persist the working copy and publish the event
    ///
    /// Creates require that no document exists under the id; edits require
    /// the document to still be at the version it was loaded at.
    pub fn commit(self) -> CommitHandle<String> {
        let Draft {
            repo,
            working,
            original,
            deferred,
        } = self;

        if let Some(error) = deferred {
            debug!(
                target: "folio::command",
                entry_type = E::ENTRY_TYPE,
                id = working.id(),
                error = %error,
                "commit rejected"
            );
            return CommitHandle::failed(error);
        }

        CommitHandle::spawn(move || {
            let id = working.id().to_string();
            let (condition, event) = match original {
                None => (
                    WriteCondition::MustNotExist,
                    UpdateEvent::created(id.clone(), working.clone()),
                ),
                Some((before, version)) => (
                    WriteCondition::MatchVersion(version),
                    UpdateEvent::updated(id.clone(), before, working.clone()),
                ),
            };

            let version = repo.save(&id, &working, condition)?;
            debug!(
                target: "folio::command",
                entry_type = E::ENTRY_TYPE,
                id = %id,
                version,
                action = %event.action(),
                "entry committed"
            );

            repo.publish(event);
            Ok(id)
        })
    }
}

impl<E: Entry> std::fmt::Debug for Draft<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Draft")
            .field("working", &self.working)
            .field("is_new", &self.is_new())
            .field("deferred", &self.deferred)
            .finish()
    }
}

/// Resolver serving one entry type from its repository
pub struct RepositoryResolver<E: Entry> {
    repo: Repository<E>,
    name: String,
}

impl<E: Entry> RepositoryResolver<E> {
    /// Wrap a repository
    pub fn new(repo: Repository<E>) -> Self {
        RepositoryResolver {
            name: format!("{}-repository", E::ENTRY_TYPE),
            repo,
        }
    }
}

impl<E: Entry> EntryResolver for RepositoryResolver<E> {
    fn name(&self) -> &str {
        &self.name
    }

    fn entry_types(&self) -> Vec<String> {
        vec![E::ENTRY_TYPE.to_string()]
    }

    fn resolve(&self, reference: &EntryReference) -> FolioResult<Arc<dyn EntryObject>> {
        let (entry, version) = self
            .repo
            .load_versioned(reference.id())?
            .ok_or_else(|| FolioError::not_found(E::ENTRY_TYPE, reference.id()))?;

        if let Some(pinned) = reference.version() {
            if pinned != version {
                return Err(FolioError::conflict(
                    E::ENTRY_TYPE,
                    reference.id(),
                    format!("reference pins version {}, current is {}", pinned, version),
                ));
            }
        }
        Ok(Arc::new(entry))
    }
}
