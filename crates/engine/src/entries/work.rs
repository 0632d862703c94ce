//! Works, their editions and the volumes of each edition
//!
//! Editions and volumes live inside the work document. Their ids come from
//! composite allocator contexts scoped to the parent: `editions/<work>` and
//! `volumes/<work>/<edition>`.

use folio_core::{EntryReference, FolioError, FolioResult, IdContext};
use folio_ids::IdAllocator;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::command::{CommitHandle, EditCommand};
use crate::reconcile::{NestedDto, NestedEntity, Reconciler};
use crate::repository::{Draft, Entry, Repository};

/// A creative work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Work {
    /// Work id
    pub id: String,
    /// Display title
    #[serde(default)]
    pub title: String,
    /// Short description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Authors, usually `person` references
    #[serde(default)]
    pub authors: Vec<EntryReference>,
    /// Published editions
    #[serde(default)]
    pub editions: Vec<Edition>,
}

/// One published edition of a work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edition {
    /// Edition id, unique within the work
    pub id: String,
    /// Edition title, if it differs from the work's
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Publisher
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    /// Publication date as printed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Physical volumes
    #[serde(default)]
    pub volumes: Vec<Volume>,
}

/// One volume of an edition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Volume id, unique within the edition
    pub id: String,
    /// Volume title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Contents note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Entry for Work {
    const ENTRY_TYPE: &'static str = "work";
    const COLLECTION: &'static str = "works";

    fn blank(id: String) -> Self {
        Work {
            id,
            title: String::new(),
            summary: None,
            authors: Vec::new(),
            editions: Vec::new(),
        }
    }

    fn id(&self) -> &str {
        &self.id
    }
}

impl NestedEntity for Edition {
    fn id(&self) -> &str {
        &self.id
    }

    fn with_id(id: String) -> Self {
        Edition {
            id,
            title: None,
            publisher: None,
            date: None,
            volumes: Vec::new(),
        }
    }
}

impl NestedEntity for Volume {
    fn id(&self) -> &str {
        &self.id
    }

    fn with_id(id: String) -> Self {
        Volume {
            id,
            title: None,
            summary: None,
        }
    }
}

/// Patch for a work; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkDto {
    /// New title
    pub title: Option<String>,
    /// New summary
    pub summary: Option<String>,
    /// Replacement author list
    pub authors: Option<Vec<EntryReference>>,
    /// Complete edition set, reconciled by id
    pub editions: Option<Vec<EditionDto>>,
}

/// Patch for an edition; without `id` it describes a new edition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditionDto {
    /// Existing edition id
    pub id: Option<String>,
    /// New title
    pub title: Option<String>,
    /// New publisher
    pub publisher: Option<String>,
    /// New date
    pub date: Option<String>,
    /// Complete volume set, reconciled by id
    pub volumes: Option<Vec<VolumeDto>>,
}

/// Patch for a volume; without `id` it describes a new volume
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeDto {
    /// Existing volume id
    pub id: Option<String>,
    /// New title
    pub title: Option<String>,
    /// New summary
    pub summary: Option<String>,
}

impl NestedDto for EditionDto {
    fn key(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl NestedDto for VolumeDto {
    fn key(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

fn editions_context(work_id: &str) -> FolioResult<IdContext> {
    IdContext::new("editions")?.child(work_id)
}

fn volumes_context(work_id: &str, edition_id: &str) -> FolioResult<IdContext> {
    IdContext::new("volumes")?.child(work_id)?.child(edition_id)
}

fn apply_volume(volume: &mut Volume, dto: &VolumeDto) {
    if let Some(title) = &dto.title {
        volume.title = Some(title.clone());
    }
    if let Some(summary) = &dto.summary {
        volume.summary = Some(summary.clone());
    }
}

fn apply_edition(
    ids: &IdAllocator,
    work_id: &str,
    volumes: &mut Reconciler,
    edition: &mut Edition,
    dto: &EditionDto,
) -> FolioResult<()> {
    if let Some(title) = &dto.title {
        edition.title = Some(title.clone());
    }
    if let Some(publisher) = &dto.publisher {
        edition.publisher = Some(publisher.clone());
    }
    if let Some(date) = &dto.date {
        edition.date = Some(date.clone());
    }
    if let Some(incoming) = &dto.volumes {
        let context = volumes_context(work_id, &edition.id)?;
        volumes.reconcile(
            "volume",
            &mut edition.volumes,
            incoming,
            || ids.next(&context),
            |volume, dto| {
                apply_volume(volume, dto);
                Ok(())
            },
        )?;
    }
    Ok(())
}

/// Work repository
#[derive(Debug, Clone)]
pub struct WorkRepository {
    repo: Repository<Work>,
}

impl WorkRepository {
    /// Wrap a generic repository
    pub fn new(repo: Repository<Work>) -> Self {
        WorkRepository { repo }
    }

    /// Command creating a new work; its id is allocated now
    pub fn create(&self) -> FolioResult<EditWorkCommand> {
        Ok(EditWorkCommand::new(self.repo.draft_new()?))
    }

    /// Command editing an existing work, `NotFound` if absent
    pub fn edit(&self, id: &str) -> FolioResult<EditWorkCommand> {
        Ok(EditWorkCommand::new(self.repo.draft_existing(id)?))
    }

    /// Work by id
    pub fn get(&self, id: &str) -> FolioResult<Option<Work>> {
        self.repo.get(id)
    }

    /// Work by id, `NotFound` if absent
    pub fn load(&self, id: &str) -> FolioResult<Work> {
        self.repo.load(id)
    }

    /// Every work
    pub fn list(&self) -> FolioResult<Vec<Work>> {
        self.repo.list()
    }

    /// Remove a work and announce it
    pub fn delete(&self, id: &str) -> FolioResult<Work> {
        self.repo.delete(id)
    }

    /// Underlying generic repository
    pub fn repository(&self) -> &Repository<Work> {
        &self.repo
    }
}

/// Staged edit of a work and its nested editions and volumes
pub struct EditWorkCommand {
    draft: Draft<Work>,
    ids: Arc<IdAllocator>,
    editions: Reconciler,
    /// Volume reconcilers by edition id
    volumes: HashMap<String, Reconciler>,
}

impl EditWorkCommand {
    fn new(draft: Draft<Work>) -> Self {
        EditWorkCommand {
            ids: Arc::clone(draft.repository().ids()),
            draft,
            editions: Reconciler::new(),
            volumes: HashMap::new(),
        }
    }

    /// The working copy
    pub fn work(&self) -> &Work {
        self.draft.working()
    }

    /// The work as loaded, `None` when creating
    pub fn original(&self) -> Option<&Work> {
        self.draft.original()
    }

    /// Set the title
    pub fn set_title(&mut self, title: impl Into<String>) -> &mut Self {
        self.draft.working_mut().title = title.into();
        self
    }

    /// Set the summary
    pub fn set_summary(&mut self, summary: impl Into<String>) -> &mut Self {
        self.draft.working_mut().summary = Some(summary.into());
        self
    }

    /// Replace the author list
    pub fn set_authors(&mut self, authors: Vec<EntryReference>) -> &mut Self {
        self.draft.working_mut().authors = authors;
        self
    }

    /// Append an author unless already listed
    pub fn add_author(&mut self, author: EntryReference) -> &mut Self {
        let authors = &mut self.draft.working_mut().authors;
        if !authors.contains(&author) {
            authors.push(author);
        }
        self
    }

    /// Add a new edition with a freshly allocated id
    ///
    /// An allocation failure is returned and also fails `execute`.
    pub fn create_edition(&mut self) -> FolioResult<EditionMutator<'_>> {
        let work_id = self.draft.id().to_string();
        let allocated = editions_context(&work_id).and_then(|ctx| self.ids.next(&ctx));
        let id = match allocated {
            Ok(id) => id,
            Err(e) => {
                self.draft.defer(e.clone());
                return Err(e);
            }
        };

        let (work, deferred) = self.draft.working_and_deferred();
        work.editions.push(Edition::with_id(id.clone()));
        let edition = work
            .editions
            .last_mut()
            .ok_or_else(|| FolioError::illegal_state("edition vanished after insert"))?;
        Ok(EditionMutator {
            work_id,
            edition,
            ids: &self.ids,
            volumes: self.volumes.entry(id).or_default(),
            deferred,
        })
    }

    /// Mutator for an existing edition
    ///
    /// An unknown id is a `ValidationFailed`, returned here and by `execute`.
    pub fn edit_edition(&mut self, edition_id: &str) -> FolioResult<EditionMutator<'_>> {
        let work_id = self.draft.id().to_string();
        let found = self
            .draft
            .working()
            .editions
            .iter()
            .position(|e| e.id == edition_id);
        let Some(index) = found else {
            let e = FolioError::validation(format!(
                "unknown edition id '{}' in work '{}'",
                edition_id, work_id
            ));
            self.draft.defer(e.clone());
            return Err(e);
        };

        let (work, deferred) = self.draft.working_and_deferred();
        Ok(EditionMutator {
            work_id,
            edition: &mut work.editions[index],
            ids: &self.ids,
            volumes: self.volumes.entry(edition_id.to_string()).or_default(),
            deferred,
        })
    }

    /// Remove an edition and its volumes; `false` if it was not present
    pub fn remove_edition(&mut self, edition_id: &str) -> bool {
        let editions = &mut self.draft.working_mut().editions;
        let before = editions.len();
        editions.retain(|e| e.id != edition_id);
        self.volumes.remove(edition_id);
        editions.len() != before
    }

    fn apply(&mut self, dto: &WorkDto) -> FolioResult<()> {
        let work_id = self.draft.id().to_string();
        let ids = &self.ids;
        let volumes = &mut self.volumes;
        let work = self.draft.working_mut();

        if let Some(title) = &dto.title {
            work.title = title.clone();
        }
        if let Some(summary) = &dto.summary {
            work.summary = Some(summary.clone());
        }
        if let Some(authors) = &dto.authors {
            work.authors = authors.clone();
        }
        if let Some(incoming) = &dto.editions {
            let context = editions_context(&work_id)?;
            self.editions.reconcile(
                "edition",
                &mut work.editions,
                incoming,
                || ids.next(&context),
                |edition, dto| {
                    let reconciler = volumes.entry(edition.id.clone()).or_default();
                    apply_edition(ids, &work_id, reconciler, edition, dto)
                },
            )?;
            volumes.retain(|id, _| work.editions.iter().any(|e| &e.id == id));
        }
        Ok(())
    }
}

impl EditCommand for EditWorkCommand {
    type Dto = WorkDto;
    type Output = String;

    fn id(&self) -> &str {
        self.draft.id()
    }

    fn is_new(&self) -> bool {
        self.draft.is_new()
    }

    fn set_all(&mut self, dto: &WorkDto) -> &mut Self {
        let result = self.apply(dto);
        self.draft.defer_result(result);
        self
    }

    fn execute(self) -> CommitHandle<String> {
        self.draft.commit()
    }
}

impl std::fmt::Debug for EditWorkCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditWorkCommand")
            .field("draft", &self.draft)
            .finish()
    }
}

/// Setter surface for one edition inside an [`EditWorkCommand`]
///
/// Writes go to the command's working copy; nothing is committed here.
/// Failures are returned and also recorded on the command, so `execute`
/// reports them even if the caller ignored them.
pub struct EditionMutator<'a> {
    work_id: String,
    edition: &'a mut Edition,
    ids: &'a IdAllocator,
    volumes: &'a mut Reconciler,
    deferred: &'a mut Option<FolioError>,
}

impl<'a> EditionMutator<'a> {
    /// Edition id
    pub fn id(&self) -> &str {
        &self.edition.id
    }

    // First failure wins, as on the command itself
    fn defer(&mut self, error: FolioError) -> FolioError {
        if self.deferred.is_none() {
            *self.deferred = Some(error.clone());
        }
        error
    }

    /// Current state of the edition
    pub fn edition(&self) -> &Edition {
        self.edition
    }

    /// Set the title
    pub fn set_title(&mut self, title: impl Into<String>) -> &mut Self {
        self.edition.title = Some(title.into());
        self
    }

    /// Set the publisher
    pub fn set_publisher(&mut self, publisher: impl Into<String>) -> &mut Self {
        self.edition.publisher = Some(publisher.into());
        self
    }

    /// Set the publication date
    pub fn set_date(&mut self, date: impl Into<String>) -> &mut Self {
        self.edition.date = Some(date.into());
        self
    }

    /// Add a new volume with a freshly allocated id
    pub fn create_volume(&mut self) -> FolioResult<VolumeMutator<'_>> {
        let allocated = volumes_context(&self.work_id, &self.edition.id)
            .and_then(|ctx| self.ids.next(&ctx));
        let id = match allocated {
            Ok(id) => id,
            Err(e) => return Err(self.defer(e)),
        };
        self.edition.volumes.push(Volume::with_id(id));
        let volume = self
            .edition
            .volumes
            .last_mut()
            .ok_or_else(|| FolioError::illegal_state("volume vanished after insert"))?;
        Ok(VolumeMutator { volume })
    }

    /// Mutator for an existing volume
    ///
    /// An unknown id is a `ValidationFailed`, returned here and by `execute`.
    pub fn edit_volume(&mut self, volume_id: &str) -> FolioResult<VolumeMutator<'_>> {
        let found = self.edition.volumes.iter().position(|v| v.id == volume_id);
        let Some(index) = found else {
            let e = FolioError::validation(format!(
                "unknown volume id '{}' in edition '{}'",
                volume_id, self.edition.id
            ));
            return Err(self.defer(e));
        };
        Ok(VolumeMutator {
            volume: &mut self.edition.volumes[index],
        })
    }

    /// Remove a volume; `false` if it was not present
    pub fn remove_volume(&mut self, volume_id: &str) -> bool {
        let before = self.edition.volumes.len();
        self.edition.volumes.retain(|v| v.id != volume_id);
        self.edition.volumes.len() != before
    }

    /// Apply every present field of `dto`; its `id` is ignored
    pub fn set_all(&mut self, dto: &EditionDto) -> FolioResult<&mut Self> {
        if let Err(e) = apply_edition(self.ids, &self.work_id, self.volumes, self.edition, dto) {
            return Err(self.defer(e));
        }
        Ok(self)
    }
}

/// Setter surface for one volume
pub struct VolumeMutator<'a> {
    volume: &'a mut Volume,
}

impl<'a> VolumeMutator<'a> {
    /// Volume id
    pub fn id(&self) -> &str {
        &self.volume.id
    }

    /// Set the title
    pub fn set_title(&mut self, title: impl Into<String>) -> &mut Self {
        self.volume.title = Some(title.into());
        self
    }

    /// Set the summary
    pub fn set_summary(&mut self, summary: impl Into<String>) -> &mut Self {
        self.volume.summary = Some(summary.into());
        self
    }

    /// Apply every present field of `dto`; its `id` is ignored
    pub fn set_all(&mut self, dto: &VolumeDto) -> &mut Self {
        apply_volume(self.volume, dto);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchPool;
    use crate::notifier::UpdateNotifier;
    use folio_ids::AllocatorConfig;
    use folio_storage::{MemoryCounterStore, MemoryDocumentStore};

    fn works() -> WorkRepository {
        let ids = IdAllocator::new(Arc::new(MemoryCounterStore::new()), AllocatorConfig::default())
            .unwrap();
        let notifier = UpdateNotifier::new("work", Arc::new(DispatchPool::new(1, 16)));
        WorkRepository::new(
            Repository::new(Arc::new(MemoryDocumentStore::new()), Arc::new(ids), notifier)
                .unwrap(),
        )
    }

    fn run(handle: CommitHandle<String>) -> FolioResult<String> {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(handle)
    }

    #[test]
    fn test_nested_ids_use_parent_contexts() {
        let repo = works();
        let mut cmd = repo.create().unwrap();
        assert_eq!(cmd.id(), "1");

        let first = cmd.create_edition().unwrap().id().to_string();
        let second = cmd.create_edition().unwrap().id().to_string();
        assert_eq!((first.as_str(), second.as_str()), ("1", "2"));

        {
            let mut edition = cmd.edit_edition("2").unwrap();
            assert_eq!(edition.create_volume().unwrap().id(), "1");
            assert_eq!(edition.create_volume().unwrap().id(), "2");
        }
        // Volume contexts are per edition
        assert_eq!(
            cmd.edit_edition("1").unwrap().create_volume().unwrap().id(),
            "1"
        );

        let stats = repo.repository().ids().stats();
        let contexts: Vec<&str> = stats.iter().map(|s| s.context.as_str()).collect();
        assert_eq!(
            contexts,
            vec!["editions/1", "volumes/1/1", "volumes/1/2", "works"]
        );
    }

    #[test]
    fn test_setters_and_mutators_share_working_copy() {
        let repo = works();
        let mut cmd = repo.create().unwrap();
        cmd.set_title("Foo").add_author(EntryReference::new("person", "3"));
        cmd.add_author(EntryReference::new("person", "3"));
        cmd.create_edition()
            .unwrap()
            .set_publisher("Penguin")
            .set_date("1999");

        let work = cmd.work();
        assert_eq!(work.title, "Foo");
        assert_eq!(work.authors.len(), 1);
        assert_eq!(work.editions[0].publisher.as_deref(), Some("Penguin"));
        assert_eq!(work.editions[0].date.as_deref(), Some("1999"));
    }

    #[test]
    fn test_unknown_edition_poisons_command() {
        let repo = works();
        let id = run(repo.create().unwrap().execute()).unwrap();

        let mut cmd = repo.edit(&id).unwrap();
        assert!(cmd.edit_edition("42").err().unwrap().is_validation());
        cmd.set_title("ignored");
        assert!(run(cmd.execute()).unwrap_err().is_validation());
        assert_eq!(repo.load(&id).unwrap().title, "");
    }

    #[test]
    fn test_unknown_volume_rejected() {
        let repo = works();
        let mut cmd = repo.create().unwrap();
        {
            let mut edition = cmd.create_edition().unwrap();
            assert!(edition.edit_volume("9").err().unwrap().is_validation());
            let vid = edition.create_volume().unwrap().id().to_string();
            edition.edit_volume(&vid).unwrap().set_title("Vol. I");
            assert_eq!(edition.edition().volumes[0].title.as_deref(), Some("Vol. I"));
        }
        assert!(run(cmd.execute()).unwrap_err().is_validation());
        assert!(repo.list().unwrap().is_empty());
    }

    #[test]
    fn test_remove_edition_and_volume() {
        let repo = works();
        let mut cmd = repo.create().unwrap();
        cmd.create_edition().unwrap();
        {
            let mut e = cmd.create_edition().unwrap();
            let v = e.create_volume().unwrap().id().to_string();
            assert!(e.remove_volume(&v));
            assert!(!e.remove_volume(&v));
        }
        assert!(cmd.remove_edition("1"));
        assert!(!cmd.remove_edition("1"));
        assert_eq!(cmd.work().editions.len(), 1);
        assert_eq!(cmd.work().editions[0].id, "2");
    }

    #[test]
    fn test_set_all_patches_only_present_fields() {
        let repo = works();
        let mut cmd = repo.create().unwrap();
        cmd.set_title("Foo").set_summary("old");

        let dto = WorkDto {
            summary: Some("new".into()),
            ..Default::default()
        };
        cmd.set_all(&dto).set_all(&dto);
        assert_eq!(cmd.work().title, "Foo");
        assert_eq!(cmd.work().summary.as_deref(), Some("new"));
    }

    #[test]
    fn test_edition_set_all_reconciles_volumes() {
        let repo = works();
        let mut cmd = repo.create().unwrap();
        let mut edition = cmd.create_edition().unwrap();
        edition.create_volume().unwrap().set_title("one");
        edition.create_volume().unwrap().set_title("two");

        let dto = EditionDto {
            publisher: Some("Faber".into()),
            volumes: Some(vec![
                VolumeDto {
                    id: Some("2".into()),
                    summary: Some("second".into()),
                    ..Default::default()
                },
                VolumeDto {
                    title: Some("three".into()),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        };
        edition.set_all(&dto).unwrap();
        edition.set_all(&dto).unwrap();

        let e = edition.edition();
        assert_eq!(e.publisher.as_deref(), Some("Faber"));
        let volumes: Vec<(&str, Option<&str>)> = e
            .volumes
            .iter()
            .map(|v| (v.id.as_str(), v.title.as_deref()))
            .collect();
        assert_eq!(volumes, vec![("2", Some("two")), ("3", Some("three"))]);
        assert_eq!(e.volumes[0].summary.as_deref(), Some("second"));
    }

    #[test]
    fn test_serialized_shape() {
        let mut work = Work::blank("7".into());
        work.title = "Foo".into();
        work.editions.push(Edition::with_id("1".into()));
        let json = serde_json::to_value(&work).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "7",
                "title": "Foo",
                "authors": [],
                "editions": [{ "id": "1", "volumes": [] }]
            })
        );
        let back: Work = serde_json::from_value(json).unwrap();
        assert_eq!(back, work);
    }
}
