//! Biographical records

use folio_core::FolioResult;
use serde::{Deserialize, Serialize};

use crate::command::{CommitHandle, EditCommand};
use crate::repository::{Draft, Entry, Repository};

/// A person: author, editor, translator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    /// Person id
    pub id: String,
    /// Name as usually displayed
    #[serde(default)]
    pub display_name: String,
    /// Given name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    /// Family name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    /// Birth date as recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    /// Death date as recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub death_date: Option<String>,
    /// Short biography
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Entry for Person {
    const ENTRY_TYPE: &'static str = "person";
    const COLLECTION: &'static str = "people";

    fn blank(id: String) -> Self {
        Person {
            id,
            display_name: String::new(),
            given_name: None,
            family_name: None,
            birth_date: None,
            death_date: None,
            summary: None,
        }
    }

    fn id(&self) -> &str {
        &self.id
    }
}

/// Patch for a person; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonDto {
    /// New display name
    pub display_name: Option<String>,
    /// New given name
    pub given_name: Option<String>,
    /// New family name
    pub family_name: Option<String>,
    /// New birth date
    pub birth_date: Option<String>,
    /// New death date
    pub death_date: Option<String>,
    /// New biography
    pub summary: Option<String>,
}

/// Person repository
#[derive(Debug, Clone)]
pub struct PersonRepository {
    repo: Repository<Person>,
}

impl PersonRepository {
    /// Wrap a generic repository
    pub fn new(repo: Repository<Person>) -> Self {
        PersonRepository { repo }
    }

    /// Command creating a new person
    pub fn create(&self) -> FolioResult<EditPersonCommand> {
        Ok(EditPersonCommand {
            draft: self.repo.draft_new()?,
        })
    }

    /// Command editing an existing person, `NotFound` if absent
    pub fn edit(&self, id: &str) -> FolioResult<EditPersonCommand> {
        Ok(EditPersonCommand {
            draft: self.repo.draft_existing(id)?,
        })
    }

    /// Person by id
    pub fn get(&self, id: &str) -> FolioResult<Option<Person>> {
        self.repo.get(id)
    }

    /// Person by id, `NotFound` if absent
    pub fn load(&self, id: &str) -> FolioResult<Person> {
        self.repo.load(id)
    }

    /// Every person
    pub fn list(&self) -> FolioResult<Vec<Person>> {
        self.repo.list()
    }

    /// Remove a person and announce it
    pub fn delete(&self, id: &str) -> FolioResult<Person> {
        self.repo.delete(id)
    }

    /// Underlying generic repository
    pub fn repository(&self) -> &Repository<Person> {
        &self.repo
    }
}

/// Staged edit of a person
#[derive(Debug)]
pub struct EditPersonCommand {
    draft: Draft<Person>,
}

impl EditPersonCommand {
    /// The working copy
    pub fn person(&self) -> &Person {
        self.draft.working()
    }

    /// Set the display name
    pub fn set_display_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.draft.working_mut().display_name = name.into();
        self
    }

    /// Set the given name
    pub fn set_given_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.draft.working_mut().given_name = Some(name.into());
        self
    }

    /// Set the family name
    pub fn set_family_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.draft.working_mut().family_name = Some(name.into());
        self
    }

    /// Set the birth date
    pub fn set_birth_date(&mut self, date: impl Into<String>) -> &mut Self {
        self.draft.working_mut().birth_date = Some(date.into());
        self
    }

    /// Set the death date
    pub fn set_death_date(&mut self, date: impl Into<String>) -> &mut Self {
        self.draft.working_mut().death_date = Some(date.into());
        self
    }

    /// Set the biography
    pub fn set_summary(&mut self, summary: impl Into<String>) -> &mut Self {
        self.draft.working_mut().summary = Some(summary.into());
        self
    }
}

impl EditCommand for EditPersonCommand {
    type Dto = PersonDto;
    type Output = String;

    fn id(&self) -> &str {
        self.draft.id()
    }

    fn is_new(&self) -> bool {
        self.draft.is_new()
    }

    fn set_all(&mut self, dto: &PersonDto) -> &mut Self {
        if let Some(v) = &dto.display_name {
            self.set_display_name(v.as_str());
        }
        if let Some(v) = &dto.given_name {
            self.set_given_name(v.as_str());
        }
        if let Some(v) = &dto.family_name {
            self.set_family_name(v.as_str());
        }
        if let Some(v) = &dto.birth_date {
            self.set_birth_date(v.as_str());
        }
        if let Some(v) = &dto.death_date {
            self.set_death_date(v.as_str());
        }
        if let Some(v) = &dto.summary {
            self.set_summary(v.as_str());
        }
        self
    }

    fn execute(self) -> CommitHandle<String> {
        self.draft.commit()
    }
}
