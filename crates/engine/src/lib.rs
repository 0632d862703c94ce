//! Edit commands, update notification and entry resolution for Folio
//!
//! This crate builds the entry-facing half of the kernel on top of
//! `folio-ids` and `folio-storage`:
//! - command: the staged-mutation protocol and the `CommitHandle` future
//! - reconcile: key-based reconciliation of nested collections
//! - repository: document-backed repositories, drafts and their resolver
//! - entries: the `Work` and `Person` entry types with their commands
//! - dispatch: bounded worker pool running listener callbacks
//! - notifier: copy-on-write publish/subscribe for update events
//! - resolver: type-tag dispatch between references and live entries
//! - config: `folio.toml`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod config;
pub mod dispatch;
pub mod entries;
pub mod notifier;
pub mod reconcile;
pub mod repository;
pub mod resolver;

pub use command::{CommitHandle, EditCommand};
pub use config::{FolioConfig, NotifierConfig, ResolverConfig, CONFIG_FILE_NAME};
pub use dispatch::{DispatchError, DispatchPool, PoolStats, ShutdownReport};
pub use entries::{
    EditPersonCommand, EditWorkCommand, Edition, EditionDto, EditionMutator, Person, PersonDto,
    PersonRepository, Volume, VolumeDto, VolumeMutator, Work, WorkDto, WorkRepository,
};
pub use notifier::{UpdateListener, UpdateNotifier};
pub use reconcile::{NestedDto, NestedEntity, Reconciler};
pub use repository::{Draft, Entry, Repository, RepositoryResolver};
pub use resolver::{EntryObject, EntryResolver, EntryResolverRegistry, TOKEN_SEPARATOR};
