//! Core types for the Folio entry kernel
//!
//! This crate defines the foundational types shared by every other crate:
//! - FolioError: Error taxonomy (allocation, not-found, conflict, validation, references)
//! - IdContext: Namespace for identifier sequences ("works", "volumes/<work>/<edition>")
//! - EntryReference: Immutable cross-repository pointer (type tag + id + optional version)
//! - Registration: Capability returned by every register call, used to unregister
//! - UpdateEvent: Create/update/delete notification with lazily memoized state

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod entry_ref;
pub mod error;
pub mod event;
pub mod registration;

pub use context::IdContext;
pub use entry_ref::EntryReference;
pub use error::{FolioError, FolioResult};
pub use event::{UpdateAction, UpdateEvent};
pub use registration::Registration;
