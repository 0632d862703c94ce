//! Storage layer for Folio
//!
//! This crate defines the two persistence seams the kernel commits through
//! and ships in-memory backends for them:
//! - CounterStore: per-context `next_id` rows with compare-and-set updates
//!   (grant allocation)
//! - DocumentStore: versioned JSON documents grouped in collections
//!   (edit command commits)
//! - MemoryCounterStore / MemoryDocumentStore: DashMap-sharded in-process backends
//! - testing: fault-injecting wrappers for outage and race simulation
//!
//! Schema creation and the relational mapping of these traits are provided
//! by the host application.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod testing;
pub mod traits;

pub use memory::{MemoryCounterStore, MemoryDocumentStore};
pub use traits::{CounterStore, DocumentStore, StoredDocument, WriteCondition};
