//! Identifier allocation for Folio
//!
//! Ids are handed out per [`IdContext`](folio_core::IdContext) from
//! exclusively owned, contiguous ranges ("grants") reserved in a persistent
//! [`CounterStore`](folio_storage::CounterStore). Reserving a batch at a time
//! keeps round trips to the store rare; the compare-and-set reservation keeps
//! concurrent allocators (threads or processes) from ever sharing a range.
//!
//! ## Components
//!
//! - [`IdAllocator`]: lazily creates one generator per context
//! - [`IdGenerator`]: serializes `next()` for a single context, renews grants
//! - [`IdGrant`]: half-open range `[initial, limit)` consumed sequentially
//! - [`IdFactory`]: cheap handle bound to one context, encodes issued ids
//! - [`IdEncoder`]: plain decimal or reversible obfuscation
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//! use folio_ids::{AllocatorConfig, IdAllocator};
//! use folio_storage::MemoryCounterStore;
//!
//! let allocator = IdAllocator::new(
//!     Arc::new(MemoryCounterStore::new()),
//!     AllocatorConfig::default(),
//! ).unwrap();
//!
//! let works = allocator.id_factory_named("works").unwrap();
//! assert_eq!(works.next().unwrap(), "1");
//! assert_eq!(works.next().unwrap(), "2");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod allocator;
pub mod encoder;
pub mod generator;
pub mod grant;

pub use allocator::{AllocatorConfig, ContextStats, IdAllocator, IdFactory};
pub use encoder::{IdEncoder, ObfuscatingEncoder, PlainEncoder};
pub use generator::IdGenerator;
pub use grant::IdGrant;
