//! Testing utilities for the persistence seams
//!
//! This module provides fault-injecting wrappers used by allocator and
//! repository tests:
//!
//! - **FlakyCounterStore**: simulated outages and lost compare-and-set races
//!
//! # Example
//!
//! ```ignore
//! use folio_storage::testing::FlakyCounterStore;
//!
//! let store = Arc::new(FlakyCounterStore::new(MemoryCounterStore::new()));
//! store.lose_next_races(3);   // a competing allocator wins the next 3 CAS attempts
//! store.set_unavailable(true); // every call now fails with FolioError::Storage
//! ```

mod faults;

pub use faults::{CounterStoreStats, FlakyCounterStore};
