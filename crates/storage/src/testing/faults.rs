//! Fault injection for counter stores

use folio_core::{FolioError, FolioResult, IdContext};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::traits::CounterStore;

/// Grant size used by the simulated competing allocator
const COMPETITOR_GRANT: u64 = 7;

/// Call counters observed by a [`FlakyCounterStore`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterStoreStats {
    /// `read` calls
    pub reads: u64,
    /// `insert` / `compare_and_set` calls that affected a row
    pub successful_writes: u64,
    /// `insert` / `compare_and_set` calls that affected nothing
    pub lost_races: u64,
}

/// Counter store wrapper that can go offline or lose races on demand
///
/// A lost race is simulated faithfully: before reporting zero rows affected,
/// the wrapper advances the real row the way a competing allocator would,
/// so a retry observes a different `next_id`.
pub struct FlakyCounterStore<S> {
    inner: S,
    unavailable: AtomicBool,
    races_to_lose: AtomicUsize,
    reads: AtomicU64,
    successful_writes: AtomicU64,
    lost_races: AtomicU64,
}

impl<S: CounterStore> FlakyCounterStore<S> {
    /// Wrap a store; starts healthy
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            unavailable: AtomicBool::new(false),
            races_to_lose: AtomicUsize::new(0),
            reads: AtomicU64::new(0),
            successful_writes: AtomicU64::new(0),
            lost_races: AtomicU64::new(0),
        }
    }

    /// Make every call fail with `FolioError::Storage`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Let a competitor win the next `n` conditional writes
    pub fn lose_next_races(&self, n: usize) {
        self.races_to_lose.store(n, Ordering::SeqCst);
    }

    /// Snapshot of call counters
    pub fn stats(&self) -> CounterStoreStats {
        CounterStoreStats {
            reads: self.reads.load(Ordering::SeqCst),
            successful_writes: self.successful_writes.load(Ordering::SeqCst),
            lost_races: self.lost_races.load(Ordering::SeqCst),
        }
    }

    /// The wrapped store
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn check_available(&self) -> FolioResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(FolioError::storage("counter store unavailable"));
        }
        Ok(())
    }

    /// Consume one pending lost race, advancing the row like a competitor
    fn take_lost_race(&self, context: &IdContext) -> FolioResult<bool> {
        let lose = self
            .races_to_lose
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !lose {
            return Ok(false);
        }
        match self.inner.read(context)? {
            Some(current) => {
                self.inner
                    .compare_and_set(context, current, current + COMPETITOR_GRANT)?;
            }
            None => {
                self.inner.insert(context, 1 + COMPETITOR_GRANT)?;
            }
        }
        self.lost_races.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    fn record(&self, affected: bool) -> bool {
        if affected {
            self.successful_writes.fetch_add(1, Ordering::SeqCst);
        } else {
            self.lost_races.fetch_add(1, Ordering::SeqCst);
        }
        affected
    }
}

impl<S: CounterStore> CounterStore for FlakyCounterStore<S> {
    fn read(&self, context: &IdContext) -> FolioResult<Option<u64>> {
        self.check_available()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read(context)
    }

    fn insert(&self, context: &IdContext, next_id: u64) -> FolioResult<bool> {
        self.check_available()?;
        if self.take_lost_race(context)? {
            return Ok(false);
        }
        Ok(self.record(self.inner.insert(context, next_id)?))
    }

    fn compare_and_set(
        &self,
        context: &IdContext,
        expected: u64,
        next_id: u64,
    ) -> FolioResult<bool> {
        self.check_available()?;
        if self.take_lost_race(context)? {
            return Ok(false);
        }
        Ok(self.record(self.inner.compare_and_set(context, expected, next_id)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryCounterStore;

    fn ctx() -> IdContext {
        IdContext::new("works").unwrap()
    }

    #[test]
    fn test_passthrough_when_healthy() {
        let store = FlakyCounterStore::new(MemoryCounterStore::new());
        assert!(store.insert(&ctx(), 21).unwrap());
        assert_eq!(store.read(&ctx()).unwrap(), Some(21));
        assert_eq!(store.stats().successful_writes, 1);
        assert_eq!(store.stats().reads, 1);
    }

    #[test]
    fn test_unavailable_fails_every_call() {
        let store = FlakyCounterStore::new(MemoryCounterStore::new());
        store.set_unavailable(true);
        assert!(matches!(store.read(&ctx()), Err(FolioError::Storage(_))));
        assert!(store.insert(&ctx(), 1).is_err());
        assert!(store.compare_and_set(&ctx(), 1, 2).is_err());

        store.set_unavailable(false);
        assert!(store.read(&ctx()).is_ok());
    }

    #[test]
    fn test_lost_race_advances_row() {
        let store = FlakyCounterStore::new(MemoryCounterStore::new());
        store.insert(&ctx(), 21).unwrap();
        store.lose_next_races(1);

        assert!(!store.compare_and_set(&ctx(), 21, 41).unwrap());
        assert_eq!(store.read(&ctx()).unwrap(), Some(21 + COMPETITOR_GRANT));
        assert_eq!(store.stats().lost_races, 1);

        // Next attempt is honest again
        assert!(store
            .compare_and_set(&ctx(), 21 + COMPETITOR_GRANT, 50)
            .unwrap());
    }

    #[test]
    fn test_lost_race_on_new_context_inserts_competitor_row() {
        let store = FlakyCounterStore::new(MemoryCounterStore::new());
        store.lose_next_races(1);
        assert!(!store.insert(&ctx(), 21).unwrap());
        assert_eq!(store.read(&ctx()).unwrap(), Some(1 + COMPETITOR_GRANT));
    }
}
