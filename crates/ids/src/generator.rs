//! Per-context id generator
//!
//! ## Grant acquisition
//!
//! ```text
//! 1. read next_id for the context (absent = brand-new context, start at 1)
//! 2. limit = next_id + grant_size
//! 3. conditional write: insert limit (new context) or CAS next_id -> limit
//! 4. zero rows affected: another allocator won, go back to 1
//! 5. success: [next_id, limit) belongs to this generator alone
//! ```
//!
//! Steps 1-5 run while holding the generator lock, so one context never has
//! two grant requests in flight from the same process. Attempts are bounded;
//! running out is an `AllocationFailed`, as is any store error. No id is ever
//! issued from a grant whose reservation did not succeed.

use folio_core::{FolioError, FolioResult, IdContext};
use folio_storage::CounterStore;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::grant::IdGrant;

/// First id issued in a brand-new context
pub const FIRST_ID: u64 = 1;

/// Serialized id source for one context
pub struct IdGenerator {
    context: IdContext,
    store: Arc<dyn CounterStore>,
    grant_size: u64,
    max_attempts: usize,
    current: Mutex<Option<IdGrant>>,
    grants_acquired: AtomicU64,
    ids_issued: AtomicU64,
}

impl IdGenerator {
    /// Create a generator; no grant is requested until the first `next_value`
    pub fn new(
        context: IdContext,
        store: Arc<dyn CounterStore>,
        grant_size: u64,
        max_attempts: usize,
    ) -> Self {
        IdGenerator {
            context,
            store,
            grant_size: grant_size.max(1),
            max_attempts: max_attempts.max(1),
            current: Mutex::new(None),
            grants_acquired: AtomicU64::new(0),
            ids_issued: AtomicU64::new(0),
        }
    }

    /// Issue the next id
    ///
    /// May block on a store round trip when the current grant is exhausted.
    pub fn next_value(&self) -> FolioResult<u64> {
        let mut current = self.current.lock();

        if let Some(id) = current.as_mut().and_then(IdGrant::take) {
            self.ids_issued.fetch_add(1, Ordering::Relaxed);
            return Ok(id);
        }

        // Only replace the held grant once the new one is safely reserved
        let mut grant = self.acquire_grant()?;
        let id = grant.take().ok_or_else(|| {
            FolioError::allocation_failed(self.context.as_str(), "acquired an empty grant")
        })?;
        *current = Some(grant);
        self.ids_issued.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    fn acquire_grant(&self) -> FolioResult<IdGrant> {
        for attempt in 1..=self.max_attempts {
            let observed = self
                .store
                .read(&self.context)
                .map_err(|e| self.store_failure(e))?;

            let initial = observed.unwrap_or(FIRST_ID);
            let limit = initial.checked_add(self.grant_size).ok_or_else(|| {
                FolioError::allocation_failed(self.context.as_str(), "id space exhausted")
            })?;

            let reserved = match observed {
                None => self.store.insert(&self.context, limit),
                Some(expected) => self.store.compare_and_set(&self.context, expected, limit),
            }
            .map_err(|e| self.store_failure(e))?;

            if reserved {
                self.grants_acquired.fetch_add(1, Ordering::Relaxed);
                debug!(
                    target: "folio::ids",
                    context = %self.context,
                    initial,
                    limit,
                    attempt,
                    "acquired id grant"
                );
                return Ok(IdGrant::new(self.context.clone(), initial, limit));
            }

            debug!(
                target: "folio::ids",
                context = %self.context,
                observed = initial,
                attempt,
                "lost grant race, retrying"
            );
        }

        warn!(
            target: "folio::ids",
            context = %self.context,
            attempts = self.max_attempts,
            "grant acquisition retry budget exhausted"
        );
        Err(FolioError::allocation_failed(
            self.context.as_str(),
            format!(
                "lost the grant race {} times in a row",
                self.max_attempts
            ),
        ))
    }

    fn store_failure(&self, e: FolioError) -> FolioError {
        error!(
            target: "folio::ids",
            context = %self.context,
            error = %e,
            "counter store failed during grant acquisition"
        );
        FolioError::allocation_failed(self.context.as_str(), e.to_string())
    }

    /// Context served by this generator
    pub fn context(&self) -> &IdContext {
        &self.context
    }

    /// Ids reserved per grant
    pub fn grant_size(&self) -> u64 {
        self.grant_size
    }

    /// Grants successfully reserved so far
    pub fn grants_acquired(&self) -> u64 {
        self.grants_acquired.load(Ordering::Relaxed)
    }

    /// Ids handed out so far
    pub fn ids_issued(&self) -> u64 {
        self.ids_issued.load(Ordering::Relaxed)
    }

    /// Ids left in the held grant (0 if none held)
    pub fn remaining_in_grant(&self) -> u64 {
        self.current
            .lock()
            .as_ref()
            .map(IdGrant::remaining)
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdGenerator")
            .field("context", &self.context)
            .field("grant_size", &self.grant_size)
            .field("grants_acquired", &self.grants_acquired())
            .field("ids_issued", &self.ids_issued())
            .finish()
    }
}
