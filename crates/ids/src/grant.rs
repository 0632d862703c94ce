//! Id grants
//!
//! A grant is the half-open range `[initial, limit)` reserved for one context
//! by one generator. It is consumed front to back and thrown away once empty.

use folio_core::IdContext;

/// Exclusively owned block of ids for one context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdGrant {
    context: IdContext,
    initial: u64,
    limit: u64,
    cursor: u64,
}

impl IdGrant {
    /// Create a grant covering `[initial, limit)`
    pub fn new(context: IdContext, initial: u64, limit: u64) -> Self {
        debug_assert!(initial <= limit, "grant range must not be inverted");
        IdGrant {
            context,
            initial,
            limit,
            cursor: initial,
        }
    }

    /// Issue the next id, `None` once exhausted
    #[inline]
    pub fn take(&mut self) -> Option<u64> {
        if self.cursor >= self.limit {
            return None;
        }
        let id = self.cursor;
        self.cursor += 1;
        Some(id)
    }

    /// Context this grant belongs to
    pub fn context(&self) -> &IdContext {
        &self.context
    }

    /// First id of the range
    pub fn initial(&self) -> u64 {
        self.initial
    }

    /// One past the last id of the range
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Ids left to issue
    pub fn remaining(&self) -> u64 {
        self.limit - self.cursor
    }

    /// Whether every id has been issued
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.limit
    }

    /// Whether `id` lies inside this grant
    pub fn contains(&self, id: u64) -> bool {
        id >= self.initial && id < self.limit
    }
}
