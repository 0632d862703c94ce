//! Error types for the Folio kernel
//!
//! Every fallible kernel operation returns [`FolioResult`]. Expected outcomes
//! such as a missing record or a lost write race are ordinary variants that
//! callers are forced to match on, not panics.
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use thiserror::Error;

/// Result type alias for kernel operations
pub type FolioResult<T> = std::result::Result<T, FolioError>;

/// Error taxonomy for the entry kernel
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FolioError {
    /// Grant acquisition failed: store unavailable or retry budget exhausted
    #[error("id allocation failed for context '{context}': {reason}")]
    AllocationFailed {
        /// Context the allocation was requested for
        context: String,
        /// What went wrong
        reason: String,
    },

    /// Edit or resolve requested against a non-existent id
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// Kind of thing that was looked up (entry type, collection)
        entity: String,
        /// Identifier that was looked up
        id: String,
    },

    /// Record mutated or deleted between load and commit
    #[error("conflict on {entity} '{id}': {reason}")]
    Conflict {
        /// Entry type or collection
        entity: String,
        /// Record identifier
        id: String,
        /// What changed underneath the writer
        reason: String,
    },

    /// A command references nested ids that cannot be found
    #[error("validation failed: {reason}")]
    ValidationFailed {
        /// Human readable description of the violation
        reason: String,
    },

    /// No resolver (or more than one) accepts a reference or entry
    #[error("invalid reference: {reason}")]
    InvalidReference {
        /// Why the reference could not be dispatched
        reason: String,
    },

    /// Operation on a component that has been shut down or is saturated
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Bad configuration (config file, conflicting registrations)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Caller supplied a malformed argument
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Persistent store unavailable or failed
    #[error("storage error: {0}")]
    Storage(String),

    /// Document could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl FolioError {
    /// Create an allocation failure for a context
    pub fn allocation_failed(context: impl Into<String>, reason: impl Into<String>) -> Self {
        FolioError::AllocationFailed {
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        FolioError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict(
        entity: impl Into<String>,
        id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        FolioError::Conflict {
            entity: entity.into(),
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Create a validation error
    pub fn validation(reason: impl Into<String>) -> Self {
        FolioError::ValidationFailed {
            reason: reason.into(),
        }
    }

    /// Create an invalid reference error
    pub fn invalid_reference(reason: impl Into<String>) -> Self {
        FolioError::InvalidReference {
            reason: reason.into(),
        }
    }

    /// Create an illegal state error
    pub fn illegal_state(msg: impl Into<String>) -> Self {
        FolioError::IllegalState(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        FolioError::Configuration(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        FolioError::InvalidInput(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        FolioError::Storage(msg.into())
    }

    /// Check if this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, FolioError::NotFound { .. })
    }

    /// Check if this is a conflict error
    pub fn is_conflict(&self) -> bool {
        matches!(self, FolioError::Conflict { .. })
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, FolioError::ValidationFailed { .. })
    }

    /// Check if this is an invalid reference error
    pub fn is_invalid_reference(&self) -> bool {
        matches!(self, FolioError::InvalidReference { .. })
    }

    /// Check if this is an allocation failure
    pub fn is_allocation_failed(&self) -> bool {
        matches!(self, FolioError::AllocationFailed { .. })
    }

    /// Whether a caller may reasonably retry after reloading
    ///
    /// Only conflicts qualify. The kernel never retries them itself.
    pub fn is_retryable(&self) -> bool {
        self.is_conflict()
    }
}

impl From<serde_json::Error> for FolioError {
    fn from(e: serde_json::Error) -> Self {
        FolioError::Serialization(e.to_string())
    }
}
