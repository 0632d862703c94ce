//! Identifier contexts
//!
//! An [`IdContext`] names one identifier sequence. Two contexts never share a
//! counter, so ids are unique within a context but may repeat across contexts.
//!
//! Nested entities allocate from composite contexts scoped to their parent:
//!
//! ```
//! use folio_core::IdContext;
//!
//! let ctx = IdContext::new("volumes")
//!     .unwrap()
//!     .child("12")
//!     .unwrap()
//!     .child("3")
//!     .unwrap();
//! assert_eq!(ctx.as_str(), "volumes/12/3");
//! ```

use crate::error::{FolioError, FolioResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between composite context segments
pub const CONTEXT_SEPARATOR: char = '/';

/// Namespace for an identifier sequence
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdContext(String);

impl IdContext {
    /// Create a root context
    ///
    /// The name must be non-empty and must not contain the segment separator.
    pub fn new(name: impl Into<String>) -> FolioResult<Self> {
        let name = name.into();
        validate_segment(&name)?;
        Ok(IdContext(name))
    }

    /// Derive a composite context scoped to a parent id
    pub fn child(&self, segment: impl AsRef<str>) -> FolioResult<Self> {
        let segment = segment.as_ref();
        validate_segment(segment)?;
        Ok(IdContext(format!(
            "{}{}{}",
            self.0, CONTEXT_SEPARATOR, segment
        )))
    }

    /// The context name
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of segments (1 for a root context)
    pub fn depth(&self) -> usize {
        self.0.split(CONTEXT_SEPARATOR).count()
    }
}

fn validate_segment(segment: &str) -> FolioResult<()> {
    if segment.is_empty() {
        return Err(FolioError::invalid_input("id context segment must not be empty"));
    }
    if segment.contains(CONTEXT_SEPARATOR) {
        return Err(FolioError::invalid_input(format!(
            "id context segment '{}' must not contain '{}'",
            segment, CONTEXT_SEPARATOR
        )));
    }
    Ok(())
}

impl TryFrom<String> for IdContext {
    type Error = FolioError;

    /// Parse a root or composite context, validating every segment
    fn try_from(name: String) -> FolioResult<Self> {
        for segment in name.split(CONTEXT_SEPARATOR) {
            validate_segment(segment)?;
        }
        Ok(IdContext(name))
    }
}

impl From<IdContext> for String {
    fn from(ctx: IdContext) -> String {
        ctx.0
    }
}

impl fmt::Display for IdContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IdContext {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
