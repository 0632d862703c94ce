//! Registration handles
//!
//! Every "register a listener / resolver" call hands back a [`Registration`].
//! Holding it is the only way to remove the registration later. Dropping the
//! handle does NOT unregister; a listener registered at bootstrap and never
//! removed is the common case.

use parking_lot::Mutex;
use std::fmt;

type Unregister = Box<dyn FnOnce() + Send>;

/// Capability to undo one registration
///
/// `unregister()` is idempotent: the first call runs the removal, later
/// calls do nothing and return `false`.
pub struct Registration {
    label: String,
    action: Mutex<Option<Unregister>>,
}

impl Registration {
    /// Wrap a removal action
    pub fn new(label: impl Into<String>, unregister: impl FnOnce() + Send + 'static) -> Self {
        Registration {
            label: label.into(),
            action: Mutex::new(Some(Box::new(unregister))),
        }
    }

    /// Remove the registration
    ///
    /// Returns `true` if this call performed the removal.
    pub fn unregister(&self) -> bool {
        // Take under the lock, run outside it
        let action = self.action.lock().take();
        match action {
            Some(f) => {
                f();
                true
            }
            None => false,
        }
    }

    /// Alias for [`Registration::unregister`]
    pub fn close(&self) -> bool {
        self.unregister()
    }

    /// Whether `unregister()` has not been called yet
    pub fn is_active(&self) -> bool {
        self.action.lock().is_some()
    }

    /// What this registration is for (used in logs)
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("label", &self.label)
            .field("active", &self.is_active())
            .finish()
    }
}
