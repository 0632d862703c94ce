//! Edit command protocol
//!
//! An edit command wraps one in-memory working copy of an entry. Callers
//! change it through typed setters, a bulk patch (`set_all`) or nested
//! mutators, and nothing is persisted until [`EditCommand::execute`].
//!
//! `execute` consumes the command and hands back a [`CommitHandle`], a future
//! resolving to the committed id. Inside a Tokio runtime the commit runs on
//! the blocking pool, so awaiting it never stalls a runtime worker; outside a
//! runtime it runs inline and the handle is already complete. Dropping the
//! handle detaches the commit: it either finishes or never starts, it is
//! never half applied.

use folio_core::{FolioError, FolioResult};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Staged mutation of one entry
pub trait EditCommand {
    /// Bulk patch transfer object
    type Dto;

    /// Value produced by a successful commit
    type Output: Send + 'static;

    /// Id of the entry being edited (pre-allocated for new entries)
    fn id(&self) -> &str;

    /// Whether this command creates a new entry
    fn is_new(&self) -> bool;

    /// Apply every present field of `dto`, leaving absent fields untouched
    ///
    /// Applying the same DTO twice yields the same working copy. Problems
    /// found here (unknown nested ids, allocation failures) are reported by
    /// `execute`.
    fn set_all(&mut self, dto: &Self::Dto) -> &mut Self;

    /// Persist the working copy
    fn execute(self) -> CommitHandle<Self::Output>;
}

/// Pending result of [`EditCommand::execute`]
#[must_use = "a commit handle does nothing observable unless awaited"]
pub struct CommitHandle<T> {
    state: HandleState<T>,
}

enum HandleState<T> {
    Ready(Option<FolioResult<T>>),
    Spawned(JoinHandle<FolioResult<T>>),
}

// No field is structurally pinned
impl<T> Unpin for CommitHandle<T> {}

impl<T: Send + 'static> CommitHandle<T> {
    /// Run `commit` on the blocking pool if a runtime is present, inline otherwise
    pub fn spawn<F>(commit: F) -> Self
    where
        F: FnOnce() -> FolioResult<T> + Send + 'static,
    {
        match Handle::try_current() {
            Ok(runtime) => CommitHandle {
                state: HandleState::Spawned(runtime.spawn_blocking(commit)),
            },
            Err(_) => Self::ready(commit()),
        }
    }
}

impl<T> CommitHandle<T> {
    /// Handle that is already complete
    pub fn ready(result: FolioResult<T>) -> Self {
        CommitHandle {
            state: HandleState::Ready(Some(result)),
        }
    }

    /// Handle that already failed
    pub fn failed(error: FolioError) -> Self {
        Self::ready(Err(error))
    }

    /// Whether the result is available without waiting
    pub fn is_finished(&self) -> bool {
        match &self.state {
            HandleState::Ready(result) => result.is_some(),
            HandleState::Spawned(join) => join.is_finished(),
        }
    }
}

impl<T> Future for CommitHandle<T> {
    type Output = FolioResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            HandleState::Ready(result) => match result.take() {
                Some(result) => Poll::Ready(result),
                None => Poll::Ready(Err(FolioError::illegal_state(
                    "commit handle polled after completion",
                ))),
            },
            HandleState::Spawned(join) => match Pin::new(join).poll(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(e)) => Poll::Ready(Err(FolioError::illegal_state(format!(
                    "commit task did not complete: {}",
                    e
                )))),
            },
        }
    }
}

impl<T> std::fmt::Debug for CommitHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            HandleState::Ready(Some(_)) => "ready",
            HandleState::Ready(None) => "taken",
            HandleState::Spawned(_) => "spawned",
        };
        f.debug_struct("CommitHandle").field("state", &state).finish()
    }
}
