//! Update notification fan-out
//!
//! Repositories announce committed writes through an [`UpdateNotifier`].
//! Listeners (search indexers, caches, other services) are invoked on the
//! shared [`DispatchPool`], so `after()` returns as soon as the dispatches are
//! queued.
//!
//! ## Guarantees
//!
//! - Each `after()` delivers the event to the listeners registered at the
//!   moment it was called (copy-on-write snapshot); registering or
//!   unregistering during dispatch never produces a torn view
//! - A listener that returns an error or panics is logged and counted; the
//!   publisher and the other listeners are unaffected
//! - Listeners run in parallel; no ordering is promised between two events
//! - After `close()`, `register` and `after` fail with `IllegalState`

use folio_core::{FolioError, FolioResult, Registration, UpdateEvent};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::dispatch::{DispatchError, DispatchPool, ShutdownReport};

/// Receiver of update events
///
/// Implemented for any `Fn(&UpdateEvent<T>) -> anyhow::Result<()>` closure.
pub trait UpdateListener<T>: Send + Sync {
    /// Handle one event. Errors are logged, never propagated.
    fn on_update(&self, event: &UpdateEvent<T>) -> anyhow::Result<()>;

    /// Name used in logs
    fn name(&self) -> &str {
        "anonymous"
    }
}

impl<T, F> UpdateListener<T> for F
where
    F: Fn(&UpdateEvent<T>) -> anyhow::Result<()> + Send + Sync,
{
    fn on_update(&self, event: &UpdateEvent<T>) -> anyhow::Result<()> {
        self(event)
    }
}

struct ListenerSlot<T> {
    id: u64,
    listener: Arc<dyn UpdateListener<T>>,
}

impl<T> Clone for ListenerSlot<T> {
    fn clone(&self) -> Self {
        ListenerSlot {
            id: self.id,
            listener: Arc::clone(&self.listener),
        }
    }
}

struct NotifierInner<T> {
    topic: String,
    listeners: RwLock<Arc<Vec<ListenerSlot<T>>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    failures: AtomicU64,
    pool: Arc<DispatchPool>,
}

impl<T> NotifierInner<T> {
    fn remove(&self, id: u64) {
        let mut guard = self.listeners.write();
        let remaining: Vec<ListenerSlot<T>> =
            guard.iter().filter(|slot| slot.id != id).cloned().collect();
        *guard = Arc::new(remaining);
    }
}

/// Publish/subscribe helper for one entry type
pub struct UpdateNotifier<T> {
    inner: Arc<NotifierInner<T>>,
}

impl<T> Clone for UpdateNotifier<T> {
    fn clone(&self) -> Self {
        UpdateNotifier {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> UpdateNotifier<T> {
    /// Create a notifier dispatching on a shared pool
    ///
    /// `topic` names the notifier in logs (usually the entry type).
    pub fn new(topic: impl Into<String>, pool: Arc<DispatchPool>) -> Self {
        UpdateNotifier {
            inner: Arc::new(NotifierInner {
                topic: topic.into(),
                listeners: RwLock::new(Arc::new(Vec::new())),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
                failures: AtomicU64::new(0),
                pool,
            }),
        }
    }

    /// Create a notifier with its own pool
    pub fn with_workers(topic: impl Into<String>, workers: usize) -> Self {
        Self::new(topic, Arc::new(DispatchPool::new(workers, 4096)))
    }

    /// Add a closure listener
    pub fn register<F>(&self, listener: F) -> FolioResult<Registration>
    where
        F: Fn(&UpdateEvent<T>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register_arc(Arc::new(listener))
    }

    /// Add a listener implementing [`UpdateListener`]
    pub fn register_listener(
        &self,
        listener: impl UpdateListener<T> + 'static,
    ) -> FolioResult<Registration> {
        self.register_arc(Arc::new(listener))
    }

    /// Add a shared listener
    pub fn register_arc(&self, listener: Arc<dyn UpdateListener<T>>) -> FolioResult<Registration> {
        self.ensure_open()?;

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let name = listener.name().to_string();
        {
            let mut guard = self.inner.listeners.write();
            let mut next: Vec<ListenerSlot<T>> = guard.as_ref().clone();
            next.push(ListenerSlot { id, listener });
            *guard = Arc::new(next);
        }
        debug!(
            target: "folio::notify",
            topic = %self.inner.topic,
            listener = %name,
            "listener registered"
        );

        let weak: Weak<NotifierInner<T>> = Arc::downgrade(&self.inner);
        Ok(Registration::new(
            format!("{} listener {}", self.inner.topic, name),
            move || {
                if let Some(inner) = weak.upgrade() {
                    inner.remove(id);
                }
            },
        ))
    }

    /// Publish an event to every registered listener
    ///
    /// Returns once the dispatches are queued. Fails with `IllegalState` if
    /// the notifier is closed or the pool cannot take more work; listeners
    /// that were already queued still run.
    pub fn after(&self, event: UpdateEvent<T>) -> FolioResult<()> {
        self.ensure_open()?;

        let snapshot = Arc::clone(&*self.inner.listeners.read());
        if snapshot.is_empty() {
            return Ok(());
        }

        let event = Arc::new(event);
        let mut rejected = 0usize;
        let mut last_error = None;

        for slot in snapshot.iter() {
            let listener = Arc::clone(&slot.listener);
            let event = Arc::clone(&event);
            let inner = Arc::clone(&self.inner);

            let dispatched = self.inner.pool.submit(move || {
                invoke(&inner, listener.as_ref(), &event);
            });
            if let Err(e) = dispatched {
                rejected += 1;
                last_error = Some(e);
            }
        }

        match last_error {
            None => Ok(()),
            Some(e) => {
                warn!(
                    target: "folio::notify",
                    topic = %self.inner.topic,
                    entity_id = %event.entity_id(),
                    rejected,
                    error = %e,
                    "event not dispatched to every listener"
                );
                Err(match e {
                    DispatchError::ShutDown => {
                        FolioError::illegal_state(format!("{} notifier is shut down", self.inner.topic))
                    }
                    DispatchError::Saturated => FolioError::illegal_state(format!(
                        "{} notifier dispatch queue is full",
                        self.inner.topic
                    )),
                })
            }
        }
    }

    /// Stop accepting registrations and events
    ///
    /// Dispatches already queued still run. The shared pool is left alone.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    /// Close and shut the pool down, abandoning work left after `grace`
    pub fn shutdown(&self, grace: Duration) -> ShutdownReport {
        self.close();
        self.inner.pool.shutdown(grace)
    }

    /// Wait until every queued dispatch on the pool has run
    pub fn flush(&self) {
        self.inner.pool.drain();
    }

    /// Whether `close()` has been called
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Currently registered listeners
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }

    /// Listener invocations that failed or panicked
    pub fn failure_count(&self) -> u64 {
        self.inner.failures.load(Ordering::Relaxed)
    }

    /// Topic name
    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    fn ensure_open(&self) -> FolioResult<()> {
        if self.is_closed() {
            return Err(FolioError::illegal_state(format!(
                "{} notifier is closed",
                self.inner.topic
            )));
        }
        Ok(())
    }
}

fn invoke<T>(inner: &NotifierInner<T>, listener: &dyn UpdateListener<T>, event: &UpdateEvent<T>) {
    let outcome =
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener.on_update(event)));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            inner.failures.fetch_add(1, Ordering::Relaxed);
            warn!(
                target: "folio::notify",
                topic = %inner.topic,
                listener = listener.name(),
                entity_id = %event.entity_id(),
                action = %event.action(),
                error = %e,
                "update listener failed"
            );
        }
        Err(panic) => {
            inner.failures.fetch_add(1, Ordering::Relaxed);
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "(non-string panic)".to_string());
            error!(
                target: "folio::notify",
                topic = %inner.topic,
                listener = listener.name(),
                entity_id = %event.entity_id(),
                panic = %message,
                "update listener panicked"
            );
        }
    }
}

impl<T> std::fmt::Debug for UpdateNotifier<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateNotifier")
            .field("topic", &self.inner.topic)
            .field("listeners", &self.inner.listeners.read().len())
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::UpdateAction;
    use parking_lot::Mutex;
    use std::sync::mpsc;
    use std::sync::Barrier;

    fn notifier() -> UpdateNotifier<String> {
        UpdateNotifier::with_workers("work", 4)
    }

    #[test]
    fn test_listener_receives_event() {
        let n = notifier();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        n.register(move |e: &UpdateEvent<String>| {
            tx.lock().send((e.entity_id().to_string(), e.action()))?;
            Ok(())
        })
        .unwrap();

        n.after(UpdateEvent::created("1", "Foo".to_string())).unwrap();
        let got = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(got, ("1".to_string(), UpdateAction::Create));
    }

    #[test]
    fn test_failing_listener_isolated() {
        let n = notifier();
        let received = Arc::new(AtomicU64::new(0));

        n.register(|_: &UpdateEvent<String>| -> anyhow::Result<()> {
            anyhow::bail!("indexer unavailable")
        })
        .unwrap();
        n.register(|_: &UpdateEvent<String>| -> anyhow::Result<()> {
            panic!("listener bug");
        })
        .unwrap();
        let r = Arc::clone(&received);
        n.register(move |_: &UpdateEvent<String>| {
            r.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        n.after(UpdateEvent::created("1", "x".to_string())).unwrap();
        n.after(UpdateEvent::created("2", "y".to_string())).unwrap();
        n.flush();

        assert_eq!(received.load(Ordering::SeqCst), 2);
        assert_eq!(n.failure_count(), 4);
    }

    #[test]
    fn test_after_returns_before_listener_completes() {
        let n = notifier();
        let gate = Arc::new(Barrier::new(2));
        let g = Arc::clone(&gate);
        n.register(move |_: &UpdateEvent<String>| {
            g.wait();
            Ok(())
        })
        .unwrap();

        // If after() waited for the listener this would deadlock
        n.after(UpdateEvent::created("1", "x".to_string())).unwrap();
        gate.wait();
        n.flush();
    }

    #[test]
    fn test_unregister_stops_delivery() {
        let n = notifier();
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        let reg = n
            .register(move |_: &UpdateEvent<String>| {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        assert_eq!(n.listener_count(), 1);

        n.after(UpdateEvent::created("1", "x".to_string())).unwrap();
        n.flush();
        assert!(reg.unregister());
        assert!(!reg.unregister());
        assert_eq!(n.listener_count(), 0);

        n.after(UpdateEvent::created("2", "y".to_string())).unwrap();
        n.flush();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registration_during_dispatch_uses_snapshot() {
        let n = notifier();
        let late_calls = Arc::new(AtomicU64::new(0));

        let n2 = n.clone();
        let late = Arc::clone(&late_calls);
        let registered = Arc::new(Mutex::new(Vec::new()));
        let regs = Arc::clone(&registered);
        n.register(move |_: &UpdateEvent<String>| {
            let l = Arc::clone(&late);
            let reg = n2.register(move |_: &UpdateEvent<String>| {
                l.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })?;
            regs.lock().push(reg);
            Ok(())
        })
        .unwrap();

        n.after(UpdateEvent::created("1", "x".to_string())).unwrap();
        n.flush();

        // The listener added mid-dispatch did not see the in-flight event
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
        assert_eq!(n.listener_count(), 2);
    }

    #[test]
    fn test_lazy_state_evaluated_once_across_listeners() {
        let n = notifier();
        let supplier_calls = Arc::new(AtomicU64::new(0));
        for _ in 0..3 {
            n.register(|e: &UpdateEvent<String>| {
                assert_eq!(e.current().map(String::as_str), Some("now"));
                Ok(())
            })
            .unwrap();
        }

        let calls = Arc::clone(&supplier_calls);
        n.after(UpdateEvent::deferred(
            "1",
            UpdateAction::Update,
            || None,
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                Some("now".to_string())
            },
        ))
        .unwrap();
        n.flush();

        assert_eq!(supplier_calls.load(Ordering::SeqCst), 1);
        assert_eq!(n.failure_count(), 0);
    }

    #[test]
    fn test_closed_notifier_fails_fast() {
        let n = notifier();
        let report = n.shutdown(Duration::from_millis(100));
        assert_eq!(report.abandoned, 0);
        assert!(n.is_closed());

        let err = n.after(UpdateEvent::created("1", "x".to_string())).unwrap_err();
        assert!(matches!(err, FolioError::IllegalState(_)));
        assert!(n
            .register(|_: &UpdateEvent<String>| Ok(()))
            .is_err());
    }

    struct Indexer {
        seen: Mutex<Vec<String>>,
    }

    impl UpdateListener<String> for Indexer {
        fn on_update(&self, event: &UpdateEvent<String>) -> anyhow::Result<()> {
            self.seen.lock().push(event.entity_id().to_string());
            Ok(())
        }

        fn name(&self) -> &str {
            "indexer"
        }
    }

    #[test]
    fn test_named_listener() {
        let n = notifier();
        let indexer = Arc::new(Indexer {
            seen: Mutex::new(Vec::new()),
        });
        let reg = n.register_arc(indexer.clone()).unwrap();
        assert_eq!(reg.label(), "work listener indexer");

        n.after(UpdateEvent::updated("7", "a".to_string(), "b".to_string()))
            .unwrap();
        n.flush();
        assert_eq!(*indexer.seen.lock(), vec!["7".to_string()]);

        n.register_listener(Indexer {
            seen: Mutex::new(Vec::new()),
        })
        .unwrap();
        assert_eq!(n.listener_count(), 2);
    }

    #[test]
    fn test_no_listeners_is_noop() {
        let n = notifier();
        n.after(UpdateEvent::deleted("1", "gone".to_string())).unwrap();
    }
}
