//! Observers attached to an open WebSocket connection.
//!
//! Every text frame is offered to every registered observer. An observer is
//! removed when its handler reports [`Flow::Done`] or when the
//! [`ObserverGuard`] returned at registration is dropped, whichever comes
//! first, so a caller that bails out early never leaves a handler behind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::oneshot;

use crate::error::{ComfyError, Result};

/// Whether an observer wants further frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Done,
}

type Handler = Box<dyn FnMut(&str) -> Flow + Send>;

#[derive(Default)]
pub(crate) struct ObserverRegistry {
    next_id: AtomicU64,
    closed: AtomicBool,
    observers: Mutex<HashMap<u64, Handler>>,
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.len())
            .finish()
    }
}

impl ObserverRegistry {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a handler that sees every text frame until it returns
    /// [`Flow::Done`] or the guard is dropped.
    pub(crate) fn register<F>(self: &Arc<Self>, handler: F) -> ObserverGuard
    where
        F: FnMut(&str) -> Flow + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut observers = self.lock();
        // A closed registry drops the handler right away.
        if !self.closed.load(Ordering::Acquire) {
            observers.insert(id, Box::new(handler));
        }
        ObserverGuard {
            id,
            registry: Arc::downgrade(self),
        }
    }

    /// Offer a text frame to every observer, dropping the ones that finish.
    pub(crate) fn dispatch(&self, text: &str) {
        self.lock()
            .retain(|_, handler| handler(text) == Flow::Continue);
    }

    /// Drop every observer and refuse new ones. Pending one-shot waits
    /// resolve as closed.
    pub(crate) fn close(&self) {
        let mut observers = self.lock();
        self.closed.store(true, Ordering::Release);
        observers.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    fn remove(&self, id: u64) {
        self.lock().remove(&id);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Handler>> {
        self.observers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Deregisters its observer on drop.
#[derive(Debug)]
pub(crate) struct ObserverGuard {
    id: u64,
    registry: Weak<ObserverRegistry>,
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

type Selector<T> = Box<dyn FnMut(&str) -> Option<T> + Send>;

/// A predicate-and-handler pair that fires at most once.
///
/// A one-shot may be registered before its selector is known (see
/// [`pending`](Self::pending)); frames seen until then are held and
/// replayed through the selector by [`arm`](Self::arm).
#[derive(Debug)]
pub(crate) struct OneShot<T> {
    rx: oneshot::Receiver<T>,
    slot: Arc<Mutex<Slot<T>>>,
    guard: ObserverGuard,
}

struct Slot<T> {
    backlog: Vec<String>,
    select: Option<Selector<T>>,
    tx: Option<oneshot::Sender<T>>,
}

impl<T> std::fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot")
            .field("backlog", &self.backlog.len())
            .field("armed", &self.select.is_some())
            .field("fired", &self.tx.is_none())
            .finish()
    }
}

impl<T> Slot<T> {
    fn offer(&mut self, text: &str) -> Flow {
        if self.tx.is_none() {
            return Flow::Done;
        }
        let Some(select) = self.select.as_mut() else {
            self.backlog.push(text.to_string());
            return Flow::Continue;
        };
        match select(text) {
            Some(value) => {
                if let Some(tx) = self.tx.take() {
                    let _ = tx.send(value);
                }
                Flow::Done
            }
            None => Flow::Continue,
        }
    }
}

impl<T: Send + 'static> OneShot<T> {
    /// Watch frames until `select` maps one to a value.
    ///
    /// `select` returns `None` for frames that do not concern this
    /// subscription; the first `Some` is delivered and the observer removed.
    pub(crate) fn register<F>(registry: &Arc<ObserverRegistry>, select: F) -> Self
    where
        F: FnMut(&str) -> Option<T> + Send + 'static,
    {
        let once = Self::pending(registry);
        once.arm(select);
        once
    }

    /// Start observing now and hold every frame until [`arm`](Self::arm).
    pub(crate) fn pending(registry: &Arc<ObserverRegistry>) -> Self {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Mutex::new(Slot {
            backlog: Vec::new(),
            select: None,
            tx: Some(tx),
        }));
        let observed = slot.clone();
        let guard = registry.register(move |text| lock_slot(&observed).offer(text));
        Self { rx, slot, guard }
    }

    /// Install the selector, running it over the held frames first.
    pub(crate) fn arm<F>(&self, select: F)
    where
        F: FnMut(&str) -> Option<T> + Send + 'static,
    {
        let mut slot = lock_slot(&self.slot);
        slot.select = Some(Box::new(select));
        for text in std::mem::take(&mut slot.backlog) {
            if slot.offer(&text) == Flow::Done {
                break;
            }
        }
    }

    /// Wait for the selected value. Fails if the connection drops the
    /// observer first.
    pub(crate) async fn wait(self) -> Result<T> {
        let OneShot { rx, slot, guard } = self;
        // The registered handler must hold the only sender.
        drop(slot);
        let outcome = rx.await;
        drop(guard);
        outcome.map_err(|_| ComfyError::ConnectionClosed)
    }
}

fn lock_slot<T>(slot: &Mutex<Slot<T>>) -> MutexGuard<'_, Slot<T>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_one_shot_fires_once_and_deregisters() {
        let registry = ObserverRegistry::new();
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();
        let once = OneShot::register(&registry, move |text: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            (text == "match").then(|| text.to_string())
        });
        assert_eq!(registry.len(), 1);

        registry.dispatch("skip");
        assert_eq!(registry.len(), 1);
        registry.dispatch("match");
        assert_eq!(registry.len(), 0);
        registry.dispatch("match");

        assert_eq!(once.wait().await.unwrap(), "match");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dropping_one_shot_deregisters() {
        let registry = ObserverRegistry::new();
        let once = OneShot::register(&registry, |_: &str| Some(()));
        assert_eq!(registry.len(), 1);
        drop(once);
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_close_resolves_waiters_as_closed() {
        let registry = ObserverRegistry::new();
        let once = OneShot::register(&registry, |_: &str| None::<()>);
        registry.close();
        assert!(matches!(once.wait().await, Err(ComfyError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_register_after_close_fails_fast() {
        let registry = ObserverRegistry::new();
        registry.close();
        let once = OneShot::register(&registry, |_: &str| Some(()));
        assert_eq!(registry.len(), 0);
        assert!(matches!(once.wait().await, Err(ComfyError::ConnectionClosed)));
    }

    #[test]
    fn test_persistent_observer_sees_every_frame() {
        let registry = ObserverRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let guard = registry.register(move |text| {
            sink.lock().unwrap().push(text.to_string());
            Flow::Continue
        });

        registry.dispatch("a");
        registry.dispatch("b");
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);

        drop(guard);
        registry.dispatch("c");
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_pending_one_shot_replays_held_frames() {
        let registry = ObserverRegistry::new();
        let once = OneShot::pending(&registry);
        registry.dispatch("early");
        registry.dispatch("done");
        assert_eq!(registry.len(), 1);

        once.arm(|text: &str| (text == "done").then(|| text.to_string()));
        registry.dispatch("done");
        assert_eq!(registry.len(), 0);
        assert_eq!(once.wait().await.unwrap(), "done");
    }

    #[tokio::test]
    async fn test_armed_pending_one_shot_keeps_watching() {
        let registry = ObserverRegistry::new();
        let once = OneShot::pending(&registry);
        registry.dispatch("early");
        once.arm(|text: &str| (text == "done").then_some(1));
        assert_eq!(registry.len(), 1);

        registry.dispatch("done");
        assert_eq!(once.wait().await.unwrap(), 1);
    }

    #[test]
    fn test_dropping_unarmed_one_shot_deregisters() {
        let registry = ObserverRegistry::new();
        let once = OneShot::<()>::pending(&registry);
        registry.dispatch("held");
        drop(once);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_guard_outliving_registry_is_harmless() {
        let registry = ObserverRegistry::new();
        let guard = registry.register(|_| Flow::Continue);
        drop(registry);
        drop(guard);
    }
}
