//! Lifecycle events emitted by the [`Repository`](crate::repository::Repository).
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock},
    thread::ThreadId,
};

use derive_more::From;

use crate::{models::Snapshot, Error};

/// A lifecycle signal.
#[derive(Debug, Clone, From)]
pub enum Event {
    /// Data was installed for the first time. Emitted exactly once.
    Ready,
    /// A snapshot was installed. Emitted on every install, including the first.
    Changed(Arc<Snapshot>),
    /// A recoverable problem, e.g. a failed backup read or a fetch error.
    Warn(String),
    /// A problem worth surfacing loudly, e.g. a feature with fields of the wrong type.
    Error(Error),
}

impl Event {
    /// Signal name: `"ready"`, `"changed"`, `"warn"` or `"error"`.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Ready => "ready",
            Event::Changed(_) => "changed",
            Event::Warn(_) => "warn",
            Event::Error(_) => "error",
        }
    }
}

/// Receives lifecycle events.
///
/// Listeners are called synchronously on the thread that performed the install, in installation
/// order. They must not block.
pub trait EventListener: Send + Sync {
    /// Called for every emitted event.
    fn on_event(&self, event: &Event);
}

impl<T: Fn(&Event) + Send + Sync> EventListener for T {
    fn on_event(&self, event: &Event) {
        self(event);
    }
}

/// Fan-out of events to registered listeners.
///
/// Listeners may call back into the bus. Subscribing from a callback takes effect for the next
/// event. An event emitted from a callback on the delivering thread is queued and delivered after
/// the current one, except that a `warn` raised while a `warn` is being delivered is only logged.
///
/// After [`EventBus::close`] returns, no listener is called again.
#[derive(Default)]
pub(crate) struct EventBus {
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
    /// Held for the duration of a delivery. `true` once closed.
    delivery: Mutex<bool>,
    /// Thread currently delivering, and the name of the event it is delivering.
    active: Mutex<Option<(ThreadId, &'static str)>>,
    pending: Mutex<VecDeque<Event>>,
}

impl EventBus {
    pub(crate) fn new() -> EventBus {
        EventBus::default()
    }

    pub(crate) fn subscribe(&self, listener: Arc<dyn EventListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub(crate) fn emit(&self, event: Event) {
        log::trace!(target: "toggle_engine", event = event.name(); "emitting event");

        let current = std::thread::current().id();
        let nested = match *lock(&self.active) {
            Some((thread, delivering)) if thread == current => Some(delivering),
            _ => None,
        };
        match nested {
            Some("warn") if matches!(event, Event::Warn(_)) => {
                log::debug!(target: "toggle_engine", "dropping warn raised by a warn listener");
                return;
            }
            Some(_) => {
                lock(&self.pending).push_back(event);
                return;
            }
            None => {}
        }

        let closed = lock(&self.delivery);
        if *closed {
            return;
        }

        let _delivering = Delivering(self);
        let mut next = Some(event);
        while let Some(event) = next {
            *lock(&self.active) = Some((current, event.name()));
            let listeners = self
                .listeners
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            for listener in &listeners {
                listener.on_event(&event);
            }
            next = lock(&self.pending).pop_front();
        }
    }

    /// Detach all listeners and refuse further emissions. Waits for an in-flight delivery.
    pub(crate) fn close(&self) {
        let mut closed = lock(&self.delivery);
        *closed = true;
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Clears the delivery marker, also when a listener panics.
struct Delivering<'a>(&'a EventBus);

impl Drop for Delivering<'_> {
    fn drop(&mut self) {
        *lock(&self.0.active) = None;
        lock(&self.0.pending).clear();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("EventBus")
            .field("listeners", &listeners)
            .finish_non_exhaustive()
    }
}
