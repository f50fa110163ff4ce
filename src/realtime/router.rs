//! Named event listeners.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::warn;

use super::messages::RealtimeEvent;

type OnceHandler = Box<dyn FnOnce(RealtimeEvent) + Send>;
type Handler = Arc<dyn Fn(RealtimeEvent) + Send + Sync>;

enum Callback {
    Once(OnceHandler),
    Every(Handler),
}

struct Listener {
    token: u64,
    event: String,
    callback: Callback,
}

/// Handle for removing a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(u64);

/// Dispatches events by name to registered listeners, in registration order.
#[derive(Default)]
pub struct EventRouter {
    next_token: AtomicU64,
    listeners: Mutex<Vec<Listener>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Listener>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add(&self, event: &str, callback: Callback) -> ListenerToken {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.lock().push(Listener {
            token,
            event: event.to_string(),
            callback,
        });
        ListenerToken(token)
    }

    /// Register a listener that fires for the next matching event only.
    pub fn once<F>(&self, event: &str, handler: F) -> ListenerToken
    where
        F: FnOnce(RealtimeEvent) + Send + 'static,
    {
        self.add(event, Callback::Once(Box::new(handler)))
    }

    /// Register a listener that fires for every matching event.
    pub fn on<F>(&self, event: &str, handler: F) -> ListenerToken
    where
        F: Fn(RealtimeEvent) + Send + Sync + 'static,
    {
        self.add(event, Callback::Every(Arc::new(handler)))
    }

    /// Remove a listener. Returns false if it already fired or was removed.
    pub fn off(&self, token: ListenerToken) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|l| l.token != token.0);
        listeners.len() != before
    }

    /// Number of listeners waiting on `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.lock().iter().filter(|l| l.event == event).count()
    }

    /// Deliver `event` to the listeners of `name`. Returns how many fired.
    ///
    /// Handlers run after the listener lock is released, so they may
    /// register or remove listeners themselves. A panicking handler is
    /// logged and still counts as fired; the remaining handlers run.
    pub fn dispatch(&self, name: &str, event: &RealtimeEvent) -> usize {
        let mut due = Vec::new();
        {
            let mut listeners = self.lock();
            let mut kept = Vec::with_capacity(listeners.len());
            for listener in listeners.drain(..) {
                if listener.event != name {
                    kept.push(listener);
                    continue;
                }
                match listener.callback {
                    Callback::Once(handler) => due.push(Callback::Once(handler)),
                    Callback::Every(handler) => {
                        due.push(Callback::Every(Arc::clone(&handler)));
                        kept.push(Listener {
                            callback: Callback::Every(handler),
                            ..listener
                        });
                    }
                }
            }
            *listeners = kept;
        }

        let fired = due.len();
        for callback in due {
            let outcome = match callback {
                Callback::Once(handler) => {
                    catch_unwind(AssertUnwindSafe(|| handler(event.clone())))
                }
                Callback::Every(handler) => {
                    catch_unwind(AssertUnwindSafe(|| handler(event.clone())))
                }
            };
            if outcome.is_err() {
                warn!("Listener for {} panicked", name);
            }
        }
        fired
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("listeners", &self.lock().len())
            .finish()
    }
}
