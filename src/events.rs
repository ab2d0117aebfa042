//! Minimal event subscription plumbing
//!
//! Collaborating subsystems (worker pool, network time, plugins) expose an
//! [`EventEmitter`]; the node records every subscription it makes so it can
//! guarantee removal when it closes. Payloads are JSON values so emitters
//! do not need a shared payload type.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

pub type Listener = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

/// Handle returned by [`EventEmitter::on`], used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<String, Vec<(u64, Listener)>>,
}

#[derive(Default)]
pub struct EventEmitter {
    registry: Mutex<Registry>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to `event`. The returned id stays valid until removed.
    pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&serde_json::Value) + Send + Sync + 'static,
    {
        let mut reg = self.registry.lock();
        reg.next_id += 1;
        let id = reg.next_id;
        reg.listeners
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(listener)));
        ListenerId(id)
    }

    /// Remove a previously registered listener. Unknown ids are a no-op.
    pub fn remove_listener(&self, event: &str, id: ListenerId) {
        let mut reg = self.registry.lock();
        if let Some(list) = reg.listeners.get_mut(event) {
            list.retain(|(lid, _)| *lid != id.0);
        }
    }

    /// Invoke every listener registered for `event`, in subscription order.
    pub fn emit(&self, event: &str, payload: &serde_json::Value) {
        // Clone handles out of the lock so listeners may re-subscribe.
        let handlers: Vec<Listener> = {
            let reg = self.registry.lock();
            match reg.listeners.get(event) {
                Some(list) => list.iter().map(|(_, l)| l.clone()).collect(),
                None => return,
            }
        };

        for handler in handlers {
            handler(payload);
        }
    }

    /// Number of listeners currently registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        let reg = self.registry.lock();
        reg.listeners.get(event).map_or(0, |list| list.len())
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reg = self.registry.lock();
        f.debug_struct("EventEmitter")
            .field("events", &reg.listeners.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emit_reaches_listeners_in_order() {
        let emitter = EventEmitter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let seen = seen.clone();
            emitter.on("ping", move |_| seen.lock().push(tag));
        }

        emitter.emit("ping", &serde_json::Value::Null);
        assert_eq!(*seen.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn removed_listener_is_not_called() {
        let emitter = EventEmitter::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits2 = hits.clone();
        let id = emitter.on("tick", move |_| {
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        emitter.emit("tick", &serde_json::Value::Null);
        emitter.remove_listener("tick", id);
        emitter.emit("tick", &serde_json::Value::Null);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.listener_count("tick"), 0);
    }
}
