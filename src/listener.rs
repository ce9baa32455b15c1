//! Change listeners and their registry.
use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use crate::ConfigChangeEvent;

/// Receives every change event produced when a new snapshot is published.
///
/// Implemented for any `Fn(&ConfigChangeEvent)`.
///
/// # Examples
/// ```
/// # use reforge::{ClientConfig, ConfigChangeEvent};
/// let config = ClientConfig::local_only().listener(|event: &ConfigChangeEvent| {
///     println!("{} changed", event.key);
/// });
/// ```
pub trait ConfigChangeListener: Send + Sync {
    /// Called once per changed key, in registration order.
    fn on_change(&self, event: &ConfigChangeEvent);
}

impl<T: Fn(&ConfigChangeEvent) + Send + Sync> ConfigChangeListener for T {
    fn on_change(&self, event: &ConfigChangeEvent) {
        self(event);
    }
}

/// Handle returned on registration, used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn ConfigChangeListener>)>>,
}

impl ListenerRegistry {
    pub(crate) fn add(&self, listener: Arc<dyn ConfigChangeListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .expect("thread holding listeners lock should not panic")
            .push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .lock()
            .expect("thread holding listeners lock should not panic");
        let len = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != len
    }

    /// Deliver `events` in order to every listener, in registration order. A panicking listener
    /// is logged and skipped for that event.
    pub(crate) fn notify(&self, events: &[crate::ConfigChangeEvent]) {
        if events.is_empty() {
            return;
        }

        // Snapshot so listeners may (un)register from inside a callback.
        let listeners: Vec<_> = self
            .listeners
            .lock()
            .expect("thread holding listeners lock should not panic")
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for event in events {
            for listener in &listeners {
                let result = catch_unwind(AssertUnwindSafe(|| listener.on_change(event)));
                if result.is_err() {
                    log::warn!(target: "reforge", config_key = event.key.as_str(); "config change listener panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::ListenerRegistry;
    use crate::{config::Config, ConfigChangeEvent, ConfigValue};

    fn event(key: &str) -> ConfigChangeEvent {
        ConfigChangeEvent {
            key: key.to_owned(),
            old: None,
            new: Some(Arc::new(Config::constant(key, 1, ConfigValue::Bool(true)))),
        }
    }

    #[test]
    fn delivers_in_order_and_survives_panics() {
        let registry = ListenerRegistry::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        registry.add(Arc::new(|event: &ConfigChangeEvent| {
            if event.key == "b" {
                panic!("listener failure");
            }
        }));
        {
            let seen = Arc::clone(&seen);
            registry.add(Arc::new(move |event: &ConfigChangeEvent| {
                seen.lock().unwrap().push(event.key.clone());
            }));
        }

        registry.notify(&[event("a"), event("b"), event("c")]);

        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn removed_listeners_are_not_called() {
        let registry = ListenerRegistry::default();
        let calls = Arc::new(Mutex::new(0));

        let id = {
            let calls = Arc::clone(&calls);
            registry.add(Arc::new(move |_: &ConfigChangeEvent| {
                *calls.lock().unwrap() += 1;
            }))
        };
        registry.notify(&[event("a")]);

        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        registry.notify(&[event("a")]);

        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
