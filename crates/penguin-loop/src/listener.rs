// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! Explicit listener registry with unsubscribe handles.
//!
//! Listeners are invoked synchronously, in subscription order, with the lock
//! released, so a listener may subscribe or unsubscribe from inside its own
//! callback.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    listeners: BTreeMap<u64, Callback<T>>,
}

/// Fan-out point for values of type `T`.
pub struct ListenerRegistry<T> {
    inner: Arc<Mutex<Registry<T>>>,
}

impl<T> Default for ListenerRegistry<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 0,
                listeners: BTreeMap::new(),
            })),
        }
    }
}

impl<T: 'static> std::fmt::Debug for ListenerRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

impl<T: 'static> ListenerRegistry<T> {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` and returns the handle that removes it.
    pub fn subscribe<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut reg = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            let id = reg.next_id;
            reg.next_id += 1;
            reg.listeners.insert(id, Arc::new(listener));
            id
        };
        let weak: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.inner);
        Unsubscribe {
            remove: Some(Box::new(move || {
                weak.upgrade().is_some_and(|inner| {
                    inner
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .listeners
                        .remove(&id)
                        .is_some()
                })
            })),
        }
    }

    /// Calls every listener with `value`.
    pub fn notify(&self, value: &T) {
        let listeners: Vec<Callback<T>> = self
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .listeners
            .values()
            .cloned()
            .collect();
        for listener in listeners {
            listener(value);
        }
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .listeners
            .len()
    }

    /// True when nobody is listening.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle returned by [`ListenerRegistry::subscribe`].
///
/// Dropping the handle leaves the listener registered; call
/// [`Unsubscribe::unsubscribe`] to remove it.
#[must_use = "dropping the handle keeps the listener registered forever"]
pub struct Unsubscribe {
    remove: Option<Box<dyn FnOnce() -> bool + Send>>,
}

impl Unsubscribe {
    /// Removes the listener. Returns `false` if it was already gone.
    pub fn unsubscribe(mut self) -> bool {
        self.remove.take().is_some_and(|f| f())
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("active", &self.remove.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn unsubscribe_stops_delivery() {
        let reg: ListenerRegistry<u64> = ListenerRegistry::new();
        let seen = Arc::new(AtomicU64::new(0));
        let sink = Arc::clone(&seen);
        let handle = reg.subscribe(move |v| {
            sink.fetch_add(*v, Ordering::SeqCst);
        });
        reg.notify(&2);
        assert!(handle.unsubscribe());
        reg.notify(&5);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert!(reg.is_empty());
    }

    #[test]
    fn debug_reports_listener_count() {
        let reg: ListenerRegistry<String> = ListenerRegistry::new();
        let _handle = reg.subscribe(|_| {});
        assert_eq!(format!("{reg:?}"), "ListenerRegistry { listeners: 1 }");
    }

    #[test]
    fn listener_may_subscribe_during_notify() {
        let reg: Arc<ListenerRegistry<u64>> = Arc::new(ListenerRegistry::new());
        let inner = Arc::clone(&reg);
        let _outer = reg.subscribe(move |_| {
            let _nested = inner.subscribe(|_| {});
        });
        reg.notify(&1);
        assert_eq!(reg.len(), 2);
    }
}
