// SPDX-License-Identifier: GPL-3.0-only

//! Change notification primitives
//!
//! [`Signal`] is a list of observers invoked synchronously on the emitting
//! thread. [`Property`] pairs a value with a signal that fires at most once
//! per actual change of that value.

use super::lock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Identifier returned by [`Signal::connect`]
pub type HandlerId = u64;

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Observer list for values of type `T`
pub struct Signal<T> {
    handlers: Mutex<Vec<(HandlerId, Handler<T>)>>,
    next_id: AtomicU64,
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler, returning an id usable with [`Signal::disconnect`]
    pub fn connect<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.handlers).push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns false if the id was not connected.
    pub fn disconnect(&self, id: HandlerId) -> bool {
        let mut handlers = lock(&self.handlers);
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        handlers.len() != before
    }

    pub fn disconnect_all(&self) {
        lock(&self.handlers).clear();
    }

    pub fn handler_count(&self) -> usize {
        lock(&self.handlers).len()
    }

    /// Invoke every handler with `value`
    ///
    /// The handler list is snapshotted first so handlers may connect or
    /// disconnect without deadlocking.
    pub fn emit(&self, value: &T) {
        let handlers: Vec<Handler<T>> = lock(&self.handlers)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in handlers {
            handler(value);
        }
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("handlers", &self.handler_count())
            .finish()
    }
}

/// A value that notifies observers when it changes
pub struct Property<T> {
    value: Mutex<T>,
    changed: Signal<T>,
}

impl<T: Clone + PartialEq> Property<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Mutex::new(value),
            changed: Signal::new(),
        }
    }

    pub fn get(&self) -> T {
        lock(&self.value).clone()
    }

    /// Store `value`, emitting `changed` only if it differs from the
    /// current one. Returns whether the value changed.
    pub fn set(&self, value: T) -> bool {
        {
            let mut current = lock(&self.value);

            if *current == value {
                return false;
            }

            *current = value.clone();
        }

        self.changed.emit(&value);
        true
    }

    pub fn changed(&self) -> &Signal<T> {
        &self.changed
    }
}

impl<T: Clone + PartialEq + Default> Default for Property<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Property").field(&*lock(&self.value)).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_property_notifies_once_per_change() {
        let prop = Property::new(1);
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        prop.changed().connect(move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!prop.set(1));
        assert!(prop.set(2));
        assert!(!prop.set(2));
        assert!(prop.set(3));

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(prop.get(), 3);
    }

    #[test]
    fn test_signal_disconnect() {
        let signal = Signal::<u32>::new();
        let sum = Arc::new(AtomicUsize::new(0));
        let sum_clone = Arc::clone(&sum);
        let id = signal.connect(move |v| {
            sum_clone.fetch_add(*v as usize, Ordering::SeqCst);
        });

        signal.emit(&5);
        assert!(signal.disconnect(id));
        assert!(!signal.disconnect(id));
        signal.emit(&7);

        assert_eq!(sum.load(Ordering::SeqCst), 5);
        assert_eq!(signal.handler_count(), 0);
    }

    #[test]
    fn test_handler_can_reconnect_during_emit() {
        let signal = Arc::new(Signal::<()>::new());
        let inner = Arc::clone(&signal);
        signal.connect(move |_| {
            inner.connect(|_| {});
        });

        signal.emit(&());
        assert_eq!(signal.handler_count(), 2);
    }
}
