use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use super::task_canceller::CancellationSignal;

/// Identifier of a listener added through `SharedReference::subscribe`.
pub type SubscriptionId = u64;

/// Options given when subscribing to a `SharedReference`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SubscribeOptions {
    /// If `true`, the callback is called synchronously with the current value right when
    /// subscribing.
    pub emit_current_value: bool,

    /// If `true`, the callback is removed after being called once.
    pub once: bool,
}

struct Listener<T> {
    id: SubscriptionId,
    callback: Rc<dyn Fn(&T)>,
    active: Rc<Cell<bool>>,
    once: bool,
}

struct SharedReferenceInner<T> {
    value: T,
    next_id: SubscriptionId,
    listeners: Vec<Listener<T>>,
}

/// Single-slot value which can be read at any time and whose updates can be listened to.
///
/// Only the last value set is kept: listeners are called synchronously, in subscription order,
/// on each `set` call but nothing is queued for them.
///
/// A listener that has been removed (through `unsubscribe`, its `CancellationSignal`, `finish`
/// or because it was a `once` listener that already fired) is never called again, even when
/// removed while a value is being dispatched.
pub struct SharedReference<T> {
    inner: Rc<RefCell<SharedReferenceInner<T>>>,
}

impl<T> Clone for SharedReference<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> SharedReference<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SharedReferenceInner {
                value,
                next_id: 0,
                listeners: vec![],
            })),
        }
    }

    /// Returns a copy of the current value.
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Run `func` on a reference to the current value, without copying it.
    pub fn with<R>(&self, func: impl FnOnce(&T) -> R) -> R {
        func(&self.inner.borrow().value)
    }

    /// Update the value and synchronously call every listener with it.
    pub fn set(&self, value: T) {
        let (value, listeners) = {
            let mut inner = self.inner.borrow_mut();
            inner.value = value;
            let listeners: Vec<(Rc<dyn Fn(&T)>, Rc<Cell<bool>>, bool)> = inner
                .listeners
                .iter()
                .map(|l| (Rc::clone(&l.callback), Rc::clone(&l.active), l.once))
                .collect();
            (inner.value.clone(), listeners)
        };

        let mut has_removed_listeners = false;
        for (callback, active, once) in listeners {
            if !active.get() {
                has_removed_listeners = true;
                continue;
            }
            if once {
                active.set(false);
                has_removed_listeners = true;
            }
            callback(&value);
        }
        if has_removed_listeners {
            if let Ok(mut inner) = self.inner.try_borrow_mut() {
                inner.listeners.retain(|l| l.active.get());
            }
        }
    }

    /// Listen to value updates.
    ///
    /// If a `CancellationSignal` is given, the listener is removed once it is triggered.
    pub fn subscribe(
        &self,
        callback: impl Fn(&T) + 'static,
        options: SubscribeOptions,
        cancel_signal: Option<&CancellationSignal>,
    ) -> SubscriptionId {
        if let Some(signal) = cancel_signal {
            if signal.is_cancelled() {
                return SubscriptionId::MAX;
            }
        }
        let callback: Rc<dyn Fn(&T)> = Rc::new(callback);
        if options.emit_current_value {
            let current = self.get();
            callback(&current);
            if options.once {
                return SubscriptionId::MAX;
            }
        }

        let active = Rc::new(Cell::new(true));
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.listeners.push(Listener {
                id,
                callback,
                active: Rc::clone(&active),
                once: options.once,
            });
            id
        };

        if let Some(signal) = cancel_signal {
            let weak_inner: Weak<RefCell<SharedReferenceInner<T>>> = Rc::downgrade(&self.inner);
            signal.register(move || {
                active.set(false);
                if let Some(inner) = weak_inner.upgrade() {
                    if let Ok(mut inner) = inner.try_borrow_mut() {
                        inner.listeners.retain(|l| l.id != id);
                    }
                }
            });
        }
        id
    }

    /// Remove a listener added through `subscribe`.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut inner = self.inner.borrow_mut();
        for listener in inner.listeners.iter().filter(|l| l.id == id) {
            listener.active.set(false);
        }
        inner.listeners.retain(|l| l.id != id);
    }

    /// Remove every listener. The value can still be read afterwards.
    pub fn finish(&self) {
        let mut inner = self.inner.borrow_mut();
        for listener in inner.listeners.iter() {
            listener.active.set(false);
        }
        inner.listeners.clear();
    }

    /// Returns the number of listeners currently registered.
    pub fn listener_count(&self) -> usize {
        self.inner
            .borrow()
            .listeners
            .iter()
            .filter(|l| l.active.get())
            .count()
    }
}

impl<T: Clone + PartialEq + 'static> SharedReference<T> {
    /// Same as `set`, but does nothing if the new value is equal to the current one.
    pub fn set_if_changed(&self, value: T) {
        let is_same = self.with(|current| *current == value);
        if !is_same {
            self.set(value);
        }
    }
}
