use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

/// Identifier returned when registering a callback on a `CancellationSignal`, allowing to
/// deregister it later.
pub type CancellationListenerId = u64;

type CancellationCallback = Box<dyn FnOnce()>;

struct SignalInner {
    cancelled: bool,
    next_id: CancellationListenerId,
    listeners: Vec<(CancellationListenerId, CancellationCallback)>,
}

/// Read-only side of a `TaskCanceller`, given to the computations that may be cancelled.
///
/// Everything registered through `register` runs synchronously, in registration order, when the
/// corresponding `TaskCanceller` is cancelled.
#[derive(Clone)]
pub struct CancellationSignal {
    inner: Rc<RefCell<SignalInner>>,
}

impl CancellationSignal {
    fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(SignalInner {
                cancelled: false,
                next_id: 0,
                listeners: vec![],
            })),
        }
    }

    /// Returns `true` if the linked task has already been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.borrow().cancelled
    }

    /// Register a callback to call once cancellation happens.
    ///
    /// If cancellation already happened, `callback` is called right away and `None` is
    /// returned.
    pub fn register(&self, callback: impl FnOnce() + 'static) -> Option<CancellationListenerId> {
        {
            let mut inner = self.inner.borrow_mut();
            if !inner.cancelled {
                let id = inner.next_id;
                inner.next_id += 1;
                inner.listeners.push((id, Box::new(callback)));
                return Some(id);
            }
        }
        callback();
        None
    }

    /// Remove a callback previously added through `register`.
    pub fn deregister(&self, id: CancellationListenerId) {
        if let Ok(mut inner) = self.inner.try_borrow_mut() {
            inner.listeners.retain(|(listener_id, _)| *listener_id != id);
        }
    }

    fn trigger(&self) {
        let listeners = {
            let mut inner = self.inner.borrow_mut();
            if inner.cancelled {
                return;
            }
            inner.cancelled = true;
            std::mem::take(&mut inner.listeners)
        };
        for (_, callback) in listeners {
            callback();
        }
    }

    fn downgrade(&self) -> Weak<RefCell<SignalInner>> {
        Rc::downgrade(&self.inner)
    }
}

/// Allows to cancel a computation and everything that depends on it.
///
/// A `TaskCanceller` can be linked to a parent `CancellationSignal` through `link_to_signal`,
/// forming a tree: cancelling the parent cancels the child before the parent's `cancel` call
/// returns.
pub struct TaskCanceller {
    signal: CancellationSignal,
    parent_link: RefCell<Option<(CancellationSignal, CancellationListenerId)>>,
}

impl TaskCanceller {
    pub fn new() -> Self {
        Self {
            signal: CancellationSignal::new(),
            parent_link: RefCell::new(None),
        }
    }

    /// Returns the `CancellationSignal` linked to this `TaskCanceller`.
    pub fn signal(&self) -> CancellationSignal {
        self.signal.clone()
    }

    /// Returns `true` if `cancel` was already called, directly or through a parent.
    pub fn is_used(&self) -> bool {
        self.signal.is_cancelled()
    }

    /// Cancel this `TaskCanceller` as soon as `parent` is cancelled.
    ///
    /// If `parent` is already cancelled, this `TaskCanceller` is cancelled right away.
    pub fn link_to_signal(&self, parent: &CancellationSignal) {
        let weak_signal = self.signal.downgrade();
        let listener_id = parent.register(move || {
            if let Some(inner) = weak_signal.upgrade() {
                CancellationSignal { inner }.trigger();
            }
        });
        if let Some(id) = listener_id {
            let previous = self.parent_link.replace(Some((parent.clone(), id)));
            if let Some((previous_parent, previous_id)) = previous {
                previous_parent.deregister(previous_id);
            }
        }
    }

    /// Cancel the linked task, synchronously calling every callback registered on its
    /// `CancellationSignal`, including the ones of its linked children.
    pub fn cancel(&self) {
        if let Some((parent, id)) = self.parent_link.borrow_mut().take() {
            parent.deregister(id);
        }
        self.signal.trigger();
    }
}

impl Default for TaskCanceller {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn test_callbacks_called_in_order_once() {
        let canceller = TaskCanceller::new();
        let calls = Rc::new(RefCell::new(vec![]));
        let calls_1 = calls.clone();
        let calls_2 = calls.clone();
        canceller.signal().register(move || calls_1.borrow_mut().push(1));
        canceller.signal().register(move || calls_2.borrow_mut().push(2));
        assert!(!canceller.is_used());
        canceller.cancel();
        canceller.cancel();
        assert!(canceller.is_used());
        assert_eq!(*calls.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_register_after_cancellation_runs_immediately() {
        let canceller = TaskCanceller::new();
        canceller.cancel();
        let called = Rc::new(RefCell::new(false));
        let called_clone = called.clone();
        let id = canceller
            .signal()
            .register(move || *called_clone.borrow_mut() = true);
        assert!(id.is_none());
        assert!(*called.borrow());
    }

    #[test]
    fn test_deregistered_callback_not_called() {
        let canceller = TaskCanceller::new();
        let called = Rc::new(RefCell::new(false));
        let called_clone = called.clone();
        let id = canceller
            .signal()
            .register(move || *called_clone.borrow_mut() = true);
        canceller.signal().deregister(id.unwrap());
        canceller.cancel();
        assert!(!*called.borrow());
    }

    #[test]
    fn test_parent_cancels_child_synchronously() {
        let parent = TaskCanceller::new();
        let child = TaskCanceller::new();
        child.link_to_signal(&parent.signal());
        let grand_child = TaskCanceller::new();
        grand_child.link_to_signal(&child.signal());

        let order = Rc::new(RefCell::new(vec![]));
        let order_gc = order.clone();
        grand_child
            .signal()
            .register(move || order_gc.borrow_mut().push("grand_child"));
        let order_p = order.clone();
        parent
            .signal()
            .register(move || order_p.borrow_mut().push("parent"));

        parent.cancel();
        assert!(child.is_used());
        assert!(grand_child.is_used());
        assert_eq!(*order.borrow(), vec!["grand_child", "parent"]);
    }

    #[test]
    fn test_child_cancellation_does_not_propagate_up() {
        let parent = TaskCanceller::new();
        let child = TaskCanceller::new();
        child.link_to_signal(&parent.signal());
        child.cancel();
        assert!(child.is_used());
        assert!(!parent.is_used());
        assert!(parent.signal().inner.borrow().listeners.is_empty());
    }

    #[test]
    fn test_linking_to_cancelled_parent() {
        let parent = TaskCanceller::new();
        parent.cancel();
        let child = TaskCanceller::new();
        child.link_to_signal(&parent.signal());
        assert!(child.is_used());
    }
}
