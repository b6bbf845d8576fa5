#![forbid(unsafe_code)]

//! Version-tracked shared value with change notification.
//!
//! `Observable<T>` is the externally owned reactive input of a
//! [`ComputedSelector`](crate::ComputedSelector): the selector reads it and
//! listens to it, the owner writes it.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per mutation that changes the value.
//! 2. Subscribers are notified in registration order.
//! 3. Setting a value equal to the current value is a no-op (no version bump,
//!    no notifications).

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::notify::{Listener, ListenerSet, Subscription};
use crate::source::StateSource;

struct ObservableInner<T> {
    value: RefCell<Rc<T>>,
    version: Cell<u64>,
    listeners: ListenerSet,
}

/// A shared, version-tracked value.
///
/// Cloning an `Observable` creates a new handle to the **same** value.
pub struct Observable<T> {
    inner: Rc<ObservableInner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("value", &self.inner.value.borrow())
            .field("version", &self.inner.version.get())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    /// Create an observable holding `value`, at version 0.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(ObservableInner {
                value: RefCell::new(Rc::new(value)),
                version: Cell::new(0),
                listeners: ListenerSet::new(),
            }),
        }
    }

    /// Clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        T::clone(&self.current())
    }

    /// Borrow the current value.
    ///
    /// The closure may write this observable; it keeps seeing the value as
    /// of the call.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&*self.current())
    }

    /// Replace the value, notifying subscribers if it changed.
    pub fn set(&self, value: T) {
        {
            let mut current = self.inner.value.borrow_mut();
            if **current == value {
                return;
            }
            *current = Rc::new(value);
        }
        self.bump_and_notify();
    }

    /// Mutate the value in place, notifying subscribers if it changed.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut next = self.get();
        f(&mut next);
        self.set(next);
    }

    /// Number of changes applied so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Subscribe to changes; `callback` receives the new value.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let weak = Rc::downgrade(&self.inner);
        self.inner.listeners.subscribe(Rc::new(move || {
            if let Some(inner) = weak.upgrade() {
                let value = Rc::clone(&inner.value.borrow());
                callback(&*value);
            }
        }))
    }

    /// Subscribe a no-argument listener.
    pub fn subscribe_listener(&self, listener: Listener) -> Subscription {
        self.inner.listeners.subscribe(listener)
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.len()
    }

    fn current(&self) -> Rc<T> {
        Rc::clone(&self.inner.value.borrow())
    }

    fn bump_and_notify(&self) {
        self.inner.version.set(self.inner.version.get() + 1);
        self.inner.listeners.notify();
    }
}

impl<T: Clone + PartialEq + 'static> StateSource<T> for Observable<T> {
    fn snapshot(&self) -> Rc<T> {
        self.current()
    }

    fn subscribe_listener(&self, listener: Listener) -> Subscription {
        Observable::subscribe_listener(self, listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_bumps_version_and_notifies() {
        let obs = Observable::new(1);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let _sub = obs.subscribe(move |v| seen_clone.borrow_mut().push(*v));

        obs.set(2);
        obs.set(3);
        assert_eq!(obs.version(), 2);
        assert_eq!(*seen.borrow(), vec![2, 3]);
    }

    #[test]
    fn equal_set_is_noop() {
        let obs = Observable::new("a".to_string());
        let hits = Rc::new(Cell::new(0));
        let hits_clone = Rc::clone(&hits);
        let _sub = obs.subscribe(move |_| hits_clone.set(hits_clone.get() + 1));

        obs.set("a".to_string());
        assert_eq!(obs.version(), 0);
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn update_in_place() {
        let obs = Observable::new(vec![1, 2]);
        obs.update(|v| v.push(3));
        assert_eq!(obs.get(), vec![1, 2, 3]);
        assert_eq!(obs.version(), 1);

        obs.update(|_| {});
        assert_eq!(obs.version(), 1);
    }

    #[test]
    fn subscriber_can_read_back() {
        let obs = Observable::new(10);
        let obs_clone = obs.clone();
        let seen = Rc::new(Cell::new(0));
        let seen_clone = Rc::clone(&seen);
        let _sub = obs.subscribe(move |_| seen_clone.set(obs_clone.get()));

        obs.set(11);
        assert_eq!(seen.get(), 11);
    }

    #[test]
    fn dropped_subscription_stops_notifications() {
        let obs = Observable::new(0);
        let hits = Rc::new(Cell::new(0));
        let hits_clone = Rc::clone(&hits);
        let sub = obs.subscribe(move |_| hits_clone.set(hits_clone.get() + 1));
        assert_eq!(obs.subscriber_count(), 1);

        drop(sub);
        obs.set(1);
        assert_eq!(hits.get(), 0);
        assert_eq!(obs.subscriber_count(), 0);
    }

    #[test]
    fn set_from_inside_with() {
        let obs = Observable::new(1);
        let seen = obs.with(|v| {
            obs.set(*v + 1);
            *v
        });
        assert_eq!(seen, 1);
        assert_eq!(obs.get(), 2);
        assert_eq!(obs.version(), 1);
    }

    #[test]
    fn clone_shares_value() {
        let a = Observable::new(1);
        let b = a.clone();
        b.set(5);
        assert_eq!(a.get(), 5);
        assert_eq!(a.version(), 1);
    }
}
