#![forbid(unsafe_code)]

//! Insertion-ordered listener registry shared by every subject in the crate.
//!
//! [`Store`](crate::Store), [`Observable`](crate::Observable) and the
//! selector caches all publish through a [`ListenerSet`]. Subscribing returns
//! a [`Subscription`] guard that removes the listener when released.
//!
//! # Invariants
//!
//! 1. Listeners are called in registration order.
//! 2. A notification pass calls exactly the listeners registered when the
//!    pass started; listeners added during the pass wait for the next one.
//! 3. A listener released during a pass is not called for the rest of that
//!    pass.
//! 4. Releasing a [`Subscription`] is idempotent.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Type-erased change callback. Listeners carry no payload; they re-read the
/// subject themselves.
pub type Listener = Rc<dyn Fn()>;

struct Entry {
    id: u64,
    callback: Listener,
    active: Rc<Cell<bool>>,
}

#[derive(Default)]
struct Registry {
    entries: RefCell<Vec<Entry>>,
    next_id: Cell<u64>,
}

impl Registry {
    fn remove(&self, id: u64) {
        self.entries.borrow_mut().retain(|entry| entry.id != id);
    }
}

/// Ordered set of listeners with snapshot-per-pass notification.
#[derive(Clone, Default)]
pub struct ListenerSet {
    registry: Rc<Registry>,
}

impl ListenerSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` and return the guard that owns the registration.
    pub fn subscribe(&self, callback: Listener) -> Subscription {
        let id = self.registry.next_id.get();
        self.registry.next_id.set(id + 1);
        let active = Rc::new(Cell::new(true));
        self.registry.entries.borrow_mut().push(Entry {
            id,
            callback,
            active: Rc::clone(&active),
        });
        Subscription {
            id,
            registry: Rc::downgrade(&self.registry),
            active,
        }
    }

    /// Call every listener registered at the start of this pass.
    ///
    /// Returns the number of listeners that were actually invoked.
    pub fn notify(&self) -> usize {
        let snapshot: Vec<(Listener, Rc<Cell<bool>>)> = self
            .registry
            .entries
            .borrow()
            .iter()
            .map(|entry| (Rc::clone(&entry.callback), Rc::clone(&entry.active)))
            .collect();

        let mut called = 0;
        for (callback, active) in snapshot {
            if active.get() {
                callback();
                called += 1;
            }
        }
        called
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.entries.borrow().len()
    }

    /// Whether no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("len", &self.len())
            .finish()
    }
}

/// RAII registration handle returned by every `subscribe` in this crate.
///
/// Dropping the handle unsubscribes. [`unsubscribe`](Self::unsubscribe) may
/// be called any number of times; only the first call has an effect.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
    active: Rc<Cell<bool>>,
}

impl Subscription {
    /// Remove the listener from its subject.
    pub fn unsubscribe(&self) {
        if !self.active.replace(false) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }

    /// Whether the listener is still registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.get() && self.registry.strong_count() > 0
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
