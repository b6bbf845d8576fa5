#![forbid(unsafe_code)]

//! Memoized, reference-counted derivation over store state.
//!
//! A [`Selector<T>`] caches `derive(&state)` only while someone is
//! listening. [`attach`](Selector::attach) hands out [`SelectorHandle`]s; the
//! first handle computes the value and subscribes to the store, every later
//! handle shares that cache, and dropping the last handle unsubscribes and
//! forgets the value. Store updates are recomputed eagerly, one
//! recomputation per committed update.
//!
//! [`peek`](Selector::peek) is the one-shot read: it returns the cache when
//! attached and otherwise computes a fresh value that is neither cached nor
//! subscribed.
//!
//! # Example
//!
//! ```
//! use memostore::{SelectorOptions, Store, StoreConfig};
//!
//! let store = Store::with_config(0, StoreConfig::default());
//! let plus_one = store.selector(|n: &i32| n + 1, SelectorOptions::default());
//!
//! let handle = plus_one.attach().unwrap();
//! assert_eq!(handle.get(), 1);
//!
//! store.set(1).unwrap();
//! assert_eq!(handle.get(), 2);
//! ```

use std::rc::Rc;

use crate::equality::SelectorOptions;
use crate::error::SelectorError;
use crate::memo::{MemoCore, SelectorHandle};
use crate::notify::Listener;
use crate::source::StateSource;

/// A memoized derivation over a [`StateSource`].
///
/// Cloning a `Selector` creates a new handle to the **same** cache.
pub struct Selector<T: Clone + 'static> {
    core: Rc<MemoCore<T>>,
}

impl<T: Clone + 'static> Clone for Selector<T> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<T: Clone + 'static> Selector<T> {
    /// Build a selector over any state source.
    ///
    /// Usually created through [`Store::selector`](crate::Store::selector).
    pub fn new<S: 'static>(
        source: impl StateSource<S> + 'static,
        derive: impl Fn(&S) -> T + 'static,
        options: SelectorOptions<T>,
    ) -> Self {
        let source: Rc<dyn StateSource<S>> = Rc::new(source);
        let read = Rc::clone(&source);
        let core = MemoCore::new(
            options.name,
            Box::new(move || derive(read.snapshot().as_ref())),
            Box::new(move |listener: &Listener| vec![source.subscribe_listener(Rc::clone(listener))]),
            options.equal,
            None,
        );
        Self { core }
    }

    /// Add a consumer and return its live handle.
    ///
    /// Fails with [`SelectorError::Misuse`] when called from inside a
    /// derivation.
    pub fn attach(&self) -> Result<SelectorHandle<T>, SelectorError> {
        self.core.attach()
    }

    /// One-shot read.
    ///
    /// Attached: the cached value, without recomputation. Detached: a fresh
    /// value; no cache is populated and no subscription is created.
    ///
    /// Fails with [`SelectorError::Misuse`] when called from inside a
    /// derivation; wrap the call in [`untracked`](crate::untracked) if the
    /// stale read is intended.
    pub fn peek(&self) -> Result<T, SelectorError> {
        self.core.peek()
    }

    /// Whether at least one handle is alive.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.core.is_attached()
    }

    /// Number of live handles.
    #[must_use]
    pub fn consumer_count(&self) -> usize {
        self.core.consumer_count()
    }

    /// Total derivation calls so far.
    #[must_use]
    pub fn computations(&self) -> u64 {
        self.core.computations()
    }
}

impl<T: Clone + std::fmt::Debug + 'static> std::fmt::Debug for Selector<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selector")
            .field("cached", &self.core.cached())
            .field("consumers", &self.consumer_count())
            .field("computations", &self.computations())
            .finish()
    }
}
