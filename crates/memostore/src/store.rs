#![forbid(unsafe_code)]

//! Immutable state container with draft-based updates.
//!
//! # Design
//!
//! [`Store<S>`] owns a single `Rc<S>`. [`Store::update`] clones the current
//! state into a draft, lets the recipe mutate or replace the draft, commits
//! the result as a fresh `Rc<S>`, and then notifies every listener. Readers
//! holding an older `Rc<S>` are never affected by later updates.
//!
//! Draft clones are as cheap as `S::clone`. States built from persistent
//! collections (see the `hamt` feature) share all untouched substructure
//! with the previous state.
//!
//! # Invariants
//!
//! 1. The state is replaced, never mutated in place.
//! 2. A recipe that fails or panics leaves the state unchanged.
//! 3. An update whose result equals the current state commits nothing and
//!    notifies nobody.
//! 4. Each notification pass reaches the listeners registered when it
//!    starts, in registration order.
//! 5. Updates issued during a recipe or a notification pass follow the
//!    store's [`ReentrancyPolicy`]; deferred recipes run FIFO, each with its
//!    own full notification pass, before the outer `update` returns.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use crate::computed_selector::ComputedSelector;
use crate::config::{ReentrancyPolicy, StoreConfig, global_config};
use crate::equality::SelectorOptions;
use crate::error::StoreError;
use crate::notify::{Listener, ListenerSet, Subscription};
use crate::selector::Selector;
use crate::source::{Inputs, StateSource};

/// Outcome of an update recipe.
///
/// Recipes usually return `()` (keep the mutated draft) or
/// `Some(next)` (replace the state outright).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Produce<S> {
    /// Commit the draft as mutated by the recipe.
    Keep,
    /// Commit this value instead of the draft.
    Replace(S),
}

impl<S> From<()> for Produce<S> {
    fn from((): ()) -> Self {
        Self::Keep
    }
}

impl<S> From<Option<S>> for Produce<S> {
    fn from(next: Option<S>) -> Self {
        match next {
            Some(state) => Self::Replace(state),
            None => Self::Keep,
        }
    }
}

type DeferredRecipe<S> = Box<dyn FnOnce(&mut S) -> Produce<S>>;

struct StoreInner<S> {
    state: RefCell<Rc<S>>,
    listeners: ListenerSet,
    config: StoreConfig,
    busy: Cell<bool>,
    pending: RefCell<VecDeque<DeferredRecipe<S>>>,
    revision: Cell<u64>,
}

/// Marks the store busy for the duration of an update; unwinding included.
struct BusyGuard<'a, S> {
    inner: &'a StoreInner<S>,
}

impl<'a, S> BusyGuard<'a, S> {
    fn enter(inner: &'a StoreInner<S>) -> Self {
        inner.busy.set(true);
        Self { inner }
    }
}

impl<S> Drop for BusyGuard<'_, S> {
    fn drop(&mut self) {
        self.inner.busy.set(false);
        let dropped = self.inner.pending.borrow_mut().drain(..).count();
        if dropped > 0 {
            tracing::warn!(
                store = self.inner.config.name.as_deref().unwrap_or("store"),
                dropped,
                "discarding deferred updates after failed update"
            );
        }
    }
}

/// Shared handle to an immutable state value.
///
/// Cloning a `Store` creates a new handle to the **same** state.
pub struct Store<S> {
    inner: Rc<StoreInner<S>>,
}

impl<S> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S: std::fmt::Debug> std::fmt::Debug for Store<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.inner.config.name)
            .field("state", &self.inner.state.borrow())
            .field("revision", &self.inner.revision.get())
            .field("listeners", &self.inner.listeners.len())
            .finish()
    }
}

impl<S: Clone + PartialEq + 'static> Store<S> {
    /// Create a store using the process-wide configuration.
    #[must_use]
    pub fn new(initial: S) -> Self {
        Self::with_config(initial, global_config())
    }

    /// Create a store with an explicit configuration.
    #[must_use]
    pub fn with_config(initial: S, config: StoreConfig) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                state: RefCell::new(Rc::new(initial)),
                listeners: ListenerSet::new(),
                config,
                busy: Cell::new(false),
                pending: RefCell::new(VecDeque::new()),
                revision: Cell::new(0),
            }),
        }
    }

    /// Current state.
    #[must_use]
    pub fn get(&self) -> Rc<S> {
        Rc::clone(&self.inner.state.borrow())
    }

    /// Borrow the current state.
    pub fn with<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(self.get().as_ref())
    }

    /// Number of committed state changes.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.inner.revision.get()
    }

    /// The store's configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// Whether an update is currently being applied or notified.
    #[must_use]
    pub fn is_updating(&self) -> bool {
        self.inner.busy.get()
    }

    /// Register a listener called after every committed change.
    pub fn subscribe(&self, listener: impl Fn() + 'static) -> Subscription {
        self.inner.listeners.subscribe(Rc::new(listener))
    }

    /// Apply `recipe` to a draft of the current state and commit the result.
    ///
    /// See the module docs for the reentrancy rules. The recipe must be
    /// `'static` because a reentrant call may queue it under
    /// [`ReentrancyPolicy::Defer`]. Recipes that borrow locals go through
    /// [`try_update`](Self::try_update), which never queues.
    pub fn update<F, R>(&self, recipe: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut S) -> R + 'static,
        R: Into<Produce<S>>,
    {
        if self.inner.busy.get() {
            let policy = self.inner.config.reentrancy;
            return match policy {
                ReentrancyPolicy::Reject => {
                    tracing::warn!(store = self.name(), "reentrant update rejected");
                    Err(StoreError::Reentrant { policy })
                }
                ReentrancyPolicy::Defer => {
                    self.inner
                        .pending
                        .borrow_mut()
                        .push_back(Box::new(move |draft: &mut S| -> Produce<S> {
                            recipe(draft).into()
                        }));
                    tracing::debug!(store = self.name(), "reentrant update deferred");
                    Ok(())
                }
            };
        }

        let _guard = BusyGuard::enter(&self.inner);
        self.apply_infallible(|draft| recipe(draft).into());
        self.drain_pending();
        Ok(())
    }

    /// Replace the state with `value`.
    pub fn set(&self, value: S) -> Result<(), StoreError> {
        self.update(move |_| Some(value))
    }

    /// Apply a fallible recipe.
    ///
    /// On `Err` nothing is committed and the error is returned as
    /// [`StoreError::Recipe`]. A fallible recipe cannot be deferred, so a
    /// reentrant call is always rejected. For the same reason the recipe
    /// may borrow from the caller.
    pub fn try_update<F, R, E>(&self, recipe: F) -> Result<(), StoreError<E>>
    where
        F: FnOnce(&mut S) -> Result<R, E>,
        R: Into<Produce<S>>,
    {
        if self.inner.busy.get() {
            tracing::warn!(store = self.name(), "reentrant try_update rejected");
            return Err(StoreError::Reentrant {
                policy: self.inner.config.reentrancy,
            });
        }

        let _guard = BusyGuard::enter(&self.inner);
        self.apply(|draft| recipe(draft).map(Into::into))
            .map_err(StoreError::Recipe)?;
        self.drain_pending();
        Ok(())
    }

    /// Create a memoized selector over this store.
    pub fn selector<T: Clone + 'static>(
        &self,
        derive: impl Fn(&S) -> T + 'static,
        options: SelectorOptions<T>,
    ) -> Selector<T> {
        Selector::new(self.clone(), derive, options)
    }

    /// Create a selector parameterized by reactive inputs.
    pub fn computed_selector<I: Inputs + 'static, T: Clone + 'static>(
        &self,
        derive: impl Fn(&S, &I) -> T + 'static,
        options: SelectorOptions<T>,
    ) -> ComputedSelector<I, T> {
        ComputedSelector::new(self.clone(), derive, options)
    }

    fn name(&self) -> &str {
        self.inner.config.name.as_deref().unwrap_or("store")
    }

    fn apply<E>(&self, recipe: impl FnOnce(&mut S) -> Result<Produce<S>, E>) -> Result<(), E> {
        let mut draft = S::clone(&self.inner.state.borrow());
        let next = match recipe(&mut draft)? {
            Produce::Keep => draft,
            Produce::Replace(state) => state,
        };

        if **self.inner.state.borrow() == next {
            tracing::trace!(store = self.name(), "update produced no change");
            return Ok(());
        }

        *self.inner.state.borrow_mut() = Rc::new(next);
        let revision = self.inner.revision.get() + 1;
        self.inner.revision.set(revision);

        let notified = self.inner.listeners.notify();
        tracing::trace!(store = self.name(), revision, notified, "state committed");
        Ok(())
    }

    fn apply_infallible(&self, recipe: impl FnOnce(&mut S) -> Produce<S>) {
        if let Err(never) = self.apply(|draft| Ok::<_, Infallible>(recipe(draft))) {
            match never {}
        }
    }

    fn drain_pending(&self) {
        loop {
            let next = self.inner.pending.borrow_mut().pop_front();
            let Some(recipe) = next else {
                break;
            };
            self.apply_infallible(recipe);
        }
    }
}

impl<S: Clone + PartialEq + 'static> StateSource<S> for Store<S> {
    fn snapshot(&self) -> Rc<S> {
        self.get()
    }

    fn subscribe_listener(&self, listener: Listener) -> Subscription {
        self.inner.listeners.subscribe(listener)
    }
}
