#![forbid(unsafe_code)]

//! Reference-counted memo cell shared by [`Selector`](crate::Selector) and
//! [`ComputedSelector`](crate::ComputedSelector).
//!
//! # Design
//!
//! A `MemoCore<T>` is either **detached** (`live == None`: no cache, no
//! upstream subscriptions) or **attached** (`live == Some`: cached value,
//! consumer count, upstream subscriptions). Each [`SelectorHandle`] counts as
//! one consumer. The first attach computes and subscribes; the last detach
//! unsubscribes and drops the cache.
//!
//! Upstream listeners hold the core weakly, so the upstream never keeps a
//! selector alive.
//!
//! # Invariants
//!
//! 1. `live.count` equals the number of live handles.
//! 2. The derivation runs once per attach-from-detached, once per upstream
//!    change while attached, and once per detached `peek`. Nothing else
//!    calls it.
//! 3. A suppressed recomputation (equality says old == new) keeps the old
//!    value and version and notifies no consumer.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::equality::EqualFn;
use crate::error::SelectorError;
use crate::notify::{Listener, ListenerSet, Subscription};
use crate::tracking::{is_tracking, tracked};

pub(crate) type Derive<T> = Box<dyn Fn() -> T>;
pub(crate) type Watch = Box<dyn Fn(&Listener) -> Vec<Subscription>>;

struct Live<T> {
    value: Rc<T>,
    version: u64,
    count: usize,
    _upstream: Vec<Subscription>,
}

pub(crate) struct MemoCore<T> {
    name: &'static str,
    derive: Derive<T>,
    watch: Watch,
    equal: Option<EqualFn<T>>,
    live: RefCell<Option<Live<T>>>,
    consumers: ListenerSet,
    computations: Cell<u64>,
    on_release: Option<Box<dyn Fn()>>,
}

impl<T: Clone + 'static> MemoCore<T> {
    pub(crate) fn new(
        name: &'static str,
        derive: Derive<T>,
        watch: Watch,
        equal: Option<EqualFn<T>>,
        on_release: Option<Box<dyn Fn()>>,
    ) -> Rc<Self> {
        Rc::new(Self {
            name,
            derive,
            watch,
            equal,
            live: RefCell::new(None),
            consumers: ListenerSet::new(),
            computations: Cell::new(0),
            on_release,
        })
    }

    fn compute(&self) -> T {
        self.computations.set(self.computations.get() + 1);
        tracked(|| (self.derive)())
    }

    pub(crate) fn attach(self: &Rc<Self>) -> Result<SelectorHandle<T>, SelectorError> {
        if is_tracking() {
            tracing::warn!(selector = self.name, "attach inside derivation");
            return Err(SelectorError::Misuse(
                "cannot attach to a selector from inside a derivation",
            ));
        }

        if !self.retain() {
            let value = self.compute();
            let weak: Weak<Self> = Rc::downgrade(self);
            let listener: Listener = Rc::new(move || {
                if let Some(core) = weak.upgrade() {
                    core.on_upstream_change();
                }
            });
            let upstream = (self.watch)(&listener);
            *self.live.borrow_mut() = Some(Live {
                value: Rc::new(value),
                version: 1,
                count: 1,
                _upstream: upstream,
            });
            tracing::debug!(selector = self.name, "selector attached");
        }

        Ok(SelectorHandle {
            core: Rc::clone(self),
        })
    }

    /// Add a consumer to an attached core. Returns `false` when detached.
    fn retain(&self) -> bool {
        match self.live.borrow_mut().as_mut() {
            Some(live) => {
                live.count += 1;
                true
            }
            None => false,
        }
    }

    fn release(&self) {
        let released = {
            let mut slot = self.live.borrow_mut();
            match slot.as_mut() {
                Some(live) if live.count > 1 => {
                    live.count -= 1;
                    None
                }
                Some(_) => slot.take(),
                None => None,
            }
        };

        // Upstream subscriptions drop here, outside the borrow.
        if released.is_some() {
            drop(released);
            tracing::debug!(selector = self.name, "selector detached");
            if let Some(on_release) = &self.on_release {
                on_release();
            }
        }
    }

    fn on_upstream_change(&self) {
        if self.live.borrow().is_none() {
            return;
        }

        let value = self.compute();
        // The equality predicate runs outside the borrow; it is user code.
        let Some(old) = self.cached_rc() else {
            return;
        };
        let suppressed = self
            .equal
            .as_ref()
            .is_some_and(|equal| equal(&*old, &value));
        let propagate = !suppressed
            && match self.live.borrow_mut().as_mut() {
                Some(live) => {
                    live.value = Rc::new(value);
                    live.version += 1;
                    true
                }
                None => false,
            };

        if suppressed {
            tracing::trace!(selector = self.name, "recomputation suppressed by equality");
        } else if propagate {
            let notified = self.consumers.notify();
            tracing::trace!(selector = self.name, notified, "selector recomputed");
        }
    }

    /// Cached value when attached, fresh uncached value otherwise.
    pub(crate) fn peek(&self) -> Result<T, SelectorError> {
        if is_tracking() {
            tracing::warn!(selector = self.name, "peek inside derivation");
            return Err(SelectorError::Misuse(
                "untracked selector read inside a derivation; attach instead or wrap in untracked()",
            ));
        }
        if let Some(value) = self.cached() {
            return Ok(value);
        }
        Ok(self.compute())
    }

    pub(crate) fn cached(&self) -> Option<T> {
        self.cached_rc().map(|value| T::clone(&*value))
    }

    fn cached_rc(&self) -> Option<Rc<T>> {
        self.live.borrow().as_ref().map(|live| Rc::clone(&live.value))
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.live.borrow().is_some()
    }

    pub(crate) fn consumer_count(&self) -> usize {
        self.live.borrow().as_ref().map_or(0, |live| live.count)
    }

    pub(crate) fn computations(&self) -> u64 {
        self.computations.get()
    }
}

/// A live, auto-updating view of a selector's cached value.
///
/// Each handle is one consumer. Cloning a handle adds a consumer; dropping
/// it removes one. When the last handle drops, the selector unsubscribes
/// from its upstream and discards its cache.
pub struct SelectorHandle<T: Clone + 'static> {
    core: Rc<MemoCore<T>>,
}

impl<T: Clone + 'static> SelectorHandle<T> {
    /// Clone of the cached value. Never recomputes.
    #[must_use]
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Borrow the cached value.
    ///
    /// The closure sees the value as of the call; it may update the store,
    /// which replaces the cache without disturbing the borrow.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let value = self
            .core
            .cached_rc()
            .expect("a live handle keeps its selector attached");
        f(&*value)
    }

    /// Bumped each time a new value propagates; starts at 1.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.core
            .live
            .borrow()
            .as_ref()
            .map_or(0, |live| live.version)
    }

    /// Register a callback run whenever a new value propagates.
    pub fn subscribe(&self, callback: impl Fn() + 'static) -> Subscription {
        self.core.consumers.subscribe(Rc::new(callback))
    }

    /// Number of consumers sharing this cache.
    #[must_use]
    pub fn consumer_count(&self) -> usize {
        self.core.consumer_count()
    }
}

impl<T: Clone + 'static> Clone for SelectorHandle<T> {
    fn clone(&self) -> Self {
        self.core.retain();
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<T: Clone + 'static> Drop for SelectorHandle<T> {
    fn drop(&mut self) {
        self.core.release();
    }
}

impl<T: Clone + std::fmt::Debug + 'static> std::fmt::Debug for SelectorHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectorHandle")
            .field("selector", &self.core.name)
            .field("cached", &self.core.cached())
            .field("version", &self.version())
            .field("consumers", &self.consumer_count())
            .finish()
    }
}
