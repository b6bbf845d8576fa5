#![forbid(unsafe_code)]

//! Selectors parameterized by externally owned reactive inputs.
//!
//! A [`ComputedSelector<I, T>`] derives `T` from `(state, inputs)`. Caches
//! are keyed by the **identity** of the `Rc<I>` passed to
//! [`attach`](ComputedSelector::attach): consumers passing the same `Rc`
//! share one cache and one store subscription, consumers passing different
//! `Rc`s never share, even when the inputs compare equal.
//!
//! Each cache recomputes when the store changes or when any of its inputs
//! reports a change through [`Inputs::watch`]. The selector never writes
//! its inputs.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::equality::{EqualFn, SelectorOptions};
use crate::error::SelectorError;
use crate::memo::{MemoCore, SelectorHandle};
use crate::notify::{Listener, Subscription};
use crate::source::{Inputs, StateSource};
use crate::tracking::{is_tracking, tracked};

type Evaluate<I, T> = Rc<dyn Fn(&I) -> T>;
type WatchStore = Rc<dyn Fn(&Listener) -> Subscription>;

struct ComputedInner<I, T> {
    name: &'static str,
    evaluate: Evaluate<I, T>,
    watch_store: WatchStore,
    equal: Option<EqualFn<T>>,
    entries: RefCell<HashMap<usize, Rc<MemoCore<T>>>>,
    computations: Rc<Cell<u64>>,
}

fn identity<I>(inputs: &I) -> usize {
    std::ptr::from_ref(inputs) as usize
}

fn bump(counter: &Cell<u64>) {
    counter.set(counter.get() + 1);
}

/// A memoized derivation over store state plus per-consumer inputs.
///
/// Cloning a `ComputedSelector` creates a new handle to the **same** caches.
pub struct ComputedSelector<I: 'static, T: Clone + 'static> {
    inner: Rc<ComputedInner<I, T>>,
}

impl<I: 'static, T: Clone + 'static> Clone for ComputedSelector<I, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<I: Inputs + 'static, T: Clone + 'static> ComputedSelector<I, T> {
    /// Build a computed selector over any state source.
    ///
    /// Usually created through
    /// [`Store::computed_selector`](crate::Store::computed_selector).
    pub fn new<S: 'static>(
        source: impl StateSource<S> + 'static,
        derive: impl Fn(&S, &I) -> T + 'static,
        options: SelectorOptions<T>,
    ) -> Self {
        let source: Rc<dyn StateSource<S>> = Rc::new(source);
        let read = Rc::clone(&source);
        Self {
            inner: Rc::new(ComputedInner {
                name: options.name,
                evaluate: Rc::new(move |inputs: &I| derive(read.snapshot().as_ref(), inputs)),
                watch_store: Rc::new(move |listener: &Listener| {
                    source.subscribe_listener(Rc::clone(listener))
                }),
                equal: options.equal,
                entries: RefCell::new(HashMap::new()),
                computations: Rc::new(Cell::new(0)),
            }),
        }
    }

    /// Add a consumer for this input instance and return its live handle.
    ///
    /// Fails with [`SelectorError::Misuse`] when called from inside a
    /// derivation.
    pub fn attach(&self, inputs: &Rc<I>) -> Result<SelectorHandle<T>, SelectorError> {
        if is_tracking() {
            tracing::warn!(selector = self.inner.name, "attach inside derivation");
            return Err(SelectorError::Misuse(
                "cannot attach to a selector from inside a derivation",
            ));
        }

        let key = identity(inputs.as_ref());
        let existing = self.inner.entries.borrow().get(&key).cloned();
        let core = match existing {
            Some(core) => core,
            None => {
                let core = self.entry_for(key, inputs);
                self.inner
                    .entries
                    .borrow_mut()
                    .insert(key, Rc::clone(&core));
                tracing::debug!(
                    selector = self.inner.name,
                    live_entries = self.live_entries(),
                    "computed selector entry created"
                );
                core
            }
        };
        core.attach()
    }

    /// One-shot read for these inputs.
    ///
    /// If `inputs` is the very instance some consumer attached with, the
    /// cached value is returned without recomputation. Otherwise a fresh
    /// value is computed and nothing is cached or subscribed.
    pub fn peek(&self, inputs: &I) -> Result<T, SelectorError> {
        if is_tracking() {
            tracing::warn!(selector = self.inner.name, "peek inside derivation");
            return Err(SelectorError::Misuse(
                "untracked selector read inside a derivation; attach instead or wrap in untracked()",
            ));
        }
        let cached = self
            .inner
            .entries
            .borrow()
            .get(&identity(inputs))
            .and_then(|core| core.cached());
        match cached {
            Some(value) => Ok(value),
            None => {
                bump(&self.inner.computations);
                Ok(tracked(|| (self.inner.evaluate)(inputs)))
            }
        }
    }

    /// Number of input instances with a live cache.
    #[must_use]
    pub fn live_entries(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    /// Consumers attached with this exact input instance.
    #[must_use]
    pub fn consumer_count(&self, inputs: &Rc<I>) -> usize {
        self.inner
            .entries
            .borrow()
            .get(&identity(inputs.as_ref()))
            .map_or(0, |core| core.consumer_count())
    }

    /// Total derivation calls across every input instance, including
    /// detached reads and caches since torn down.
    #[must_use]
    pub fn computations(&self) -> u64 {
        self.inner.computations.get()
    }

    fn entry_for(&self, key: usize, inputs: &Rc<I>) -> Rc<MemoCore<T>> {
        let evaluate = Rc::clone(&self.inner.evaluate);
        let computations = Rc::clone(&self.inner.computations);
        let derive_inputs = Rc::clone(inputs);
        let watch_store = Rc::clone(&self.inner.watch_store);
        let watch_inputs = Rc::clone(inputs);
        let weak: Weak<ComputedInner<I, T>> = Rc::downgrade(&self.inner);

        MemoCore::new(
            self.inner.name,
            Box::new(move || {
                bump(&computations);
                evaluate(&derive_inputs)
            }),
            Box::new(move |listener: &Listener| {
                let mut subs = vec![watch_store(listener)];
                subs.extend(watch_inputs.watch(listener));
                subs
            }),
            self.inner.equal.clone(),
            Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    let removed = inner.entries.borrow_mut().remove(&key);
                    drop(removed);
                }
            })),
        )
    }
}

impl<I: 'static, T: Clone + 'static> std::fmt::Debug for ComputedSelector<I, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputedSelector")
            .field("name", &self.inner.name)
            .field("live_entries", &self.inner.entries.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::observable::Observable;
    use crate::store::Store;

    struct Increment {
        by: Observable<i32>,
    }

    impl Inputs for Increment {
        fn watch(&self, listener: &Listener) -> Vec<Subscription> {
            self.by.watch(listener)
        }
    }

    fn fixture() -> (Store<i32>, ComputedSelector<Increment, i32>) {
        let store = Store::with_config(0, StoreConfig::default());
        let selector = store.computed_selector(
            |state: &i32, inputs: &Increment| state + inputs.by.get(),
            SelectorOptions::default(),
        );
        (store, selector)
    }

    fn increment(by: i32) -> Rc<Increment> {
        Rc::new(Increment {
            by: Observable::new(by),
        })
    }

    #[test]
    fn same_instance_shares_cache_and_subscription() {
        let (store, selector) = fixture();
        let inputs = increment(2);

        let a = selector.attach(&inputs).unwrap();
        let b = selector.attach(&inputs).unwrap();
        assert_eq!(selector.live_entries(), 1);
        assert_eq!(selector.consumer_count(&inputs), 2);
        assert_eq!(selector.computations(), 1);
        assert_eq!(store.listener_count(), 1);
        assert_eq!((a.get(), b.get()), (2, 2));
    }

    #[test]
    fn equal_but_distinct_instances_never_share() {
        let (store, selector) = fixture();
        let first = increment(2);
        let second = increment(2);

        let a = selector.attach(&first).unwrap();
        let b = selector.attach(&second).unwrap();
        assert_eq!(selector.live_entries(), 2);
        assert_eq!(store.listener_count(), 2);

        store.set(1).unwrap();
        assert_eq!((a.get(), b.get()), (3, 3));
        assert_eq!(selector.computations(), 4);
    }

    #[test]
    fn input_change_recomputes_only_its_entry() {
        let (_store, selector) = fixture();
        let first = increment(2);
        let second = increment(3);
        let a = selector.attach(&first).unwrap();
        let b = selector.attach(&second).unwrap();

        first.by.set(10);
        assert_eq!(a.get(), 10);
        assert_eq!(b.get(), 3);
        assert_eq!(selector.computations(), 3);
    }

    #[test]
    fn last_detach_removes_entry_and_subscriptions() {
        let (store, selector) = fixture();
        let inputs = increment(1);
        let handle = selector.attach(&inputs).unwrap();
        assert_eq!(inputs.by.subscriber_count(), 1);
        assert_eq!(Rc::strong_count(&inputs), 3);

        drop(handle);
        assert_eq!(selector.live_entries(), 0);
        assert_eq!(store.listener_count(), 0);
        assert_eq!(inputs.by.subscriber_count(), 0);
        assert_eq!(Rc::strong_count(&inputs), 1);
    }

    #[test]
    fn peek_uses_cache_only_for_the_attached_instance() {
        let (_store, selector) = fixture();
        let attached = increment(5);
        let _handle = selector.attach(&attached).unwrap();

        assert_eq!(selector.peek(&attached), Ok(5));
        assert_eq!(selector.computations(), 1);

        let other = Increment {
            by: Observable::new(7),
        };
        assert_eq!(selector.peek(&other), Ok(7));
        assert_eq!(selector.live_entries(), 1);
    }

    #[test]
    fn detached_entries_do_not_recompute() {
        let calls = Rc::new(Cell::new(0));
        let calls_clone = Rc::clone(&calls);
        let store = Store::with_config(0, StoreConfig::default());
        let selector = store.computed_selector(
            move |state: &i32, inputs: &Observable<i32>| {
                calls_clone.set(calls_clone.get() + 1);
                state + inputs.get()
            },
            SelectorOptions::default(),
        );

        let inputs = Rc::new(Observable::new(1));
        let handle = selector.attach(&inputs).unwrap();
        store.set(1).unwrap();
        drop(handle);

        store.set(2).unwrap();
        inputs.set(9);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn computations_survive_teardown() {
        let (store, selector) = fixture();
        let inputs = increment(1);
        let handle = selector.attach(&inputs).unwrap();
        store.set(1).unwrap();
        assert_eq!(selector.computations(), 2);

        drop(handle);
        assert_eq!(selector.live_entries(), 0);
        assert_eq!(selector.computations(), 2);

        assert_eq!(selector.peek(&inputs), Ok(2));
        assert_eq!(selector.computations(), 3);
    }

    #[test]
    fn equality_applies_per_entry() {
        let store = Store::with_config(0, StoreConfig::default());
        let selector = store.computed_selector(
            |state: &i32, limit: &Observable<i32>| (*state).min(limit.get()),
            SelectorOptions::partial_eq(),
        );
        let limit = Rc::new(Observable::new(2));
        let handle = selector.attach(&limit).unwrap();
        let hits = Rc::new(Cell::new(0));
        let hits_clone = Rc::clone(&hits);
        let _sub = handle.subscribe(move || hits_clone.set(hits_clone.get() + 1));

        store.set(5).unwrap();
        store.set(6).unwrap();
        assert_eq!(handle.get(), 2);
        assert_eq!(hits.get(), 1);
    }
}
