#![forbid(unsafe_code)]

//! Equality configuration for selectors.
//!
//! By default a selector propagates every recomputation: freshly derived
//! values never share identity with the previous one. An equality function
//! lets callers suppress propagation when the new value is equivalent to the
//! cached one.
//!
//! [`Shallow`] compares collections entry by entry using `Rc` pointer
//! identity. It pays off when derived values are assembled from `Rc` pieces
//! of the store state: untouched pieces keep their allocation across
//! updates, so a shallow comparison is both cheap and exact.

use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash};
use std::rc::Rc;

/// Shared equality predicate.
pub type EqualFn<T> = Rc<dyn Fn(&T, &T) -> bool>;

/// Per-selector options.
pub struct SelectorOptions<T> {
    /// Suppresses propagation when it returns `true` for (old, new).
    pub equal: Option<EqualFn<T>>,
    /// Label used in log events.
    pub name: &'static str,
}

impl<T> Default for SelectorOptions<T> {
    fn default() -> Self {
        Self {
            equal: None,
            name: "selector",
        }
    }
}

impl<T> Clone for SelectorOptions<T> {
    fn clone(&self) -> Self {
        Self {
            equal: self.equal.clone(),
            name: self.name,
        }
    }
}

impl<T> std::fmt::Debug for SelectorOptions<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectorOptions")
            .field("equal", &self.equal.is_some())
            .field("name", &self.name)
            .finish()
    }
}

impl<T: 'static> SelectorOptions<T> {
    /// Use a custom equality predicate.
    #[must_use]
    pub fn with_equal(equal: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self {
            equal: Some(Rc::new(equal)),
            ..Self::default()
        }
    }

    /// Set the log label.
    #[must_use]
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

impl<T: PartialEq + 'static> SelectorOptions<T> {
    /// Suppress propagation of values equal by `PartialEq`.
    #[must_use]
    pub fn partial_eq() -> Self {
        Self::with_equal(|a: &T, b: &T| a == b)
    }
}

impl<T: Shallow + 'static> SelectorOptions<T> {
    /// Suppress propagation of shallowly equal values.
    #[must_use]
    pub fn shallow() -> Self {
        Self::with_equal(|a: &T, b: &T| a.shallow_eq(b))
    }
}

/// One-level equality by `Rc` identity.
pub trait Shallow {
    /// Whether `self` and `other` hold the same allocations.
    fn shallow_eq(&self, other: &Self) -> bool;
}

/// Free-function form of [`Shallow::shallow_eq`].
pub fn shallow<T: Shallow + ?Sized>(a: &T, b: &T) -> bool {
    a.shallow_eq(b)
}

impl<T: ?Sized> Shallow for Rc<T> {
    fn shallow_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

impl<T: Shallow> Shallow for Option<T> {
    fn shallow_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.shallow_eq(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: ?Sized> Shallow for [Rc<T>] {
    fn shallow_eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
            || (self.len() == other.len()
                && self.iter().zip(other).all(|(a, b)| Rc::ptr_eq(a, b)))
    }
}

impl<T: ?Sized> Shallow for Vec<Rc<T>> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.as_slice().shallow_eq(other.as_slice())
    }
}

impl<K: Ord, V: ?Sized> Shallow for BTreeMap<K, Rc<V>> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, a)| other.get(key).is_some_and(|b| Rc::ptr_eq(a, b)))
    }
}

impl<K: Eq + Hash, V: ?Sized, H: BuildHasher> Shallow for HashMap<K, Rc<V>, H> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, a)| other.get(key).is_some_and(|b| Rc::ptr_eq(a, b)))
    }
}

#[cfg(feature = "hamt")]
mod hamt_impls {
    use super::Shallow;
    use std::hash::{BuildHasher, Hash};
    use std::rc::Rc;

    impl<T> Shallow for im::Vector<Rc<T>> {
        fn shallow_eq(&self, other: &Self) -> bool {
            self.ptr_eq(other)
                || (self.len() == other.len()
                    && self.iter().zip(other.iter()).all(|(a, b)| Rc::ptr_eq(a, b)))
        }
    }

    impl<K: Hash + Eq + Clone, V, S: BuildHasher> Shallow for im::HashMap<K, Rc<V>, S> {
        fn shallow_eq(&self, other: &Self) -> bool {
            self.ptr_eq(other)
                || (self.len() == other.len()
                    && self
                        .iter()
                        .all(|(key, a)| other.get(key).is_some_and(|b| Rc::ptr_eq(a, b))))
        }
    }

    impl<K: Ord + Clone, V> Shallow for im::OrdMap<K, Rc<V>> {
        fn shallow_eq(&self, other: &Self) -> bool {
            self.ptr_eq(other)
                || (self.len() == other.len()
                    && self
                        .iter()
                        .all(|(key, a)| other.get(key).is_some_and(|b| Rc::ptr_eq(a, b))))
        }
    }
}
