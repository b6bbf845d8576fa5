#![forbid(unsafe_code)]

//! Immutable state store with memoized, reference-counted selectors.
//!
//! - [`Store`]: owns one immutable state value, replaced on every
//!   [`update`](Store::update) through a draft-mutating recipe, then
//!   notifies its listeners.
//! - [`Selector`]: a derivation over the store's state, cached only while at
//!   least one [`SelectorHandle`] is alive.
//! - [`ComputedSelector`]: a selector parameterized by reactive [`Inputs`],
//!   with one cache per input instance.
//! - [`Observable`]: a small reactive value, typically used as an input.
//!
//! # Architecture
//!
//! Everything is single-threaded and synchronous (`Rc<RefCell<..>>`). The
//! dependency direction is one-way: selectors hold the store through the
//! [`StateSource`] trait; the store only holds type-erased listeners.
//!
//! ```text
//! consumer ──attach──▶ Selector ──subscribe──▶ Store
//!    ▲                    │                      │
//!    └──── propagate ─────┴◀──── notify ─────────┘
//! ```
//!
//! # Invariants
//!
//! 1. A selector's consumer count equals its number of live handles; at
//!    zero it holds neither a cache nor a store subscription.
//! 2. N handles on one selector share one cache and one subscription.
//! 3. Each committed update triggers exactly one recomputation per live
//!    cache; equality functions only decide whether it propagates.
//! 4. Point reads never leave a cache or subscription behind.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use memostore::{Observable, SelectorOptions, Store, StoreConfig};
//!
//! let store = Store::with_config(0, StoreConfig::default());
//! let plus = store.computed_selector(
//!     |state: &i32, increment: &Observable<i32>| state + increment.get(),
//!     SelectorOptions::default(),
//! );
//!
//! let increment = Rc::new(Observable::new(2));
//! let handle = plus.attach(&increment).unwrap();
//! assert_eq!(handle.get(), 2);
//!
//! store.set(1).unwrap();
//! assert_eq!(handle.get(), 3);
//!
//! increment.set(3);
//! assert_eq!(handle.get(), 4);
//! ```

pub mod computed_selector;
pub mod config;
pub mod equality;
pub mod error;
#[cfg(feature = "tracing-json")]
pub mod logging;
mod memo;
pub mod notify;
pub mod observable;
pub mod selector;
pub mod source;
pub mod store;
pub mod tracking;

pub use computed_selector::ComputedSelector;
pub use config::{ReentrancyPolicy, StoreConfig, global_config, init};
pub use equality::{EqualFn, SelectorOptions, Shallow, shallow};
pub use error::{InitError, SelectorError, StoreError};
pub use memo::SelectorHandle;
pub use notify::{Listener, Subscription};
pub use observable::Observable;
pub use selector::Selector;
pub use source::{Inputs, StateSource};
pub use store::{Produce, Store};
pub use tracking::{is_tracking, untracked};

/// Persistent collections for state with structural sharing.
///
/// Cloning an `im` collection is O(1); a draft built from one shares every
/// node the recipe does not touch.
#[cfg(feature = "hamt")]
pub mod hamt {
    pub use im::{HashMap, HashSet, OrdMap, OrdSet, Vector};
}
