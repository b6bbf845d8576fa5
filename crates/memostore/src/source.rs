#![forbid(unsafe_code)]

//! The seams between selectors and the values they read.
//!
//! A selector never sees a concrete [`Store`](crate::Store): it holds a
//! [`StateSource`], which is just a read accessor plus a subscribe function.
//! Parameterized selectors additionally watch their [`Inputs`].

use std::rc::Rc;

use crate::notify::{Listener, Subscription};
use crate::observable::Observable;

/// Read accessor and change feed for a piece of state.
pub trait StateSource<S> {
    /// Current value. Must be cheap and free of side effects.
    fn snapshot(&self) -> Rc<S>;

    /// Register a no-argument change listener.
    fn subscribe_listener(&self, listener: Listener) -> Subscription;
}

/// Externally owned reactive inputs of a
/// [`ComputedSelector`](crate::ComputedSelector).
///
/// The selector only reads inputs and listens for their changes; it never
/// writes them.
pub trait Inputs {
    /// Register `listener` with every reactive value in the input set.
    fn watch(&self, listener: &Listener) -> Vec<Subscription>;
}

impl Inputs for () {
    fn watch(&self, _listener: &Listener) -> Vec<Subscription> {
        Vec::new()
    }
}

impl<T: Clone + PartialEq + 'static> Inputs for Observable<T> {
    fn watch(&self, listener: &Listener) -> Vec<Subscription> {
        vec![self.subscribe_listener(Rc::clone(listener))]
    }
}

impl<I: Inputs + ?Sized> Inputs for Rc<I> {
    fn watch(&self, listener: &Listener) -> Vec<Subscription> {
        (**self).watch(listener)
    }
}

impl<I: Inputs> Inputs for [I] {
    fn watch(&self, listener: &Listener) -> Vec<Subscription> {
        self.iter().flat_map(|input| input.watch(listener)).collect()
    }
}

impl<I: Inputs> Inputs for Vec<I> {
    fn watch(&self, listener: &Listener) -> Vec<Subscription> {
        self.as_slice().watch(listener)
    }
}

macro_rules! impl_inputs_for_tuple {
    ($($name:ident),+) => {
        impl<$($name: Inputs),+> Inputs for ($($name,)+) {
            #[allow(non_snake_case)]
            fn watch(&self, listener: &Listener) -> Vec<Subscription> {
                let ($($name,)+) = self;
                let mut subs = Vec::new();
                $(subs.extend($name.watch(listener));)+
                subs
            }
        }
    };
}

impl_inputs_for_tuple!(A);
impl_inputs_for_tuple!(A, B);
impl_inputs_for_tuple!(A, B, C);
impl_inputs_for_tuple!(A, B, C, D);
