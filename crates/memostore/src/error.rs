#![forbid(unsafe_code)]

//! Error types.
//!
//! Every failure in this crate is a programmer error surfaced synchronously;
//! nothing here is transient or worth retrying.

use std::convert::Infallible;

use crate::config::ReentrancyPolicy;

/// Errors returned by [`Store`](crate::Store) writes.
///
/// `E` is the error type of a fallible recipe passed to
/// [`Store::try_update`](crate::Store::try_update); infallible writes use the
/// default.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError<E = Infallible> {
    /// An update was issued while the store was already applying a recipe
    /// or notifying listeners, and the policy does not allow queuing it.
    #[error("reentrant update rejected (policy: {policy:?})")]
    Reentrant { policy: ReentrancyPolicy },
    /// The recipe failed; the state was left unchanged.
    #[error("update recipe failed: {0}")]
    Recipe(E),
}

/// Errors returned by selector reads and attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    /// The operation was called from a context where it cannot be correct,
    /// such as a point read from inside a running derivation.
    #[error("selector misuse: {0}")]
    Misuse(&'static str),
}

/// Errors returned by [`init`](crate::init).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    /// `init` was already called in this process.
    #[error("memostore already initialized")]
    AlreadyInitialized,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err: StoreError = StoreError::Reentrant {
            policy: ReentrancyPolicy::Reject,
        };
        assert_eq!(err.to_string(), "reentrant update rejected (policy: Reject)");

        let err: StoreError<String> = StoreError::Recipe("bad input".into());
        assert_eq!(err.to_string(), "update recipe failed: bad input");

        let err = SelectorError::Misuse("peek inside derivation");
        assert_eq!(err.to_string(), "selector misuse: peek inside derivation");
    }
}
