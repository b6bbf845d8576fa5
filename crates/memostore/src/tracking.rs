#![forbid(unsafe_code)]

//! Thread-local derivation context.
//!
//! Every selector derivation runs inside [`tracked`]. While the depth is
//! non-zero, point reads such as [`Selector::peek`](crate::Selector::peek)
//! refuse to run: a one-shot read inside a derivation is invisible to the
//! cache that owns the derivation and silently goes stale.
//!
//! [`untracked`] is the explicit escape hatch.

use std::cell::Cell;

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Restores the saved depth on drop, including during unwinding.
struct DepthGuard {
    saved: usize,
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DEPTH.with(|depth| depth.set(self.saved));
    }
}

/// Run `f` as a derivation.
pub(crate) fn tracked<R>(f: impl FnOnce() -> R) -> R {
    let saved = DEPTH.with(|depth| {
        let saved = depth.get();
        depth.set(saved + 1);
        saved
    });
    let _guard = DepthGuard { saved };
    f()
}

/// Whether the current call stack is inside a derivation.
#[must_use]
pub fn is_tracking() -> bool {
    DEPTH.with(|depth| depth.get() > 0)
}

/// Run `f` outside of any derivation context.
///
/// Reads performed by `f` are deliberately untracked: the caller accepts
/// that the surrounding derivation will not be recomputed when they change.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let saved = DEPTH.with(|depth| depth.replace(0));
    let _guard = DepthGuard { saved };
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_nests_and_restores() {
        assert!(!is_tracking());
        tracked(|| {
            assert!(is_tracking());
            tracked(|| assert!(is_tracking()));
            assert!(is_tracking());
        });
        assert!(!is_tracking());
    }

    #[test]
    fn untracked_clears_then_restores() {
        tracked(|| {
            untracked(|| assert!(!is_tracking()));
            assert!(is_tracking());
        });
    }

    #[test]
    fn depth_restored_after_panic() {
        let result = std::panic::catch_unwind(|| tracked(|| panic!("derivation failed")));
        assert!(result.is_err());
        assert!(!is_tracking());
    }
}
