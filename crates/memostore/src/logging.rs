#![forbid(unsafe_code)]

//! JSON log output (`tracing-json` feature).
//!
//! The crate itself only emits `tracing` events. Hosts that do not install
//! their own subscriber can call [`init_json`] once at startup; the filter
//! comes from `RUST_LOG` (for example `RUST_LOG=memostore=debug`).

use tracing_subscriber::EnvFilter;

/// Install a global JSON subscriber filtered by `RUST_LOG`.
///
/// Fails if a global subscriber is already installed.
pub fn init_json() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
}
