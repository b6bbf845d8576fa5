#![forbid(unsafe_code)]

//! Store configuration and one-time process initialization.
//!
//! [`init`] installs the process-wide default [`StoreConfig`] used by
//! [`Store::new`](crate::Store::new). Calling it is optional; without it the
//! built-in defaults apply. Stores built with
//! [`Store::with_config`](crate::Store::with_config) ignore the global.
//!
//! # Environment
//!
//! [`StoreConfig::from_env`] reads:
//!
//! - `MEMOSTORE_REENTRANCY`: `defer` or `reject`.
//! - `MEMOSTORE_NAME`: label attached to the store's log events.

use std::env;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::InitError;

/// What a store does with an `update` issued while it is already applying
/// a recipe or running a notification pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReentrancyPolicy {
    /// Queue the nested recipe and run it after the current pass completes.
    #[default]
    Defer,
    /// Fail the nested call with [`StoreError::Reentrant`](crate::StoreError).
    Reject,
}

impl FromStr for ReentrancyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "defer" | "serialize" => Ok(Self::Defer),
            "reject" | "throw" => Ok(Self::Reject),
            other => Err(format!("unknown reentrancy policy '{other}'")),
        }
    }
}

/// Configuration for a [`Store`](crate::Store).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreConfig {
    /// Reentrant update handling.
    pub reentrancy: ReentrancyPolicy,
    /// Optional label included in log events.
    pub name: Option<String>,
}

impl StoreConfig {
    /// Defaults overridden by `MEMOSTORE_*` environment variables.
    ///
    /// Unparseable values are logged and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(val) = get("MEMOSTORE_REENTRANCY") {
            match val.parse() {
                Ok(policy) => config.reentrancy = policy,
                Err(err) => tracing::warn!(%err, "ignoring MEMOSTORE_REENTRANCY"),
            }
        }
        if let Some(val) = get("MEMOSTORE_NAME")
            && !val.is_empty()
        {
            config.name = Some(val);
        }
        config
    }

    /// Set the reentrancy policy.
    #[must_use]
    pub fn with_reentrancy(mut self, policy: ReentrancyPolicy) -> Self {
        self.reentrancy = policy;
        self
    }

    /// Set the log label.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

static GLOBAL: OnceLock<StoreConfig> = OnceLock::new();

/// Install the process-wide default store configuration.
///
/// Call once at startup, before creating stores. A second call fails and
/// leaves the first configuration in place.
pub fn init(config: StoreConfig) -> Result<(), InitError> {
    tracing::debug!(?config, "memostore init");
    GLOBAL
        .set(config)
        .map_err(|_| InitError::AlreadyInitialized)
}

/// The configuration [`Store::new`](crate::Store::new) uses.
#[must_use]
pub fn global_config() -> StoreConfig {
    GLOBAL.get().cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_parsing() {
        assert_eq!("defer".parse(), Ok(ReentrancyPolicy::Defer));
        assert_eq!(" Reject ".parse(), Ok(ReentrancyPolicy::Reject));
        assert_eq!("throw".parse(), Ok(ReentrancyPolicy::Reject));
        assert!("sometimes".parse::<ReentrancyPolicy>().is_err());
    }

    #[test]
    fn builder_methods() {
        let config = StoreConfig::default()
            .with_reentrancy(ReentrancyPolicy::Reject)
            .with_name("todos");
        assert_eq!(config.reentrancy, ReentrancyPolicy::Reject);
        assert_eq!(config.name.as_deref(), Some("todos"));
    }

    #[test]
    fn env_overrides() {
        let config = StoreConfig::from_lookup(|key| match key {
            "MEMOSTORE_REENTRANCY" => Some("reject".into()),
            "MEMOSTORE_NAME" => Some("app".into()),
            _ => None,
        });
        assert_eq!(config.reentrancy, ReentrancyPolicy::Reject);
        assert_eq!(config.name.as_deref(), Some("app"));
    }

    #[test]
    fn bad_env_values_are_ignored() {
        let config = StoreConfig::from_lookup(|key| match key {
            "MEMOSTORE_REENTRANCY" => Some("sometimes".into()),
            "MEMOSTORE_NAME" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn default_is_defer() {
        assert_eq!(StoreConfig::default().reentrancy, ReentrancyPolicy::Defer);
    }
}
