//! Error kinds for the plugin dispatch layer and path-manager facade.

use thiserror::Error;

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by plugin loading, dispatch, and the path-manager facade.
///
/// Kinds mirror the daemon's error taxonomy rather than Rust type names, so
/// callers can match on the kind of failure instead of its cause.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing/invalid plugin directory, or a permission failure. Fatal at
    /// startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The MPTCP family is not currently present in the kernel.
    #[error("path manager unavailable: MPTCP family not resolved")]
    Unavailable,

    /// The running kernel's schema does not expose this command.
    #[error("command not supported by this kernel's MPTCP schema")]
    Unsupported,

    /// Unknown token on an event other than `CREATED`, or an unknown
    /// strategy name on `CREATED`.
    #[error("plugin state error: {0}")]
    PluginState(String),

    /// Underlying netlink transport or codec failure.
    #[error(transparent)]
    Transport(#[from] nlink::Error),

    /// Shared-object loading or symbol resolution failure.
    #[error("failed to load plugin {path}: {reason}")]
    PluginLoad {
        /// Path of the shared object that failed to load.
        path: String,
        /// Human-readable reason.
        reason: String,
    },
}

impl Error {
    /// True for errors a command caller should treat as retryable once the
    /// family reappears, per the `Unavailable` error kind.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Error::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_is_detected() {
        assert!(Error::Unavailable.is_unavailable());
        assert!(!Error::Unsupported.is_unavailable());
    }

    #[test]
    fn messages_are_stable() {
        assert_eq!(
            Error::Configuration("plugin directory is world-writable".into()).to_string(),
            "configuration error: plugin directory is world-writable"
        );
        assert_eq!(
            Error::PluginState("unknown token 0xdead".into()).to_string(),
            "plugin state error: unknown token 0xdead"
        );
    }
}
