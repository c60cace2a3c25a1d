//! Error types for the vellum bridge.
//!
//! This module defines the error taxonomy for everything that can go wrong
//! between the host and the guest module:
//! - [`BridgeError`]: the single error surface of the bridge
//! - [`GuestThrow`]: the typed payload a guest throw unwinds with
//! - [`FetchError`]: transport-level failures, retried by the loader
//!
//! Every `BridgeError` payload is a plain string so the error is [`Clone`].
//! The module loader relies on this: a single failed load outcome is shared
//! verbatim with every caller that awaited the same in-flight attempt.

use thiserror::Error;

/// Errors surfaced by the vellum bridge.
///
/// The taxonomy separates failures by how the caller should react:
/// a [`GuestFault`](BridgeError::GuestFault) is deterministic and must not be
/// retried, a [`Conversion`](BridgeError::Conversion) failure is a normal
/// guest-level outcome, and loader-phase errors leave the loader in its
/// unloaded state so a later call may retry from scratch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The guest aborted the call entirely (e.g. it could not parse the
    /// options it was handed). Retrying a deterministic fault cannot succeed.
    #[error("Guest fault: {message}")]
    GuestFault {
        /// The abort message reported by the guest.
        message: String,
    },

    /// A guest-level semantic failure (e.g. unparsable MJML, or the error
    /// list reported by the Markdown converter). The bridge itself is intact.
    #[error("Conversion failed: {message}")]
    Conversion {
        /// The failure message(s) reported by the guest.
        message: String,
    },

    /// Network fetch failed, or kept returning a non-success response, for
    /// longer than the retry policy allows.
    #[error("Transport failure: {message}")]
    Transport {
        /// Description of the last failed attempt.
        message: String,
    },

    /// The on-disk module cache was unavailable or unwritable.
    ///
    /// Cache failures never propagate out of the loader; this variant exists
    /// so internal cache plumbing can report *why* it degraded to
    /// network-only operation.
    #[error("Cache failure: {message}")]
    Cache {
        /// Description of the cache failure.
        message: String,
    },

    /// Data crossing the boundary was malformed: invalid UTF-8 produced by
    /// the guest, a dead or out-of-range handle, or an out-of-bounds memory
    /// access. Always loud; silent text corruption is worse than an error.
    #[error("Marshalling fault: {message}")]
    Marshalling {
        /// Description of the malformed data.
        message: String,
    },

    /// The module bytes failed to compile.
    #[error("Compilation failed: {message}")]
    Compilation {
        /// Description of the compilation failure.
        message: String,
    },

    /// The compiled module failed to instantiate against the import table.
    #[error("Instantiation failed: {message}")]
    Instantiation {
        /// Description of the instantiation failure.
        message: String,
    },

    /// The instantiated guest is missing a required export.
    #[error("Guest export missing or mistyped: {name}")]
    MissingExport {
        /// Name of the missing export.
        name: String,
    },

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },
}

impl BridgeError {
    /// Create a new `GuestFault` error.
    pub fn guest_fault(message: impl Into<String>) -> Self {
        Self::GuestFault {
            message: message.into(),
        }
    }

    /// Create a new `Conversion` error.
    pub fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion {
            message: message.into(),
        }
    }

    /// Create a new `Transport` error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a new `Cache` error.
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Create a new `Marshalling` error.
    pub fn marshalling(message: impl Into<String>) -> Self {
        Self::Marshalling {
            message: message.into(),
        }
    }

    /// Create a new `Compilation` error.
    pub fn compilation(message: impl Into<String>) -> Self {
        Self::Compilation {
            message: message.into(),
        }
    }

    /// Create a new `Instantiation` error.
    pub fn instantiation(message: impl Into<String>) -> Self {
        Self::Instantiation {
            message: message.into(),
        }
    }

    /// Create a new `MissingExport` error.
    pub fn missing_export(name: impl Into<String>) -> Self {
        Self::MissingExport { name: name.into() }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns `true` if retrying the same call cannot succeed.
    ///
    /// Fatal guest faults and marshalling faults are deterministic; the
    /// bridge never retries them and callers should not either.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::GuestFault { .. } | Self::Marshalling { .. })
    }

    /// Returns `true` if this is a normal guest-level failure value rather
    /// than a broken bridge.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Conversion { .. })
    }
}

/// The typed payload carried by a guest throw.
///
/// When the guest calls the `throw` import, the host raises this error and
/// the guest call unwinds as a trap. The entry-point wrappers downcast the
/// trap back to `GuestThrow` and classify it: a throw from the MJML
/// converter is a recoverable [`BridgeError::Conversion`], a throw from a
/// Markdown entry point is a fatal [`BridgeError::GuestFault`].
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct GuestThrow {
    /// The message the guest threw with.
    pub message: String,
}

/// A single failed fetch attempt.
///
/// These errors are retried by the loader's backoff policy; only the last
/// one survives the retry ceiling, converted into
/// [`BridgeError::Transport`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The request could not be sent or the connection failed.
    #[error("request to {url} failed: {message}")]
    Request {
        /// The URL that was requested.
        url: String,
        /// Description of the transport failure.
        message: String,
    },

    /// The server answered with a non-success status.
    #[error("unexpected status {status} fetching {url}")]
    Status {
        /// The URL that was requested.
        url: String,
        /// The HTTP status code.
        status: u16,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BridgeError::guest_fault("could not parse options");
        assert_eq!(err.to_string(), "Guest fault: could not parse options");

        let err = BridgeError::missing_export("__wbindgen_malloc");
        assert_eq!(
            err.to_string(),
            "Guest export missing or mistyped: __wbindgen_malloc"
        );
    }

    #[test]
    fn test_is_fatal() {
        assert!(BridgeError::guest_fault("boom").is_fatal());
        assert!(BridgeError::marshalling("bad utf-8").is_fatal());
        assert!(!BridgeError::conversion("bad mjml").is_fatal());
        assert!(!BridgeError::transport("timeout").is_fatal());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(BridgeError::conversion("bad mjml").is_recoverable());
        assert!(!BridgeError::guest_fault("boom").is_recoverable());
    }

    #[test]
    fn test_errors_are_cloneable() {
        // The loader shares one failed outcome with every concurrent caller.
        let err = BridgeError::transport("connection refused");
        let shared = err.clone();
        assert_eq!(err, shared);
    }

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError::Status {
            url: "https://example.com/guest.wasm".into(),
            status: 503,
        };
        assert_eq!(
            err.to_string(),
            "unexpected status 503 fetching https://example.com/guest.wasm"
        );
    }
}
