//! Error types for the EventSource transport.

use std::io;

use thiserror::Error;

/// Reasons an addressing string cannot be routed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// No address was supplied with the message.
    #[error("Missing address")]
    MissingAddress,

    /// The scheme is absent or is not `ansible`.
    #[error("Invalid protocol {scheme}")]
    InvalidScheme {
        /// Whatever preceded `://`, or the whole string when there is none
        scheme: String,
    },

    /// The authority and capability could not be separated by `/#`.
    #[error("Invalid URI {address}")]
    MalformedUri {
        /// The offending address
        address: String,
    },
}

impl AddressError {
    /// Create a new invalid scheme error.
    pub fn invalid_scheme(scheme: impl Into<String>) -> Self {
        Self::InvalidScheme {
            scheme: scheme.into(),
        }
    }

    /// Create a new malformed URI error.
    pub fn malformed_uri(address: impl Into<String>) -> Self {
        Self::MalformedUri {
            address: address.into(),
        }
    }
}

/// Transport errors surfaced to listen/send continuations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The destination address was rejected
    #[error(transparent)]
    Address(#[from] AddressError),

    /// The listening socket could not be bound
    #[error("Failed to bind {addr}: {source}")]
    BindFailure {
        /// The `host:port` that was requested
        addr: String,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// The HTTP server stopped with an error
    #[error("Server error: {0}")]
    Serve(#[source] io::Error),

    /// The receptionist task is no longer running
    #[error("Receptionist is not running")]
    Receptionist,
}

impl TransportError {
    /// Create a new bind failure.
    pub fn bind_failure(addr: impl Into<String>, source: io::Error) -> Self {
        Self::BindFailure {
            addr: addr.into(),
            source,
        }
    }

    /// The address error behind this failure, if any.
    pub fn address_error(&self) -> Option<&AddressError> {
        match self {
            Self::Address(e) => Some(e),
            _ => None,
        }
    }
}
