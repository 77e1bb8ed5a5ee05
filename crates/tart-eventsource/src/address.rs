//! Addressing strings for EventSource-connected domains.
//!
//! An address has the shape `ansible://<domain>/#<capability>`. The domain is
//! the identifier a client announced when it opened `/events/<domain>`; the
//! capability is opaque to the transport and is passed back to the client
//! untouched as part of the delivered frame.

use std::fmt;
use std::str::FromStr;

use crate::error::AddressError;

/// Reserved scheme name, matched case-insensitively.
pub const SCHEME: &str = "ansible";

const SCHEME_SEPARATOR: &str = "://";
const CAPABILITY_SEPARATOR: &str = "/#";

/// A parsed `ansible://` address.
///
/// Built per send attempt and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    raw: String,
    domain: String,
    capability: String,
}

impl Address {
    /// Parse and validate an addressing string.
    ///
    /// # Errors
    ///
    /// - [`AddressError::MissingAddress`] for an empty string
    /// - [`AddressError::InvalidScheme`] when there is no `://` or the scheme
    ///   is not `ansible`
    /// - [`AddressError::MalformedUri`] unless splitting on `/#` yields
    ///   exactly two non-empty parts
    pub fn parse(address: &str) -> Result<Self, AddressError> {
        if address.is_empty() {
            return Err(AddressError::MissingAddress);
        }

        let Some((scheme, rest)) = address.split_once(SCHEME_SEPARATOR) else {
            return Err(AddressError::invalid_scheme(address));
        };

        if !scheme.eq_ignore_ascii_case(SCHEME) {
            return Err(AddressError::invalid_scheme(scheme));
        }

        let mut parts = rest.split(CAPABILITY_SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(domain), Some(capability), None)
                if !domain.is_empty() && !capability.is_empty() =>
            {
                Ok(Self {
                    raw: address.to_string(),
                    domain: domain.to_string(),
                    capability: capability.to_string(),
                })
            }
            _ => Err(AddressError::malformed_uri(address)),
        }
    }

    /// The destination domain (authority), used verbatim as the registry key.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The capability token after `/#`.
    pub fn capability(&self) -> &str {
        &self.capability
    }

    /// The address exactly as it was supplied.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
