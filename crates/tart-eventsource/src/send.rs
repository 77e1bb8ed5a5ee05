//! Best-effort delivery of one message to one connected domain.

use std::fmt;

use tracing::{debug, warn};

use crate::address::Address;
use crate::error::{AddressError, TransportError};
use crate::frame::encode_event;
use crate::registry::{DomainRegistry, WriteResult};

/// Called at most once when a message cannot be routed.
pub type FailureCallback = Box<dyn FnOnce(TransportError) + Send + 'static>;

/// An outbound message.
pub struct Message {
    /// Destination, `ansible://<domain>/#<capability>`
    pub address: Option<String>,
    /// Opaque payload
    pub content: String,
    /// Invoked with the reason when the address is rejected
    pub fail: Option<FailureCallback>,
}

impl Message {
    /// Create a message for `address`.
    pub fn new(address: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            content: content.into(),
            fail: None,
        }
    }

    /// Create a message without a destination.
    pub fn unaddressed(content: impl Into<String>) -> Self {
        Self {
            address: None,
            content: content.into(),
            fail: None,
        }
    }

    /// Attach a failure callback.
    pub fn on_fail<F>(mut self, fail: F) -> Self
    where
        F: FnOnce(TransportError) + Send + 'static,
    {
        self.fail = Some(Box::new(fail));
        self
    }

    fn reject(self, error: AddressError) -> SendOutcome {
        debug!(error = %error, "Rejected outbound message");
        if let Some(fail) = self.fail {
            fail(TransportError::Address(error));
        }
        SendOutcome::Rejected
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("address", &self.address)
            .field("content_len", &self.content.len())
            .field("has_fail", &self.fail.is_some())
            .finish()
    }
}

/// What happened to a message.
///
/// Only `Rejected` is reported to the sender; the others are silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// One frame was queued on the destination stream
    Delivered,
    /// No stream is registered for the destination domain
    NoRoute,
    /// The destination stream buffer was full
    Dropped,
    /// The address was missing or malformed
    Rejected,
}

/// Route `message` to its domain's stream.
///
/// Writes are fire-and-forget: nothing is awaited and an unreachable domain
/// is not an error.
pub fn deliver(registry: &DomainRegistry, message: Message) -> SendOutcome {
    let address = match message.address.as_deref() {
        None => return message.reject(AddressError::MissingAddress),
        Some(raw) => Address::parse(raw),
    };
    let address = match address {
        Ok(address) => address,
        Err(e) => return message.reject(e),
    };

    let Some(connection) = registry.resolve(address.domain()) else {
        debug!(domain = %address.domain(), "No stream for domain, dropping message");
        return SendOutcome::NoRoute;
    };

    match connection.try_write(encode_event(address.as_str(), &message.content)) {
        WriteResult::Written => {
            debug!(domain = %address.domain(), connection = %connection.id(), "Frame queued");
            SendOutcome::Delivered
        }
        WriteResult::Full => {
            warn!(
                domain = %address.domain(),
                connection = %connection.id(),
                "Stream buffer full, dropping message"
            );
            SendOutcome::Dropped
        }
        WriteResult::Closed => {
            debug!(
                domain = %address.domain(),
                connection = %connection.id(),
                "Stream closed, dropping message"
            );
            registry.evict_closed(address.domain(), connection.id());
            SendOutcome::NoRoute
        }
    }
}
