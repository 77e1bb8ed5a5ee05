//! The receptionist: an actor-style mailbox in front of the send behavior.
//!
//! The dispatcher receives one receptionist per transport when a domain
//! connects and uses it to push messages toward that domain. Messages are
//! handled in order on a dedicated task.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::TransportError;
use crate::registry::DomainRegistry;
use crate::send::{self, Message};

/// Cloneable handle that delivers messages through the transport.
#[derive(Debug, Clone)]
pub struct Receptionist {
    mailbox: mpsc::UnboundedSender<Message>,
}

impl Receptionist {
    /// Spawn the receptionist task for `registry`.
    ///
    /// Must be called from within a Tokio runtime. The task ends once every
    /// handle has been dropped.
    pub fn spawn(registry: Arc<DomainRegistry>) -> Self {
        let (mailbox, mut inbox) = mpsc::unbounded_channel::<Message>();

        tokio::spawn(async move {
            info!("Receptionist started");
            while let Some(message) = inbox.recv().await {
                let outcome = send::deliver(&registry, message);
                debug!(?outcome, "Receptionist handled message");
            }
            info!("Receptionist stopped");
        });

        Self { mailbox }
    }

    /// Enqueue a message for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Receptionist`] if the task is gone; the
    /// message is dropped.
    pub fn tell(&self, message: Message) -> Result<(), TransportError> {
        self.mailbox
            .send(message)
            .map_err(|_| TransportError::Receptionist)
    }

    /// Whether two handles share the same mailbox.
    pub fn same_receptionist(&self, other: &Receptionist) -> bool {
        self.mailbox.same_channel(&other.mailbox)
    }
}
