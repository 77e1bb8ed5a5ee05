//! # tart-eventsource
//!
//! HTTP EventSource (Server-Sent Events) transport for Tart actor domains.
//!
//! Browser-side peers open a long-lived `GET /events/<domain>` request and
//! become addressable as `ansible://<domain>/#<capability>`. Messages sent
//! through the transport are pushed down that stream as event frames.
//!
//! ## Architecture
//!
//! ```text
//!   EventSource client                EventSourceTransport                 Ansible
//!  GET /events/alice ───► endpoint ──► DomainRegistry ◄── send ◄── Receptionist ◄── tell
//!         ▲                  │              │
//!         └── data: frames ──┴── mpsc ◄─────┘
//! ```
//!
//! - **Address parsing**: [`Address`] validates `ansible://authority/#capability`
//! - **Registry**: [`DomainRegistry`] maps domains to live [`Connection`]s
//! - **Endpoint**: axum handler that accepts streams and registers domains
//! - **Send**: best-effort delivery, unknown domains are silently dropped
//! - **Lifecycle**: [`EventSourceTransport`] with idempotent `listen`/`close`
//!
//! Delivery is fire-and-forget. There is no acknowledgment, retry, ordering
//! or back-pressure guarantee.

pub mod address;
pub mod endpoint;
pub mod frame;
pub mod receptionist;
pub mod registry;
pub mod send;
pub mod server;

mod error;

pub use address::{Address, SCHEME};
pub use error::{AddressError, TransportError};
pub use receptionist::Receptionist;
pub use registry::{Connection, ConnectionId, DomainRegistry, WriteResult};
pub use send::{FailureCallback, Message, SendOutcome};
pub use server::{
    CloseAck, EventSourceTransport, LifecycleState, ListenInfo, ListenRequest, TransportConfig,
};

/// The upstream dispatcher that routes messages between actor domains.
///
/// The transport announces every newly connected domain so the dispatcher
/// can route messages addressed to it back through the receptionist.
pub trait Ansible: Send + Sync + 'static {
    /// A remote domain connected and can now receive messages.
    fn register_domain(&self, domain: &str, receptionist: Receptionist);

    /// A remote domain is no longer reachable.
    ///
    /// The transport does not call this yet; disconnects are handled
    /// locally by the registry.
    fn unregister_domain(&self, _domain: &str) {}
}
