//! Domain Registry for server-push message routing.
//!
//! Tracks the live EventSource stream of every connected domain so outbound
//! messages can be written to it.
//!
//! ```text
//! GET /events/alice ──► register("alice", Connection) ──► DashMap<String, Connection>
//!                                                              │
//!                           send(ansible://alice/#cap) ──► resolve("alice")
//!                                                              │
//!                                                        mpsc::Sender<Bytes> ──► response body
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::body::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one accepted stream.
///
/// Distinguishes a reconnect under the same domain from the stream it
/// replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Result of writing a frame to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteResult {
    /// Frame was queued on the stream
    Written,
    /// The stream buffer is full and the frame was dropped
    Full,
    /// The stream has gone away
    Closed,
}

/// Outbound half of an EventSource stream.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    sender: mpsc::Sender<Bytes>,
}

impl Connection {
    /// Create a connection and the receiver that feeds its response body.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let connection = Self {
            id: ConnectionId::next(),
            sender,
        };
        (connection, receiver)
    }

    /// Identity of this stream.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue an encoded frame without waiting.
    pub fn try_write(&self, frame: Bytes) -> WriteResult {
        match self.sender.try_send(frame) {
            Ok(()) => WriteResult::Written,
            Err(mpsc::error::TrySendError::Full(_)) => WriteResult::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => WriteResult::Closed,
        }
    }

    /// Whether the receiving side (the response body) has been dropped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Registry of connected domains.
///
/// Thread-safe map from domain to [`Connection`]. The last registration for
/// a domain wins.
pub struct DomainRegistry {
    domains: DashMap<String, Connection>,
}

impl DomainRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            domains: DashMap::new(),
        }
    }

    /// Register a domain with its stream, replacing any earlier one.
    ///
    /// Returns `true` if an existing registration was replaced. A reconnect
    /// under the same domain re-establishes presence; it is not an error.
    #[instrument(skip(self, connection), fields(connection = %connection.id()))]
    pub fn register(&self, domain: &str, connection: Connection) -> bool {
        let replaced = self.domains.insert(domain.to_string(), connection);
        match replaced {
            Some(previous) => {
                debug!(previous = %previous.id(), "Replaced existing domain registration");
                true
            }
            None => {
                debug!("Registered new domain");
                false
            }
        }
    }

    /// Look up the live stream for a domain.
    pub fn resolve(&self, domain: &str) -> Option<Connection> {
        self.domains.get(domain).map(|entry| entry.value().clone())
    }

    /// Remove a domain. Unknown domains are ignored.
    #[instrument(skip(self))]
    pub fn unregister(&self, domain: &str) -> Option<Connection> {
        let removed = self.domains.remove(domain).map(|(_, connection)| connection);
        if removed.is_some() {
            debug!("Unregistered domain");
        } else {
            debug!("Domain was not registered");
        }
        removed
    }

    /// Remove a domain only while it is still bound to `connection`.
    ///
    /// A stream that closes after being replaced leaves the newer
    /// registration in place.
    #[instrument(skip(self, connection), fields(connection = %connection))]
    pub fn unregister_connection(&self, domain: &str, connection: ConnectionId) -> bool {
        let removed = self
            .domains
            .remove_if(domain, |_, current| current.id() == connection)
            .is_some();
        if removed {
            debug!("Unregistered domain");
        } else {
            debug!("Domain already replaced or removed");
        }
        removed
    }

    /// Check if a domain is currently connected.
    pub fn contains(&self, domain: &str) -> bool {
        self.domains.contains_key(domain)
    }

    /// Number of connected domains.
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    /// Whether no domain is connected.
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// List connected domains.
    pub fn domains(&self) -> Vec<String> {
        self.domains.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Remove all entries whose stream has already gone away.
    pub fn cleanup_stale(&self) -> usize {
        let before = self.domains.len();
        self.domains.retain(|domain, connection| {
            let stale = connection.is_closed();
            if stale {
                debug!(domain = %domain, connection = %connection.id(), "Removed stale domain");
            }
            !stale
        });
        let removed = before.saturating_sub(self.domains.len());

        if removed > 0 {
            info!(count = removed, "Cleaned up stale domains");
        }

        removed
    }

    /// Evict `domain` if its stream is `connection` and it has closed.
    pub(crate) fn evict_closed(&self, domain: &str, connection: ConnectionId) {
        if self
            .domains
            .remove_if(domain, |_, current| {
                current.id() == connection && current.is_closed()
            })
            .is_some()
        {
            warn!(domain = %domain, connection = %connection, "Evicted closed stream");
        }
    }
}

impl Default for DomainRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DomainRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainRegistry")
            .field("domain_count", &self.domains.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        let registry = DomainRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_register_then_resolve() {
        let registry = DomainRegistry::new();
        let (connection, _rx) = Connection::channel(16);
        let id = connection.id();

        assert!(!registry.register("alice", connection));

        let resolved = registry.resolve("alice").unwrap();
        assert_eq!(resolved.id(), id);
        assert!(registry.contains("alice"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_then_resolve() {
        let registry = DomainRegistry::new();
        let (connection, _rx) = Connection::channel(16);
        registry.register("alice", connection);

        let removed = registry.unregister("alice");
        assert!(removed.is_some());
        assert!(registry.resolve("alice").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_replaces_existing() {
        let registry = DomainRegistry::new();
        let (first, _rx1) = Connection::channel(16);
        let (second, _rx2) = Connection::channel(16);
        let second_id = second.id();

        registry.register("alice", first);
        assert!(registry.register("alice", second));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve("alice").unwrap().id(), second_id);
    }

    #[test]
    fn test_unregister_nonexistent() {
        let registry = DomainRegistry::new();
        assert!(registry.unregister("nobody").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_connection_ignores_replaced_stream() {
        let registry = DomainRegistry::new();
        let (first, _rx1) = Connection::channel(16);
        let (second, _rx2) = Connection::channel(16);
        let first_id = first.id();
        let second_id = second.id();

        registry.register("alice", first);
        registry.register("alice", second);

        // The replaced stream closing must not evict the new one
        assert!(!registry.unregister_connection("alice", first_id));
        assert_eq!(registry.resolve("alice").unwrap().id(), second_id);

        assert!(registry.unregister_connection("alice", second_id));
        assert!(!registry.contains("alice"));
    }

    #[tokio::test]
    async fn test_try_write() {
        let (connection, mut rx) = Connection::channel(1);

        assert_eq!(
            connection.try_write(Bytes::from_static(b"one")),
            WriteResult::Written
        );
        assert_eq!(
            connection.try_write(Bytes::from_static(b"two")),
            WriteResult::Full
        );
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"one"));

        drop(rx);
        assert!(connection.is_closed());
        assert_eq!(
            connection.try_write(Bytes::from_static(b"three")),
            WriteResult::Closed
        );
    }

    #[test]
    fn test_list_domains() {
        let registry = DomainRegistry::new();
        let (tx1, _rx1) = Connection::channel(16);
        let (tx2, _rx2) = Connection::channel(16);

        registry.register("alice", tx1);
        registry.register("bob", tx2);

        let mut domains = registry.domains();
        domains.sort();
        assert_eq!(domains, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[test]
    fn test_cleanup_stale() {
        let registry = DomainRegistry::new();
        let (live, _live_rx) = Connection::channel(16);
        let (stale, stale_rx) = Connection::channel(16);

        registry.register("alice", live);
        registry.register("bob", stale);
        drop(stale_rx);

        assert_eq!(registry.cleanup_stale(), 1);
        assert!(registry.contains("alice"));
        assert!(!registry.contains("bob"));
    }

    #[test]
    fn test_evict_closed_requires_closed_stream() {
        let registry = DomainRegistry::new();
        let (connection, rx) = Connection::channel(16);
        let id = connection.id();
        registry.register("alice", connection);

        registry.evict_closed("alice", id);
        assert!(registry.contains("alice"));

        drop(rx);
        registry.evict_closed("alice", id);
        assert!(!registry.contains("alice"));
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let (a, _rx1) = Connection::channel(1);
        let (b, _rx2) = Connection::channel(1);
        assert_ne!(a.id(), b.id());
    }
}
