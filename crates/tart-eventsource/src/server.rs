//! Transport lifecycle: listen, send and close.
//!
//! ```text
//! Idle ──listen──► Starting ──bound──► Listening ──close──► Closing ──drained──► Idle
//!                     │
//!                     └──bind failed──► Idle
//! ```
//!
//! `listen` outside `Idle` and `close` outside `Listening` are no-ops.
//! Dropping a `listen` or `close` future midway leaves the transport `Idle`.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::endpoint::{self, EndpointState};
use crate::error::TransportError;
use crate::receptionist::Receptionist;
use crate::registry::DomainRegistry;
use crate::send::{self, Message, SendOutcome};
use crate::Ansible;

/// Per-stream buffer used when none is configured.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Frames buffered per stream before new ones are dropped
    pub channel_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Where the transport ended up listening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenInfo {
    /// Host as requested
    pub host: String,
    /// Bound port (the real one when `0` was requested)
    pub port: u16,
}

type ListenOk = Box<dyn FnOnce(ListenInfo) + Send + 'static>;
type ListenFail = Box<dyn FnOnce(TransportError) + Send + 'static>;

/// Invoked once the server has fully closed.
pub type CloseAck = Box<dyn FnOnce() + Send + 'static>;

/// A request to start listening.
pub struct ListenRequest {
    /// Interface to bind
    pub host: String,
    /// Port to bind, `0` for any
    pub port: u16,
    /// Called once the socket is bound
    pub ok: Option<ListenOk>,
    /// Called if the socket cannot be bound
    pub fail: Option<ListenFail>,
}

impl ListenRequest {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ok: None,
            fail: None,
        }
    }

    /// Attach a success continuation.
    pub fn on_ok<F>(mut self, ok: F) -> Self
    where
        F: FnOnce(ListenInfo) + Send + 'static,
    {
        self.ok = Some(Box::new(ok));
        self
    }

    /// Attach a failure continuation.
    pub fn on_fail<F>(mut self, fail: F) -> Self
    where
        F: FnOnce(TransportError) + Send + 'static,
    {
        self.fail = Some(Box::new(fail));
        self
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Debug for ListenRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenRequest")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

/// Lifecycle state of the listening socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No socket
    Idle,
    /// Bind in progress
    Starting,
    /// Accepting connections
    Listening,
    /// Draining open streams
    Closing,
}

struct Running {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<std::io::Result<()>>,
}

struct Lifecycle {
    state: LifecycleState,
    running: Option<Running>,
}

/// Puts the lifecycle back to `Idle` if a transition is abandoned midway,
/// e.g. when the `listen` or `close` future is dropped.
struct ResetOnDrop<'a> {
    lifecycle: &'a Mutex<Lifecycle>,
    armed: bool,
}

impl<'a> ResetOnDrop<'a> {
    fn new(lifecycle: &'a Mutex<Lifecycle>) -> Self {
        Self {
            lifecycle,
            armed: true,
        }
    }

    fn defuse(mut self) {
        self.armed = false;
    }
}

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
            warn!(state = ?lifecycle.state, "Lifecycle transition abandoned, resetting to idle");
            lifecycle.state = LifecycleState::Idle;
            lifecycle.running = None;
        }
    }
}

/// HTTP EventSource transport.
///
/// Exposes the three behaviors the dispatcher drives: [`listen`](Self::listen),
/// [`send`](Self::send) and [`close`](Self::close).
pub struct EventSourceTransport {
    config: TransportConfig,
    registry: Arc<DomainRegistry>,
    ansible: Arc<dyn Ansible>,
    receptionist: OnceLock<Receptionist>,
    lifecycle: Mutex<Lifecycle>,
}

impl EventSourceTransport {
    /// Create an idle transport reporting new domains to `ansible`.
    pub fn new(ansible: Arc<dyn Ansible>, config: TransportConfig) -> Self {
        Self {
            config,
            registry: Arc::new(DomainRegistry::new()),
            ansible,
            receptionist: OnceLock::new(),
            lifecycle: Mutex::new(Lifecycle {
                state: LifecycleState::Idle,
                running: None,
            }),
        }
    }

    /// Start accepting EventSource connections.
    ///
    /// Calls `ok` once bound, or `fail` with
    /// [`TransportError::BindFailure`]. A no-op unless idle.
    pub async fn listen(&self, request: ListenRequest) {
        {
            let mut lifecycle = self.lock();
            if lifecycle.state != LifecycleState::Idle {
                debug!(state = ?lifecycle.state, "Already listening, ignoring listen");
                return;
            }
            lifecycle.state = LifecycleState::Starting;
        }
        let reset = ResetOnDrop::new(&self.lifecycle);

        let receptionist = self
            .receptionist
            .get_or_init(|| Receptionist::spawn(Arc::clone(&self.registry)))
            .clone();

        let addr = request.addr();
        let bound = match TcpListener::bind(&addr).await {
            Ok(listener) => listener.local_addr().map(|local| (listener, local)),
            Err(e) => Err(e),
        };

        let (listener, local_addr) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                warn!(addr = %addr, error = %e, "Failed to bind EventSource listener");
                self.lock().state = LifecycleState::Idle;
                reset.defuse();
                if let Some(fail) = request.fail {
                    fail(TransportError::bind_failure(addr, e));
                }
                return;
            }
        };

        let shutdown = CancellationToken::new();
        let app = endpoint::router(EndpointState::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.ansible),
            receptionist,
            shutdown.clone(),
            self.config.channel_capacity,
        ));

        let signal = shutdown.clone().cancelled_owned();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(signal)
                .await
        });

        {
            let mut lifecycle = self.lock();
            lifecycle.state = LifecycleState::Listening;
            lifecycle.running = Some(Running {
                local_addr,
                shutdown,
                task,
            });
        }
        reset.defuse();

        info!(addr = %local_addr, "EventSource transport listening");

        if let Some(ok) = request.ok {
            ok(ListenInfo {
                host: request.host,
                port: local_addr.port(),
            });
        }
    }

    /// Deliver a message to its domain, best effort.
    ///
    /// Address errors go to the message's failure callback; an unknown
    /// domain is silently dropped.
    pub fn send(&self, message: Message) -> SendOutcome {
        send::deliver(&self.registry, message)
    }

    /// Stop accepting connections and end all open streams.
    ///
    /// `ack` runs after the server has fully stopped. A no-op unless
    /// listening.
    pub async fn close(&self, ack: Option<CloseAck>) {
        let running = {
            let mut lifecycle = self.lock();
            if lifecycle.state != LifecycleState::Listening {
                debug!(state = ?lifecycle.state, "Not listening, ignoring close");
                return;
            }
            lifecycle.state = LifecycleState::Closing;
            lifecycle.running.take()
        };
        let reset = ResetOnDrop::new(&self.lifecycle);

        if let Some(running) = running {
            info!(addr = %running.local_addr, "Closing EventSource transport");
            running.shutdown.cancel();
            match running.task.await {
                Ok(Ok(())) => debug!("EventSource server stopped"),
                Ok(Err(e)) => {
                    let error = TransportError::Serve(e);
                    warn!(error = %error, "EventSource server stopped with error");
                }
                Err(e) => warn!(error = %e, "EventSource server task failed"),
            }
        }

        self.lock().state = LifecycleState::Idle;
        reset.defuse();
        info!("EventSource transport closed");

        if let Some(ack) = ack {
            ack();
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.lock().state
    }

    /// Bound address while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lock().running.as_ref().map(|running| running.local_addr)
    }

    /// The domain registry.
    pub fn registry(&self) -> &Arc<DomainRegistry> {
        &self.registry
    }

    /// The receptionist, once the first `listen` has created it.
    pub fn receptionist(&self) -> Option<&Receptionist> {
        self.receptionist.get()
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for EventSourceTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSourceTransport")
            .field("state", &self.state())
            .field("registry", &self.registry)
            .finish()
    }
}
