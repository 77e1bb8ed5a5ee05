//! EventSource endpoint
//!
//! A client becomes addressable by opening
//!
//! ```text
//! GET /events/<domain>
//! Accept: text/event-stream
//! ```
//!
//! The response stays open and carries every frame sent to
//! `ansible://<domain>/#...` until the client disconnects or the server
//! closes. Any other request is answered with an empty 400.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{debug, info, Level};

use crate::frame::EVENT_STREAM_CONTENT_TYPE;
use crate::receptionist::Receptionist;
use crate::registry::{Connection, ConnectionId, DomainRegistry};
use crate::Ansible;

/// Path prefix of the registration endpoint.
pub const EVENTS_PATH_PREFIX: &str = "/events/";

/// Shared state of the endpoint handler.
#[derive(Clone)]
pub struct EndpointState {
    registry: Arc<DomainRegistry>,
    ansible: Arc<dyn Ansible>,
    receptionist: Receptionist,
    shutdown: CancellationToken,
    channel_capacity: usize,
}

impl EndpointState {
    pub fn new(
        registry: Arc<DomainRegistry>,
        ansible: Arc<dyn Ansible>,
        receptionist: Receptionist,
        shutdown: CancellationToken,
        channel_capacity: usize,
    ) -> Self {
        Self {
            registry,
            ansible,
            receptionist,
            shutdown,
            channel_capacity,
        }
    }
}

/// Create the endpoint router.
///
/// Every request goes through [`events_handler`], which does its own
/// matching so that unknown paths get a 400 rather than a 404.
pub fn router(state: EndpointState) -> Router {
    Router::new()
        .fallback(events_handler)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
}

/// GET /events/{domain}
///
/// Registers the domain, announces it to the dispatcher and returns the
/// open event stream.
async fn events_handler(
    State(state): State<EndpointState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let Some(domain) = stream_domain(&method, &uri, &headers) else {
        debug!(%method, path = %uri.path(), "Rejected EventSource request");
        return StatusCode::BAD_REQUEST.into_response();
    };
    let domain = domain.to_string();

    let (connection, frames) = Connection::channel(state.channel_capacity);
    let guard = RegistrationGuard {
        registry: Arc::clone(&state.registry),
        domain: domain.clone(),
        connection: connection.id(),
    };

    info!(domain = %domain, connection = %connection.id(), "EventSource client connected");
    state.registry.register(&domain, connection);
    state
        .ansible
        .register_domain(&domain, state.receptionist.clone());

    let stream = EventStream::new(frames, state.shutdown.clone(), guard);

    (
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static(EVENT_STREAM_CONTENT_TYPE),
            ),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (header::CONNECTION, HeaderValue::from_static("keep-alive")),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

/// The domain named by a well-formed registration request.
fn stream_domain<'a>(method: &Method, uri: &'a Uri, headers: &HeaderMap) -> Option<&'a str> {
    if *method != Method::GET {
        return None;
    }

    let accepts_stream = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == EVENT_STREAM_CONTENT_TYPE);
    if !accepts_stream {
        return None;
    }

    uri.path()
        .strip_prefix(EVENTS_PATH_PREFIX)
        .filter(|domain| !domain.is_empty())
}

/// Removes the registration when the response body is dropped.
struct RegistrationGuard {
    registry: Arc<DomainRegistry>,
    domain: String,
    connection: ConnectionId,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        info!(
            domain = %self.domain,
            connection = %self.connection,
            "EventSource client disconnected"
        );
        self.registry
            .unregister_connection(&self.domain, self.connection);
    }
}

/// Response body of one EventSource connection.
///
/// Yields queued frames until the server starts closing. A stream whose
/// registration was replaced stays open without further frames. Dropping it
/// (the client went away, or the server finished) unregisters the domain.
struct EventStream {
    frames: mpsc::Receiver<Bytes>,
    shutdown: CancellationToken,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    _guard: RegistrationGuard,
}

impl EventStream {
    fn new(
        frames: mpsc::Receiver<Bytes>,
        shutdown: CancellationToken,
        guard: RegistrationGuard,
    ) -> Self {
        let cancelled = Box::pin(shutdown.clone().cancelled_owned());
        Self {
            frames,
            shutdown,
            cancelled,
            _guard: guard,
        }
    }
}

impl Stream for EventStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.shutdown.is_cancelled() || this.cancelled.as_mut().poll(cx).is_ready() {
            return Poll::Ready(None);
        }

        match this.frames.poll_recv(cx) {
            Poll::Ready(Some(frame)) => Poll::Ready(Some(Ok(frame))),
            // Replaced by a newer registration: stay open and idle until the
            // client leaves or shutdown wakes us.
            Poll::Ready(None) => Poll::Pending,
            Poll::Pending => Poll::Pending,
        }
    }
}
