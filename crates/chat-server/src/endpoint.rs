//! Per-connection pumps: inbound decode loop and outbound writer.
//!
//! Each endpoint runs two tasks that share nothing but a cancellation
//! token. The inbound loop feeds the Hub; the outbound loop drains the
//! private queue the Hub writes into. Either side ending brings the other
//! down:
//!
//! - inbound exit → guard unregisters → Hub drops the queue sender →
//!   outbound drains, sends a close frame and exits.
//! - outbound exit (queue closed by eviction, or write error) → token
//!   cancelled → inbound exits → guard unregisters (no-op if evicted).

use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use quiver_protocol::constants::{WS_IDLE_TIMEOUT, WS_PING_PERIOD};
use quiver_protocol::{ClientMessage, Message};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::hub::{EndpointId, Hub, Registration};

/// Keep-alive settings for one connection.
///
/// `None` disables the corresponding timer: without an idle timeout a
/// silent client stays connected until it goes away on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    pub ping_period: Option<Duration>,
    pub idle_timeout: Option<Duration>,
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self {
            ping_period: Some(WS_PING_PERIOD),
            idle_timeout: Some(WS_IDLE_TIMEOUT),
        }
    }
}

impl KeepAlive {
    pub fn disabled() -> Self {
        Self {
            ping_period: None,
            idle_timeout: None,
        }
    }
}

/// One client's side of the room before its pumps start.
#[derive(Debug)]
pub struct Endpoint {
    pub id: EndpointId,
    pub name: String,
    queue: mpsc::Receiver<Message>,
}

impl Endpoint {
    /// Creates an endpoint with a fresh bounded outbound queue.
    ///
    /// The returned [`Registration`] holds the only sender of that queue and
    /// is meant to be handed to [`Hub::register`].
    pub fn new(id: EndpointId, name: impl Into<String>, capacity: usize) -> (Self, Registration) {
        let name = name.into();
        let (tx, rx) = mpsc::channel(capacity);
        let endpoint = Self {
            id,
            name: name.clone(),
            queue: rx,
        };
        let registration = Registration {
            id,
            name,
            queue: tx,
        };
        (endpoint, registration)
    }
}

/// Running pumps of one endpoint.
pub struct EndpointHandle {
    pub id: EndpointId,
    cancel: CancellationToken,
    inbound: JoinHandle<()>,
    outbound: JoinHandle<()>,
}

impl EndpointHandle {
    /// Stops the inbound loop; the outbound loop follows once the Hub
    /// closes the queue.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Waits for both pumps to finish.
    pub async fn join(self) {
        let _ = self.inbound.await;
        let _ = self.outbound.await;
    }
}

/// Starts the inbound and outbound loops of a registered endpoint.
///
/// `server_cancel` is the acceptor's token; the per-connection token is a
/// child of it so shutdown reaches every pump.
pub fn spawn_endpoint<S>(
    ws_stream: S,
    endpoint: Endpoint,
    hub: Hub,
    keepalive: KeepAlive,
    server_cancel: &CancellationToken,
) -> EndpointHandle
where
    S: Stream<Item = Result<WsMessage, tungstenite::Error>>
        + Sink<WsMessage, Error = tungstenite::Error>
        + Send
        + 'static,
{
    let Endpoint { id, name, queue } = endpoint;
    let cancel = server_cancel.child_token();
    let (ws_sink, ws_stream) = ws_stream.split();

    let outbound = tokio::spawn(outbound_loop(
        ws_sink,
        queue,
        keepalive.ping_period,
        cancel.clone(),
    ));
    let inbound = tokio::spawn(inbound_loop(
        ws_stream,
        id,
        name,
        hub,
        keepalive.idle_timeout,
        cancel.clone(),
    ));

    EndpointHandle {
        id,
        cancel,
        inbound,
        outbound,
    }
}

/// Unregisters the endpoint however the inbound loop ends, panics included.
struct UnregisterGuard {
    hub: Hub,
    id: EndpointId,
}

impl Drop for UnregisterGuard {
    fn drop(&mut self) {
        self.hub.unregister(self.id);
    }
}

/// Reads client frames and submits them to the Hub as chat messages.
///
/// Ends on the first read or decode failure, on a close frame, when the
/// stream ends, when the token is cancelled, or when nothing arrives within
/// `idle_timeout`.
pub(crate) async fn inbound_loop<S>(
    mut stream: S,
    id: EndpointId,
    name: String,
    hub: Hub,
    idle_timeout: Option<Duration>,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
{
    let _guard = UnregisterGuard {
        hub: hub.clone(),
        id,
    };

    let idle = tokio::time::sleep(idle_timeout.unwrap_or(WS_IDLE_TIMEOUT));
    tokio::pin!(idle);

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(endpoint = %id, "inbound loop cancelled");
                break;
            }
            () = &mut idle, if idle_timeout.is_some() => {
                warn!(endpoint = %id, username = %name, "idle timeout, closing connection");
                break;
            }
            frame = stream.next() => frame,
        };

        let data = match frame {
            Some(Ok(WsMessage::Text(text))) => text.as_bytes().to_vec(),
            Some(Ok(WsMessage::Binary(data))) => data.to_vec(),
            Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {
                trace!(endpoint = %id, "keep-alive frame");
                reset_idle(idle.as_mut(), idle_timeout);
                continue;
            }
            Some(Ok(WsMessage::Close(_))) => {
                debug!(endpoint = %id, "received close frame");
                break;
            }
            Some(Ok(WsMessage::Frame(_))) => continue,
            Some(Err(e)) => {
                debug!(endpoint = %id, "read error: {e}");
                break;
            }
            None => {
                debug!(endpoint = %id, "stream ended");
                break;
            }
        };
        reset_idle(idle.as_mut(), idle_timeout);

        let message = match ClientMessage::decode(&data) {
            Ok(m) => m.into_chat(&name),
            Err(e) => {
                debug!(endpoint = %id, "malformed client message: {e}");
                break;
            }
        };
        hub.broadcast(message).await;
    }
}

fn reset_idle(idle: std::pin::Pin<&mut tokio::time::Sleep>, idle_timeout: Option<Duration>) {
    if let Some(timeout) = idle_timeout {
        idle.reset(tokio::time::Instant::now() + timeout);
    }
}

/// Writes queued messages as JSON text frames.
///
/// Returns once the queue is closed and drained, or on the first write
/// error. Always attempts a close frame and cancels the connection token
/// on the way out.
pub(crate) async fn outbound_loop<S>(
    mut sink: S,
    mut queue: mpsc::Receiver<Message>,
    ping_period: Option<Duration>,
    cancel: CancellationToken,
) where
    S: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
{
    let mut ping = tokio::time::interval(ping_period.unwrap_or(WS_PING_PERIOD));
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ping.reset();

    loop {
        tokio::select! {
            msg = queue.recv() => {
                let Some(msg) = msg else {
                    debug!("outbound queue closed");
                    break;
                };
                let json = match msg.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        error!("failed to encode message: {e}");
                        continue;
                    }
                };
                if let Err(e) = sink.send(WsMessage::Text(json.into())).await {
                    debug!("write error: {e}");
                    break;
                }
            }

            _ = ping.tick(), if ping_period.is_some() => {
                if let Err(e) = sink.send(WsMessage::Ping(Vec::new().into())).await {
                    debug!("ping error: {e}");
                    break;
                }
            }
        }
    }

    let _ = sink.send(WsMessage::Close(None)).await;
    cancel.cancel();
}
