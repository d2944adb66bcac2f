//! Connection acceptor.
//!
//! Listens on a TCP port, upgrades `GET <path>` to WebSocket, registers
//! each new client with the [`Hub`] and starts its pumps.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use quiver_protocol::constants::{DEFAULT_PORT, OUTBOUND_QUEUE_SIZE, WS_MAX_MESSAGE_SIZE, WS_PATH};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_util::sync::CancellationToken;

use crate::ServerError;
use crate::endpoint::{self, Endpoint, EndpointHandle, KeepAlive};
use crate::handshake::{self, OriginPolicy};
use crate::hub::{EndpointId, Hub};

/// Acceptor configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind: IpAddr,
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    /// Upgrade path.
    pub path: String,
    pub origin: OriginPolicy,
    /// Capacity of each endpoint's outbound queue.
    pub queue_capacity: usize,
    pub keepalive: KeepAlive,
    /// Largest inbound frame/message accepted, in bytes.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            path: WS_PATH.into(),
            origin: OriginPolicy::default(),
            queue_capacity: OUTBOUND_QUEUE_SIZE,
            keepalive: KeepAlive::default(),
            max_message_size: WS_MAX_MESSAGE_SIZE,
        }
    }
}

/// The chat relay's WebSocket server.
pub struct ChatServer {
    config: ServerConfig,
    hub: Hub,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
    next_id: AtomicU64,
    running: AtomicBool,
}

impl ChatServer {
    /// Creates a server feeding the given Hub.
    ///
    /// `cancel` stops the accept loop and, through child tokens, every
    /// endpoint it started.
    pub fn new(config: ServerConfig, hub: Hub, cancel: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            config,
            hub,
            cancel,
            local_addr: Mutex::new(None),
            next_id: AtomicU64::new(1),
            running: AtomicBool::new(false),
        })
    }

    /// Returns the local address the server is listening on.
    ///
    /// Only available after [`run`](Self::run) binds the socket.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Returns the listening port (0 if not yet bound).
    pub async fn port(&self) -> u16 {
        self.local_addr.lock().await.map(|a| a.port()).unwrap_or(0)
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Gracefully shuts down the server.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Binds the configured address and accepts connections until cancelled.
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }

        let addr = SocketAddr::new(self.config.bind, self.config.port);
        let listener = TcpListener::bind(addr).await?;

        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        tracing::info!(path = %self.config.path, "chat server listening on {local_addr}");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("server shutting down");
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let server = Arc::clone(self);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, peer_addr).await {
                                    tracing::warn!(%peer_addr, "upgrade failed: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }

    /// Upgrades one TCP connection and hands the new endpoint to the Hub.
    ///
    /// Returns as soon as the endpoint's pumps are running.
    async fn handle_connection(
        self: &Arc<Self>,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<EndpointHandle, ServerError> {
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(self.config.max_message_size);
        ws_config.max_frame_size = Some(self.config.max_message_size);

        let mut username = None;
        let callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
            match handshake::check_request(req, &self.config.path, &self.config.origin) {
                Ok(name) => {
                    username = Some(name);
                    Ok(response)
                }
                Err(rejection) => {
                    tracing::warn!(%peer_addr, "rejecting upgrade: {rejection}");
                    Err(rejection.into_response())
                }
            }
        };
        let ws_stream = accept_hdr_async_with_config(stream, callback, Some(ws_config)).await?;
        // The callback sets the name on every accepted handshake.
        let name = username.ok_or(ServerError::ConnectionRejected)?;

        let id = EndpointId(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::info!(%peer_addr, endpoint = %id, username = %name, "WebSocket connection established");

        let (endpoint, registration) = Endpoint::new(id, name, self.config.queue_capacity);
        self.hub.register(registration).await;

        Ok(endpoint::spawn_endpoint(
            ws_stream,
            endpoint,
            self.hub.clone(),
            self.config.keepalive,
            &self.cancel,
        ))
    }
}
