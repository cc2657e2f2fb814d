//! Observer WebSocket listener
//!
//! Handles the TCP accept loop, routes and upgrades each request, and spawns
//! one `ObserverSession` per accepted observer.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::WebSocketStream;

use crate::error::{Error, Result};
use crate::hub::BroadcastHub;
use crate::server::config::ServerConfig;
use crate::server::route::{parse_route, Route, RouteError};
use crate::session::{ObserverSession, SessionLimits};

/// Log stream server
pub struct LogstreamServer {
    listener: TcpListener,
    config: ServerConfig,
    hub: Arc<BroadcastHub>,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl LogstreamServer {
    /// Bind the TCP listener
    ///
    /// Failing to bind is a startup error the caller should treat as fatal.
    pub async fn bind(config: ServerConfig, hub: Arc<BroadcastHub>) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        tracing::info!(
            addr = %listener.local_addr()?,
            key_policy = %config.key_policy,
            "Log stream server listening"
        );

        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Ok(Self {
            listener,
            config,
            hub,
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept observers until the task is cancelled
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((socket, peer_addr)) => self.handle_connection(socket, peer_addr),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Accept observers until `shutdown` resolves, then shut the hub down
    ///
    /// Shutting the hub down closes every attached observer.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.run() => result,
        };

        self.hub.shutdown();
        result
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        let permit = match self.acquire_permit() {
            Ok(permit) => permit,
            Err(()) => {
                tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                return;
            }
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(session_id = session_id, peer = %peer_addr, "New connection");

        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(error = %e, "Failed to configure socket");
            return;
        }

        let config = self.config.clone();
        let hub = Arc::clone(&self.hub);

        tokio::spawn(async move {
            let _permit = permit;

            let (ws, route) = match upgrade(socket, &config).await {
                Ok(upgraded) => upgraded,
                Err(e) => {
                    tracing::debug!(session_id = session_id, peer = %peer_addr, error = %e, "Upgrade refused");
                    return;
                }
            };

            if let Some(last_mod) = route.last_mod {
                tracing::debug!(session_id = session_id, last_mod = ?last_mod, "Resume hint ignored");
            }

            tracing::info!(
                session_id = session_id,
                peer = %peer_addr,
                key = %route.key,
                "Observer attached"
            );

            let limits = SessionLimits::from(&config);
            let session = ObserverSession::new(session_id, peer_addr, route.key, limits, hub);
            session.run(ws).await;
        });
    }

    fn acquire_permit(&self) -> std::result::Result<Option<OwnedSemaphorePermit>, ()> {
        match self.connection_semaphore {
            Some(ref sem) => sem.clone().try_acquire_owned().map(Some).map_err(|_| ()),
            None => Ok(None),
        }
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }
}

/// Longest request line inspected before the upgrade
const MAX_REQUEST_LINE: usize = 8192;

/// Wait between peeks while the request line is incomplete
const PEEK_RETRY: Duration = Duration::from_millis(5);

/// Route the HTTP request and complete the WebSocket upgrade
///
/// The request line is routed before the upgrade, so any request outside
/// `/logstream/<key>` gets a plain 404 and a key failing the policy a 400,
/// whether or not it asked for a WebSocket. Neither touches the hub.
async fn upgrade(
    mut socket: TcpStream,
    config: &ServerConfig,
) -> Result<(WebSocketStream<TcpStream>, Route)> {
    let deadline = Instant::now() + config.handshake_timeout;

    let target = match tokio::time::timeout_at(deadline, peek_request_target(&socket)).await {
        Ok(target) => target?,
        Err(_) => return Err(handshake_timed_out()),
    };
    if let Some(target) = target {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target.as_str(), None),
        };
        if let Err(e) = parse_route(path, query, config.key_policy) {
            let _ = tokio::time::timeout_at(deadline, write_refusal(&mut socket, &e)).await;
            return Err(Error::Route(e));
        }
    }

    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(config.max_inbound_message);
    ws_config.max_frame_size = Some(config.max_inbound_message);

    let mut routed: Option<std::result::Result<Route, RouteError>> = None;
    let callback = |request: &Request, response: Response| {
        let result = parse_route(request.uri().path(), request.uri().query(), config.key_policy);
        let reply = match &result {
            Ok(_) => Ok(response),
            Err(e) => Err(refusal(e)),
        };
        routed = Some(result);
        reply
    };

    let accept = tokio_tungstenite::accept_hdr_async_with_config(socket, callback, Some(ws_config));
    let outcome = tokio::time::timeout_at(deadline, accept).await;

    match (outcome, routed) {
        (Err(_), _) => Err(handshake_timed_out()),
        (Ok(Err(_)), Some(Err(route_error))) => Err(Error::Route(route_error)),
        (Ok(Err(e)), _) => Err(Error::WebSocket(e)),
        (Ok(Ok(ws)), Some(Ok(route))) => Ok((ws, route)),
        (Ok(Ok(_)), _) => Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "WebSocket upgrade completed without a route",
        ))),
    }
}

fn handshake_timed_out() -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        "WebSocket handshake timed out",
    ))
}

/// Peek at the request line without consuming it
///
/// Returns the request target, or `None` if the peer closed early or sent
/// something that is not an HTTP request line. The upgrade then fails on its
/// own.
async fn peek_request_target(socket: &TcpStream) -> std::io::Result<Option<String>> {
    let mut buf = vec![0u8; MAX_REQUEST_LINE];
    let mut seen = 0;

    loop {
        let n = socket.peek(&mut buf).await?;
        if let Some(end) = buf[..n].windows(2).position(|w| w == b"\r\n") {
            return Ok(request_target(&buf[..end]));
        }
        if n == 0 || n == buf.len() {
            return Ok(None);
        }
        if n == seen {
            tokio::time::sleep(PEEK_RETRY).await;
        }
        seen = n;
    }
}

/// Target of a `METHOD SP target SP HTTP/x.y` request line
fn request_target(line: &[u8]) -> Option<String> {
    let line = std::str::from_utf8(line).ok()?;
    let mut parts = line.split(' ');
    let _method = parts.next()?;
    let target = parts.next()?;
    let version = parts.next()?;
    if !version.starts_with("HTTP/") || parts.next().is_some() {
        return None;
    }
    Some(target.to_string())
}

/// Answer a refused request with a plain HTTP error and close
async fn write_refusal(socket: &mut TcpStream, e: &RouteError) -> std::io::Result<()> {
    // Consume the peeked request so closing does not reset the connection
    let mut discard = vec![0u8; MAX_REQUEST_LINE];
    let _ = socket.read(&mut discard).await?;

    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_REQUEST);
    let body = format!("{}\n", e);
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status.as_u16(),
        status.canonical_reason().unwrap_or(""),
        body.len(),
        body
    );
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}

fn refusal(e: &RouteError) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(e.to_string()));
    *response.status_mut() = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_REQUEST);
    response
}
