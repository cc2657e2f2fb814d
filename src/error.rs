//! Error types
//!
//! Errors local to one observer (transport failures, refused keys) end that
//! observer's session only. None of them stop the hub.

use crate::hub::HubError;
use crate::server::route::RouteError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Socket or other I/O failure
    Io(std::io::Error),
    /// WebSocket handshake or framing failure
    WebSocket(tokio_tungstenite::tungstenite::Error),
    /// Hub refused the operation
    Hub(HubError),
    /// Request path or routing key rejected
    Route(RouteError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::WebSocket(e) => write!(f, "WebSocket error: {}", e),
            Error::Hub(e) => write!(f, "Hub error: {}", e),
            Error::Route(e) => write!(f, "Route error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::WebSocket(e) => Some(e),
            Error::Hub(e) => Some(e),
            Error::Route(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(e)
    }
}

impl From<HubError> for Error {
    fn from(e: HubError) -> Self {
        Error::Hub(e)
    }
}

impl From<RouteError> for Error {
    fn from(e: RouteError) -> Self {
        Error::Route(e)
    }
}
