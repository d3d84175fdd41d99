//! Transport error taxonomy.

use std::fmt;

use holon_uri::UriError;

/// Error from listeners and connections.
///
/// Listener errors surface to the `accept` caller; connection errors
/// surface to the `read`/`write` caller. Messages embed the underlying OS
/// error string where one exists.
#[derive(Debug)]
pub enum TransportError {
    /// The endpoint URI is malformed.
    InvalidUri(String),
    /// The endpoint URI carries a scheme this SDK does not know.
    UnsupportedUri(String),
    /// The scheme parses but has no runtime listener at this layer.
    RuntimeUnsupported(String),
    /// Binding the listener failed.
    ListenFailed(String),
    /// Accepting a connection failed for a reason other than closure.
    AcceptFailed(String),
    /// The listener (or connection) was closed.
    ListenerClosed(String),
    /// A read or write failed at the kernel boundary.
    Io(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::InvalidUri(msg) => write!(f, "invalid URI: {msg}"),
            TransportError::UnsupportedUri(msg) => write!(f, "unsupported URI: {msg}"),
            TransportError::RuntimeUnsupported(msg) => {
                write!(f, "no runtime listener: {msg}")
            }
            TransportError::ListenFailed(msg) => write!(f, "listen failed: {msg}"),
            TransportError::AcceptFailed(msg) => write!(f, "accept failed: {msg}"),
            TransportError::ListenerClosed(msg) => write!(f, "listener closed: {msg}"),
            TransportError::Io(msg) => write!(f, "i/o failure: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<UriError> for TransportError {
    fn from(e: UriError) -> Self {
        match e {
            UriError::Invalid(msg) => TransportError::InvalidUri(msg),
            UriError::Unsupported(msg) => TransportError::UnsupportedUri(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
