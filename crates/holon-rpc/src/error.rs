//! RPC client error taxonomy.

use std::fmt;

use serde_json::Value;

use crate::envelope::{code, ErrorObject};

/// Error from the RPC client.
///
/// `Response` conveys a JSON-RPC error object from the peer unchanged;
/// everything else is client-side state or wire trouble.
#[derive(Debug)]
pub enum RpcError {
    /// The WebSocket URL did not parse.
    InvalidUrl(String),
    /// No live carrier (never connected, lost, or closed).
    NotConnected,
    /// The awaited response did not arrive within the deadline.
    Timeout,
    /// The peer violated the holon-rpc contract.
    Protocol(String),
    /// A frame could not be encoded or decoded.
    Serialization(String),
    /// The peer answered with a JSON-RPC error.
    Response {
        code: i64,
        message: String,
        data: Option<Value>,
    },
}

impl RpcError {
    /// The error object to send when a handler fails with this error.
    ///
    /// Structured responses pass through verbatim; anything else is
    /// reported as a handler failure with the error's string form.
    pub fn to_error_object(&self) -> ErrorObject {
        match self {
            RpcError::Response {
                code,
                message,
                data,
            } => ErrorObject {
                code: *code,
                message: message.clone(),
                data: data.clone(),
            },
            other => ErrorObject::new(code::HANDLER_FAILURE, other.to_string()),
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::InvalidUrl(msg) => write!(f, "invalid URL: {msg}"),
            RpcError::NotConnected => f.write_str("not connected"),
            RpcError::Timeout => f.write_str("timed out waiting for a response"),
            RpcError::Protocol(msg) => write!(f, "protocol error: {msg}"),
            RpcError::Serialization(msg) => write!(f, "serialization error: {msg}"),
            RpcError::Response { code, message, .. } => {
                write!(f, "rpc error {code}: {message}")
            }
        }
    }
}

impl std::error::Error for RpcError {}

impl From<ErrorObject> for RpcError {
    fn from(err: ErrorObject) -> Self {
        RpcError::Response {
            code: err.code,
            message: err.message,
            data: err.data,
        }
    }
}
