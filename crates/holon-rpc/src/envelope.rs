//! JSON-RPC 2.0 envelope.
//!
//! One struct covers requests, notifications and responses; absent fields
//! stay absent on the wire rather than serialising as `null`. Which shape
//! an inbound envelope has is decided by which fields are present:
//! `method` makes it a request (a notification when `id` is missing),
//! otherwise `result`/`error` make it a response.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The WebSocket subprotocol this client negotiates.
pub const SUBPROTOCOL: &str = "holon-rpc";

/// The JSON-RPC version token.
pub const VERSION: &str = "2.0";

/// Liveness-probe method answered by both peers.
pub const HEARTBEAT_METHOD: &str = "rpc.heartbeat";

/// JSON-RPC error codes used on this wire.
pub mod code {
    /// The frame was not valid JSON.
    pub const PARSE_ERROR: i64 = -32700;
    /// The envelope violated the JSON-RPC contract.
    pub const INVALID_REQUEST: i64 = -32600;
    /// No handler is registered for the method.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Default for malformed error responses.
    pub const INTERNAL_ERROR: i64 = -32603;
    /// A registered handler failed in an unstructured way.
    pub const HANDLER_FAILURE: i64 = 13;
}

/// The `error` member of a response.
///
/// Missing `code`/`message` fields deserialize to the internal-error
/// defaults, so a sloppy peer still produces a well-formed error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    #[serde(default = "default_error_code")]
    pub code: i64,
    #[serde(default = "default_error_message")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

fn default_error_code() -> i64 {
    code::INTERNAL_ERROR
}

fn default_error_message() -> String {
    "internal error".to_string()
}

impl ErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        ErrorObject {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A JSON-RPC 2.0 envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Envelope {
    /// A request expecting a response under `id`.
    pub fn request(id: &str, method: &str, params: Value) -> Self {
        Envelope {
            jsonrpc: Some(VERSION.to_string()),
            id: Some(Value::String(id.to_string())),
            method: Some(method.to_string()),
            params: Some(params),
            result: None,
            error: None,
        }
    }

    /// A fire-and-forget notification.
    pub fn notification(method: &str, params: Value) -> Self {
        Envelope {
            jsonrpc: Some(VERSION.to_string()),
            id: None,
            method: Some(method.to_string()),
            params: Some(params),
            result: None,
            error: None,
        }
    }

    /// A successful response to the request carrying `id`.
    pub fn result_reply(id: Value, result: Value) -> Self {
        Envelope {
            jsonrpc: Some(VERSION.to_string()),
            id: Some(id),
            method: None,
            params: None,
            result: Some(result),
            error: None,
        }
    }

    /// An error response to the request carrying `id`.
    pub fn error_reply(id: Value, error: ErrorObject) -> Self {
        Envelope {
            jsonrpc: Some(VERSION.to_string()),
            id: Some(id),
            method: None,
            params: None,
            result: None,
            error: Some(error),
        }
    }

    /// Requests and notifications carry `method`.
    pub fn is_request(&self) -> bool {
        self.method.is_some()
    }

    /// Responses carry `result` or `error`.
    pub fn is_response(&self) -> bool {
        self.result.is_some() || self.error.is_some()
    }
}

/// An empty `params`/`result` object.
pub fn empty_object() -> Value {
    Value::Object(Map::new())
}
