//! Holon-RPC client.
//!
//! JSON-RPC 2.0 over a WebSocket carrier negotiated with the `holon-rpc`
//! subprotocol. The client is bidirectional: it issues calls with
//! [`RpcClient::invoke`] and answers peer calls through handlers installed
//! with [`RpcClient::register`]. A heartbeat keeps the carrier honest, and
//! a lost carrier is re-dialed transparently with exponential backoff and
//! jitter.
//!
//! # Example
//!
//! ```ignore
//! use holon_rpc::{ClientConfig, RpcClient};
//! use serde_json::json;
//!
//! let client = RpcClient::new(ClientConfig::default());
//! client.connect("ws://127.0.0.1:9090/grpc").await?;
//! let pong = client.invoke("echo.v1.Echo/Ping", json!({"message": "hello"})).await?;
//! ```

mod backoff;
mod client;
pub mod envelope;
mod error;

pub use backoff::ReconnectPolicy;
pub use client::{ClientConfig, Handler, HandlerFuture, RpcClient};
pub use envelope::{Envelope, ErrorObject, HEARTBEAT_METHOD, SUBPROTOCOL};
pub use error::RpcError;
