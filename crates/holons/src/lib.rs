//! Client SDK for the holons messaging fabric.
//!
//! Two independent subsystems under one roof:
//!
//! - [`transport`]: a URI-addressed facade over TCP, Unix-socket, stdio
//!   and in-process byte-stream listeners.
//! - [`rpc`]: a bidirectional JSON-RPC 2.0 client over a `holon-rpc`
//!   WebSocket carrier, with heartbeat and transparent reconnection.
//!
//! Around them, the collaborator surfaces: [`uri`] parsing, [`identity`]
//! files, the certification [`testkit`], and the published capability
//! [`manifest`].

pub use holon_identity as identity;
pub use holon_rpc as rpc;
pub use holon_testkit as testkit;
pub use holon_transport as transport;
pub use holon_uri as uri;

pub mod manifest;
