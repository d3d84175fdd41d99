//! Published capability manifest.
//!
//! Peers and certification tooling read this static declaration to learn
//! what this SDK ships and which fabric features its client understands.
//! The SDK dials WebSocket carriers but never serves them, hence
//! `holon_rpc_server: false`. The routing modes describe what the client
//! can observe, since routing itself happens server-side.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// The manifest exactly as published.
pub const MANIFEST_JSON: &str = r#"{
  "executables": ["holon-serve", "holon-certify"],
  "holon_rpc_server": false,
  "grpc_dial_ws": true,
  "routing": {
    "unicast": true,
    "fanout": true,
    "broadcast-response": true,
    "full-broadcast": true
  }
}"#;

/// Routing modes the client can take part in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingModes {
    pub unicast: bool,
    pub fanout: bool,
    #[serde(rename = "broadcast-response")]
    pub broadcast_response: bool,
    #[serde(rename = "full-broadcast")]
    pub full_broadcast: bool,
}

/// The typed view of [`MANIFEST_JSON`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityManifest {
    pub executables: Vec<String>,
    pub holon_rpc_server: bool,
    pub grpc_dial_ws: bool,
    pub routing: RoutingModes,
}

static MANIFEST: Lazy<CapabilityManifest> = Lazy::new(|| {
    serde_json::from_str(MANIFEST_JSON).expect("embedded capability manifest is valid JSON")
});

/// The SDK's capability manifest.
pub fn manifest() -> &'static CapabilityManifest {
    &MANIFEST
}
