//! URI-addressed listener facade.
//!
//! [`listen`] only decodes: it maps a URI onto the [`Listener`] union so
//! callers can inspect what the URI asks for. [`listen_runtime`] goes
//! further and binds a live [`RuntimeListener`].
//!
//! `ws://` and `wss://` decode fine but have no runtime variant: this SDK
//! dials WebSocket carriers, it does not serve them. Asking for one is
//! answered with [`TransportError::RuntimeUnsupported`] rather than a
//! silent fallback.

use holon_uri::{self as uri, Scheme, Uri};

use crate::connection::Connection;
use crate::error::{Result, TransportError};
use crate::mem::MemListener;
use crate::stdio::StdioListener;
use crate::tcp::TcpListener;
use crate::unix::UnixListener;

/// Decoded listener address: what a URI asks for, before any binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listener {
    Tcp { host: String, port: u16 },
    Unix { path: String },
    Stdio,
    Mem { name: String },
    Ws { host: String, port: u16, path: String },
    Wss { host: String, port: u16, path: String },
}

impl Listener {
    /// Map a parsed URI onto the listener union.
    pub fn from_uri(uri: &Uri) -> Listener {
        let host = || uri.host.clone().unwrap_or_default();
        let port = || uri.port.unwrap_or_default();
        let path = || uri.path.clone().unwrap_or_default();
        match uri.scheme {
            Scheme::Tcp => Listener::Tcp { host: host(), port: port() },
            Scheme::Unix => Listener::Unix { path: path() },
            Scheme::Stdio => Listener::Stdio,
            Scheme::Mem => Listener::Mem { name: path() },
            Scheme::Ws => Listener::Ws { host: host(), port: port(), path: path() },
            Scheme::Wss => Listener::Wss { host: host(), port: port(), path: path() },
        }
    }
}

/// Decode `raw` into a [`Listener`] without touching the network.
pub fn listen(raw: &str) -> Result<Listener> {
    let uri = uri::parse(raw)?;
    Ok(Listener::from_uri(&uri))
}

/// A bound, live listener.
#[derive(Debug)]
pub enum RuntimeListener {
    Tcp(TcpListener),
    Unix(UnixListener),
    Stdio(StdioListener),
    Mem(MemListener),
}

impl RuntimeListener {
    /// Block until the next connection arrives.
    pub fn accept(&self) -> Result<Connection> {
        match self {
            RuntimeListener::Tcp(l) => l.accept(),
            RuntimeListener::Unix(l) => l.accept(),
            RuntimeListener::Stdio(l) => l.accept(),
            RuntimeListener::Mem(l) => l.accept(),
        }
    }

    /// Close the listener. Idempotent; unblocks concurrent accepts.
    pub fn close(&self) {
        match self {
            RuntimeListener::Tcp(l) => l.close(),
            RuntimeListener::Unix(l) => l.close(),
            RuntimeListener::Stdio(l) => l.close(),
            RuntimeListener::Mem(l) => l.close(),
        }
    }

    /// The listener's concrete bound address.
    pub fn bound_uri(&self) -> Uri {
        match self {
            RuntimeListener::Tcp(l) => l.bound_uri(),
            RuntimeListener::Unix(l) => l.bound_uri(),
            RuntimeListener::Stdio(_) => Uri::stdio(),
            RuntimeListener::Mem(l) => l.bound_uri(),
        }
    }
}

/// Bind a runtime listener for `raw`.
pub fn listen_runtime(raw: &str) -> Result<RuntimeListener> {
    match listen(raw)? {
        Listener::Tcp { host, port } => {
            Ok(RuntimeListener::Tcp(TcpListener::bind(&host, port)?))
        }
        Listener::Unix { path } => Ok(RuntimeListener::Unix(UnixListener::bind(&path)?)),
        Listener::Stdio => Ok(RuntimeListener::Stdio(StdioListener::new())),
        Listener::Mem { name } => Ok(RuntimeListener::Mem(MemListener::new(&name))),
        Listener::Ws { .. } | Listener::Wss { .. } => Err(TransportError::RuntimeUnsupported(
            format!(
                "{}: ws:// and wss:// are dial-only here; serving WebSocket \
                 traffic belongs to the host application",
                uri::scheme_of(raw)
            ),
        )),
    }
}
