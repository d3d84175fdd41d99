//! Byte-stream transport substrate.
//!
//! A uniform, URI-addressed facade over four concrete listeners: TCP, Unix
//! domain sockets, the process's stdio pair, and an in-process pipe pair.
//! [`listen_runtime`] turns `tcp://`, `unix://`, `stdio://` or `mem://`
//! into a bound [`RuntimeListener`]; accepted [`Connection`]s expose
//! blocking read/write/close over raw descriptors with explicit
//! per-descriptor ownership.
//!
//! Listeners are thread-friendly: `accept` blocks, `close` is safe from
//! any thread and unblocks a concurrent `accept`.

mod connection;
mod error;
mod listener;
mod mem;
mod serve;
mod stdio;
mod tcp;
mod unix;

pub use connection::Connection;
pub use error::{Result, TransportError};
pub use listener::{listen, listen_runtime, Listener, RuntimeListener};
pub use mem::MemListener;
pub use serve::{listen_uri_from_args, DEFAULT_LISTEN_URI};
pub use stdio::StdioListener;
pub use tcp::TcpListener;
pub use unix::UnixListener;
