//! TCP runtime listener.

use std::io;
use std::net::ToSocketAddrs;
use std::os::fd::{IntoRawFd, RawFd};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

use socket2::{Domain, Protocol, Socket, Type};

use holon_uri::Uri;

use crate::connection::Connection;
use crate::error::{Result, TransportError};

pub(crate) const ACCEPT_BACKLOG: i32 = 16;

/// A bound TCP listener.
///
/// Binding with port 0 picks a free port; the bound address is read back
/// from the kernel so [`TcpListener::bound_uri`] always reports the real
/// port.
#[derive(Debug)]
pub struct TcpListener {
    fd: RawFd,
    host: String,
    port: u16,
    closed: AtomicBool,
}

impl TcpListener {
    /// Resolve `(host, port)` and bind the first candidate address that
    /// accepts a listening socket.
    pub fn bind(host: &str, port: u16) -> Result<Self> {
        let bind_host = if host.is_empty() {
            holon_uri::ALL_INTERFACES
        } else {
            host
        };
        let candidates = (bind_host, port).to_socket_addrs().map_err(|e| {
            TransportError::ListenFailed(format!("resolve {bind_host}:{port}: {e}"))
        })?;

        let mut last_err: Option<io::Error> = None;
        for addr in candidates {
            match Self::bind_one(addr) {
                Ok(listener) => {
                    tracing::debug!(uri = %listener.bound_uri(), "tcp listener bound");
                    return Ok(listener);
                }
                Err(e) => last_err = Some(e),
            }
        }
        let detail = match last_err {
            Some(e) => e.to_string(),
            None => "no candidate addresses".to_string(),
        };
        Err(TransportError::ListenFailed(format!(
            "bind {bind_host}:{port}: {detail}"
        )))
    }

    fn bind_one(addr: std::net::SocketAddr) -> io::Result<TcpListener> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(ACCEPT_BACKLOG)?;

        let local = socket
            .local_addr()?
            .as_socket()
            .ok_or_else(|| io::Error::other("bound address is not an inet address"))?;

        Ok(TcpListener {
            fd: socket.into_raw_fd(),
            host: local.ip().to_string(),
            port: local.port(),
            closed: AtomicBool::new(false),
        })
    }

    /// The host the listener is bound to, without brackets.
    pub fn bound_host(&self) -> &str {
        &self.host
    }

    /// The concrete bound port (never 0).
    pub fn bound_port(&self) -> u16 {
        self.port
    }

    /// The listener's address as a `tcp://` URI.
    pub fn bound_uri(&self) -> Uri {
        Uri::tcp(&self.host, self.port)
    }

    /// Block until a peer connects.
    ///
    /// The returned connection owns the accepted descriptor for both
    /// directions.
    pub fn accept(&self) -> Result<Connection> {
        loop {
            let fd = unsafe { libc::accept(self.fd, ptr::null_mut(), ptr::null_mut()) };
            if fd >= 0 {
                return Ok(Connection::new(fd, fd, true, true));
            }
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            if self.closed.load(Ordering::SeqCst) {
                return Err(TransportError::ListenerClosed(self.bound_uri().to_string()));
            }
            return Err(TransportError::AcceptFailed(err.to_string()));
        }
    }

    /// Close the listener. Idempotent and safe from any thread; a blocked
    /// `accept` wakes up and reports the listener as closed.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(uri = %self.bound_uri(), "tcp listener closing");
        unsafe {
            libc::shutdown(self.fd, libc::SHUT_RDWR);
            libc::close(self.fd);
        }
    }
}

impl Drop for TcpListener {
    fn drop(&mut self) {
        self.close();
    }
}
