//! Unix domain socket runtime listener.

use std::io;
use std::os::fd::{IntoRawFd, RawFd};
use std::path::PathBuf;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

use socket2::{Domain, SockAddr, Socket, Type};

use holon_uri::Uri;

use crate::connection::Connection;
use crate::error::{Result, TransportError};
use crate::tcp::ACCEPT_BACKLOG;

/// A bound Unix domain socket listener.
///
/// Any stale socket file at the path is unlinked before binding, and the
/// path is unlinked again on close.
#[derive(Debug)]
pub struct UnixListener {
    fd: RawFd,
    path: PathBuf,
    closed: AtomicBool,
}

impl UnixListener {
    /// Bind a listening socket at `path`.
    ///
    /// Paths longer than the platform's `sun_path` limit are rejected with
    /// a listen failure.
    pub fn bind(path: &str) -> Result<Self> {
        let addr = SockAddr::unix(path)
            .map_err(|e| TransportError::ListenFailed(format!("socket path {path}: {e}")))?;

        // Recover from a stale socket inode left by a previous process.
        let _ = std::fs::remove_file(path);

        let bind = || -> io::Result<Socket> {
            let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
            socket.bind(&addr)?;
            socket.listen(ACCEPT_BACKLOG)?;
            Ok(socket)
        };
        let socket =
            bind().map_err(|e| TransportError::ListenFailed(format!("bind {path}: {e}")))?;

        tracing::debug!(path, "unix listener bound");
        Ok(UnixListener {
            fd: socket.into_raw_fd(),
            path: PathBuf::from(path),
            closed: AtomicBool::new(false),
        })
    }

    /// The socket path the listener is bound to.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// The listener's address as a `unix://` URI.
    pub fn bound_uri(&self) -> Uri {
        Uri::unix(&self.path.to_string_lossy())
    }

    /// Block until a peer connects.
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

    /// Close the listener and unlink the socket path. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(path = %self.path.display(), "unix listener closing");
        unsafe {
            libc::shutdown(self.fd, libc::SHUT_RDWR);
            libc::close(self.fd);
        }
        let _ = std::fs::remove_file(&self.path);
    }
}

impl Drop for UnixListener {
    fn drop(&mut self) {
        self.close();
    }
}
