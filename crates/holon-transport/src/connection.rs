//! Blocking byte-stream connection over a pair of file descriptors.
//!
//! A connection does not assume it owns its descriptors: stdio connections
//! borrow the process's fds 0 and 1, while accepted sockets and mem-pair
//! pipes are owned outright. The two ownership flags make that explicit
//! instead of leaning on close-on-drop wrappers.

use std::io;
use std::os::fd::RawFd;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Result, TransportError};

/// A full-duplex byte stream over `(read_fd, write_fd)`.
///
/// Reads and writes are serialised against `close` but not against each
/// other, so one thread may read while another writes. Concurrent calls in
/// the same direction are the caller's business.
#[derive(Debug)]
pub struct Connection {
    read_fd: RawFd,
    write_fd: RawFd,
    owns_read_fd: bool,
    owns_write_fd: bool,
    closed: Mutex<bool>,
}

impl Connection {
    pub(crate) fn new(
        read_fd: RawFd,
        write_fd: RawFd,
        owns_read_fd: bool,
        owns_write_fd: bool,
    ) -> Self {
        Connection {
            read_fd,
            write_fd,
            owns_read_fd,
            owns_write_fd,
            closed: Mutex::new(false),
        }
    }

    /// The descriptor reads come from.
    pub fn read_fd(&self) -> RawFd {
        self.read_fd
    }

    /// The descriptor writes go to.
    pub fn write_fd(&self) -> RawFd {
        self.write_fd
    }

    fn state(&self) -> MutexGuard<'_, bool> {
        match self.closed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn check_open(&self) -> Result<()> {
        if *self.state() {
            return Err(TransportError::ListenerClosed(
                "connection already closed".to_string(),
            ));
        }
        Ok(())
    }

    /// Read up to `max_bytes` from a single kernel read.
    ///
    /// An empty result means the peer reached end of stream.
    pub fn read(&self, max_bytes: usize) -> Result<Vec<u8>> {
        self.check_open()?;
        let mut buf = vec![0u8; max_bytes];
        loop {
            let n = unsafe {
                libc::read(
                    self.read_fd,
                    buf.as_mut_ptr() as *mut libc::c_void,
                    max_bytes,
                )
            };
            if n >= 0 {
                buf.truncate(n as usize);
                return Ok(buf);
            }
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(TransportError::Io(format!("read failed: {err}")));
        }
    }

    /// Write the whole buffer, looping over short writes.
    ///
    /// Partial success is never reported: either every byte was written or
    /// an error comes back.
    pub fn write(&self, buf: &[u8]) -> Result<()> {
        self.check_open()?;
        let mut written = 0usize;
        while written < buf.len() {
            let n = unsafe {
                libc::write(
                    self.write_fd,
                    buf[written..].as_ptr() as *const libc::c_void,
                    buf.len() - written,
                )
            };
            if n > 0 {
                written += n as usize;
                continue;
            }
            if n == 0 {
                return Err(TransportError::Io("zero-byte write".to_string()));
            }
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(TransportError::Io(format!("write failed: {err}")));
        }
        Ok(())
    }

    /// Close the connection, releasing any owned descriptors. Idempotent.
    ///
    /// The read fd is closed only when owned; the write fd only when owned
    /// and distinct from the read fd (accepted sockets use one fd for both
    /// directions).
    pub fn close(&self) {
        let mut closed = self.state();
        if *closed {
            return;
        }
        *closed = true;
        if self.owns_read_fd {
            unsafe {
                libc::close(self.read_fd);
            }
        }
        if self.owns_write_fd && self.write_fd != self.read_fd {
            unsafe {
                libc::close(self.write_fd);
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}
