//! In-process runtime listener.
//!
//! `mem://` pairs dialers with acceptors inside one process. Each dial
//! builds two pipes, one per direction, so both sides get a real
//! full-duplex byte stream with the same fd semantics as a socket:
//! closing one side EOFs the other's reads.

use std::collections::VecDeque;
use std::io;
use std::os::fd::RawFd;
use std::sync::{Condvar, Mutex, MutexGuard};

use holon_uri::Uri;

use crate::connection::Connection;
use crate::error::{Result, TransportError};

pub(crate) fn pipe_fds() -> Result<(RawFd, RawFd)> {
    let mut fds = [0 as RawFd; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(TransportError::Io(format!(
            "pipe: {}",
            io::Error::last_os_error()
        )));
    }
    Ok((fds[0], fds[1]))
}

#[derive(Debug)]
struct MemState {
    queue: VecDeque<Connection>,
    closed: bool,
}

/// A named in-process listener.
///
/// Dialers and acceptors pair FIFO; the name only namespaces the listener's
/// reported URI.
#[derive(Debug)]
pub struct MemListener {
    name: String,
    state: Mutex<MemState>,
    available: Condvar,
}

impl MemListener {
    pub fn new(name: &str) -> Self {
        MemListener {
            name: name.to_string(),
            state: Mutex::new(MemState {
                queue: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// The listener's name (possibly empty).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The listener's address as a `mem://` URI.
    pub fn bound_uri(&self) -> Uri {
        Uri::mem(&self.name)
    }

    fn state(&self) -> MutexGuard<'_, MemState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Open a connection to this listener.
    ///
    /// Returns the client side immediately and queues the server side for
    /// the next `accept`. All four pipe fds are owned by the two
    /// connections.
    pub fn dial(&self) -> Result<Connection> {
        let (to_server_read, to_server_write) = pipe_fds()?;
        let (to_client_read, to_client_write) = match pipe_fds() {
            Ok(pair) => pair,
            Err(e) => {
                unsafe {
                    libc::close(to_server_read);
                    libc::close(to_server_write);
                }
                return Err(e);
            }
        };

        let client = Connection::new(to_client_read, to_server_write, true, true);
        let server = Connection::new(to_server_read, to_client_write, true, true);

        let mut state = self.state();
        if state.closed {
            drop(state);
            client.close();
            server.close();
            return Err(TransportError::ListenerClosed(self.bound_uri().to_string()));
        }
        state.queue.push_back(server);
        self.available.notify_one();
        Ok(client)
    }

    /// Block until a dialer shows up, then return the server side of its
    /// pair.
    pub fn accept(&self) -> Result<Connection> {
        let mut state = self.state();
        loop {
            if let Some(conn) = state.queue.pop_front() {
                return Ok(conn);
            }
            if state.closed {
                return Err(TransportError::ListenerClosed(self.bound_uri().to_string()));
            }
            state = match self.available.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Close the listener, closing any queued server connections and
    /// waking every blocked acceptor. Idempotent.
    pub fn close(&self) {
        let mut state = self.state();
        if state.closed {
            return;
        }
        state.closed = true;
        for conn in state.queue.drain(..) {
            conn.close();
        }
        tracing::debug!(name = %self.name, "mem listener closed");
        self.available.notify_all();
    }
}

impl Drop for MemListener {
    fn drop(&mut self) {
        self.close();
    }
}
