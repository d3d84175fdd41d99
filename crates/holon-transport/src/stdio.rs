//! Stdio runtime listener.
//!
//! `stdio://` exposes the process's stdin/stdout as a single accepted
//! connection. The process keeps ownership of fds 0 and 1, so the
//! connection's ownership flags are both false and closing it leaves the
//! descriptors open.

use std::sync::{Mutex, MutexGuard};

use crate::connection::Connection;
use crate::error::{Result, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StdioState {
    Fresh,
    Consumed,
    Closed,
}

/// Listener over the process's standard streams. Accepts exactly once.
#[derive(Debug)]
pub struct StdioListener {
    state: Mutex<StdioState>,
}

impl StdioListener {
    pub fn new() -> Self {
        StdioListener {
            state: Mutex::new(StdioState::Fresh),
        }
    }

    fn state(&self) -> MutexGuard<'_, StdioState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Return the stdin/stdout connection on the first call; fail on every
    /// later one.
    pub fn accept(&self) -> Result<Connection> {
        let mut state = self.state();
        match *state {
            StdioState::Fresh => {
                *state = StdioState::Consumed;
                Ok(Connection::new(libc::STDIN_FILENO, libc::STDOUT_FILENO, false, false))
            }
            StdioState::Consumed => Err(TransportError::AcceptFailed(
                "stdio:// accepts exactly one connection".to_string(),
            )),
            StdioState::Closed => {
                Err(TransportError::ListenerClosed("stdio://".to_string()))
            }
        }
    }

    /// Close the listener. Idempotent; fds 0 and 1 are untouched.
    pub fn close(&self) {
        *self.state() = StdioState::Closed;
    }
}

impl Default for StdioListener {
    fn default() -> Self {
        Self::new()
    }
}
