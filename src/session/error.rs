// ABOUTME: Session-level error types for start-up and configuration failures
// ABOUTME: Running sessions handle link errors locally and never surface them here

use std::collections::TryReserveError;
use std::io;
use thiserror::Error;

/// Errors surfaced to the host from `Session::start` and `SessionConfig`.
///
/// Once a session is running, transient link errors are handled by the
/// reconnect loop and reported only through the connection-state callback.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Host names are capped at 63 bytes.
    #[error("host name is {0} bytes; the limit is 63")]
    HostTooLong(usize),

    /// Both dimensions must be in `1..=4096`.
    #[error("resolution {width}x{height} is out of range")]
    InvalidResolution { width: u32, height: u32 },

    /// Start-up buffer allocation failed; the session never began running.
    #[error("buffer allocation failed: {0}")]
    Allocation(#[from] TryReserveError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
