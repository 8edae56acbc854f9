//! Server error types.

use std::fmt;

use crate::driver::DriverError;

/// Errors that can occur in the server runtime.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, etc.).
    ///
    /// Fatal: prevents server startup. Fix configuration and restart.
    Config(String),

    /// Transport/network error (handshake failure, I/O error, etc.).
    ///
    /// Fatal for that connection only; the server keeps serving others.
    Transport(String),

    /// Protocol error (failed to encode an outbound envelope).
    ///
    /// Indicates a bug in envelope construction, not client misbehavior;
    /// client misbehavior is answered on the wire and never raised here.
    Protocol(String),

    /// Driver error (runtime and driver disagree about a session).
    ///
    /// Should never happen in a correct runtime. Indicates a bug.
    Driver(DriverError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Driver(err) => write!(f, "driver error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Driver(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DriverError> for ServerError {
    fn from(err: DriverError) -> Self {
        Self::Driver(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<switchboard_proto::EnvelopeError> for ServerError {
    fn from(err: switchboard_proto::EnvelopeError) -> Self {
        Self::Protocol(err.to_string())
    }
}
