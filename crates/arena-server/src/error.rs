//! Server error types.

use std::fmt;

/// Errors that can occur in the server.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid interface, bad address, etc.).
    ///
    /// These are fatal errors that prevent server startup. Fix the
    /// configuration and restart.
    Config(String),

    /// The listening endpoint could not be bound (address in use, access
    /// denied, etc.).
    ///
    /// Fatal; startup is aborted before any connection is served.
    Bind(String),

    /// Transport/network error (connection failure, I/O error, etc.).
    ///
    /// May be transient (network issues) or fatal for one connection.
    /// The server keeps serving other clients.
    Transport(String),

    /// Protocol error (malformed HTTP head, broken websocket handshake,
    /// etc.).
    ///
    /// Fatal for that connection only.
    Protocol(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Bind(msg) => write!(f, "bind error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
