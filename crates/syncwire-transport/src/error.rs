use std::net::SocketAddr;
use std::path::PathBuf;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// A simplex carrier could not open its backing file.
    #[error("failed to open {path}: {source}")]
    File {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The plugin configuration is unusable.
    #[error("invalid transport config: {0}")]
    InvalidConfig(String),

    /// The connection has already been disposed of.
    #[error("connection disposed")]
    Disposed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
