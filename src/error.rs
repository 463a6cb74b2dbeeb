//! Error taxonomy for the transfer protocol.
//!
//! Recoverable kinds are answered with `-ERR` and the connection keeps
//! going. Everything else closes the connection it happened on.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The server closed the connection before greeting us.
    #[error("connection refused by the server")]
    ConnectionRefused,

    /// End-of-stream where the protocol expected more data.
    #[error("connection closed by the peer")]
    PeerClosed,

    /// A local write to the socket did not go through completely.
    #[error("transmission failed: {0}")]
    Transmission(#[source] io::Error),

    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),

    #[error("file not found: {path}")]
    NotFound {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The file length does not fit the 32-bit size header.
    #[error("file {path} is too large ({size} bytes)")]
    TooLarge { path: String, size: u64 },

    #[error("no command received within {0:?}")]
    Timeout(Duration),

    #[error("malformed message: {0}")]
    Malformed(String),

    /// Local file I/O failed while a transfer was in progress.
    #[error("file error on {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether the server answers this with `-ERR` and keeps serving.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::NotFound { .. } | Error::TooLarge { .. } | Error::Malformed(_)
        )
    }

    /// Whether the error means the other side hung up.
    pub fn is_peer_closed(&self) -> bool {
        matches!(self, Error::PeerClosed | Error::ConnectionRefused)
    }
}
