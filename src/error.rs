use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by remote transfer sessions.
///
/// Permission application and session close are best-effort: their failures
/// are logged, never returned. `delete` reports a plain boolean instead of
/// an error.
#[derive(Debug, Error)]
pub enum FerryError {
    /// Handshake, authentication, or host-key verification failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The local private key file could not be read.
    #[error("cannot read private key {path}: {source}")]
    KeyRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A remote directory listing failed.
    #[error("cannot list {path}: {reason}")]
    List { path: String, reason: String },

    /// Remote directory creation or the remote write failed.
    #[error("upload to {path} failed: {reason}")]
    Upload { path: String, reason: String },

    /// The remote file could not be opened or streamed.
    #[error("download of {path} failed: {reason}")]
    Download { path: String, reason: String },

    /// Local staging I/O failed.
    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A permission rule's mode string was not valid octal.
    #[error("invalid permission mode {mode:?} for pattern {pattern:?}")]
    InvalidMode { pattern: String, mode: String },
}
