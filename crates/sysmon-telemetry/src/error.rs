//! Error types for the telemetry core.

use std::io;
use std::path::Path;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the core itself.
///
/// Per-source failures never show up here; they are absorbed into
/// [`SourceError`] and the source's health state.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration rejected at construction time.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A snapshot was published with a sequence not newer than the current one.
    #[error("Snapshot {attempted} published out of order (current is {current})")]
    OutOfOrder { current: u64, attempted: u64 },
}

/// Classified failure of a single backend call.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Backend is not supported on this host.
    #[error("Backend unsupported: {0}")]
    Unsupported(String),

    /// Backend exists but access was denied.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Backend found no device to read.
    #[error("No such device: {0}")]
    NoDevice(String),

    /// Native I/O failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Any other backend failure.
    #[error("Backend error: {0}")]
    Backend(String),

    /// The worker running the backend call panicked.
    #[error("Sensor worker panicked: {0}")]
    WorkerPanicked(String),
}

impl SourceError {
    /// Classifies an I/O error raised while reading `path`.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        let path = path.display().to_string();
        match err.kind() {
            io::ErrorKind::PermissionDenied => SourceError::PermissionDenied(path),
            io::ErrorKind::NotFound => SourceError::NoDevice(path),
            _ => SourceError::Io { path, source: err },
        }
    }

    /// Returns true if retrying is pointless until the host changes.
    ///
    /// Such sources are excluded from polling until a manual re-check.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            SourceError::Unsupported(_) | SourceError::PermissionDenied(_)
        )
    }
}
