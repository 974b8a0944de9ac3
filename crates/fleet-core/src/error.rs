//! Error types shared across the fleet crates.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for fleet operations.
pub type FleetResult<T> = Result<T, FleetError>;

/// Errors that can occur while observing the proxy or rewriting its config.
#[derive(Debug, Error)]
pub enum FleetError {
    /// The stats socket or a control command could not be reached.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    /// A statistics line that does not satisfy the CSV schema.
    #[error("malformed stats record: {0}")]
    MalformedRecord(String),

    #[error("unknown application: {0}")]
    UnknownApplication(String),

    #[error("application already registered: {0}")]
    DuplicateApplication(String),

    #[error("failed to write {}: {source}", path.display())]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The proxy refused or failed to apply the regenerated config.
    #[error("proxy reload failed: {0}")]
    Reload(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl FleetError {
    /// Wrap an I/O error raised while writing `path`.
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FleetError::ConfigWrite {
            path: path.into(),
            source,
        }
    }

    /// Wrap an I/O error raised while reading `path`.
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FleetError::ConfigRead {
            path: path.into(),
            source,
        }
    }
}
