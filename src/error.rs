//! Error types for tube channels

use thiserror::Error;

/// Errors surfaced by tube backends
///
/// A dead channel has exactly one failure vocabulary: [`TubeError::EndOfStream`].
/// No distinction is made between a graceful peer close and abrupt process
/// death; callers that need the exit status ask for it via liveness polling.
#[derive(Error, Debug)]
pub enum TubeError {
    /// The peer (or the local side) has closed its half of the channel
    #[error("end of stream")]
    EndOfStream,

    /// An operation was invoked on a channel in an invalid state
    #[error("usage error: {0}")]
    Usage(String),

    /// The invocation specification was invalid before any process was spawned
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The OS failed to spawn the child or wire up its pipes
    #[error("spawn error: {0}")]
    Spawn(String),

    /// Residual I/O failure outside the end-of-stream cases
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TubeError {
    /// Get the stable error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            TubeError::Configuration(_) => "TUBE001",
            TubeError::Usage(_) => "TUBE002",
            TubeError::EndOfStream => "TUBE003",
            TubeError::Spawn(_) => "TUBE004",
            TubeError::Io(_) => "TUBE005",
        }
    }
}

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, TubeError>;
