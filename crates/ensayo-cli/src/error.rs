//! Error types for the CLI

use ensayo::{EnsayoError, ErrorKind};
use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// Engine error outside a scenario run (configuration, loading, launch)
    #[error("{0}")]
    Engine(#[from] EnsayoError),

    /// A scenario ran and at least one step failed
    #[error("Scenario '{scenario}' failed at step {step} ({kind}): {message}")]
    ScenarioFailed {
        /// Scenario name
        scenario: String,
        /// 1-based failing step
        step: usize,
        /// Error family of the failure
        kind: ErrorKind,
        /// Rendered error
        message: String,
    },

    /// The binary was built without browser support
    #[error("Browser support is not enabled. Rebuild with --features browser")]
    BrowserUnavailable,

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },
}

impl CliError {
    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}
