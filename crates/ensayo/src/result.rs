//! Result and error types for Ensayo.
//!
//! Every error is fatal to the running scenario: nothing in the engine
//! recovers locally. [`ErrorKind`] lets the harness classify a failure
//! without matching on every variant.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assertion::AssertionFailure;

/// Result type for Ensayo operations
pub type EnsayoResult<T> = Result<T, EnsayoError>;

/// How many elements a resolution produced when exactly one was required
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchCount {
    /// Nothing matched
    Zero,
    /// More than one element matched
    Many(usize),
}

impl std::fmt::Display for MatchCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Zero => write!(f, "no elements"),
            Self::Many(n) => write!(f, "{n} elements"),
        }
    }
}

/// Errors that can occur in Ensayo
#[derive(Debug, Error)]
pub enum EnsayoError {
    /// Selector matched zero elements, or several where exactly one was required
    #[error("Resolution failed: `{target}` matched {matched}, expected exactly one")]
    Resolution {
        /// Locator description
        target: String,
        /// What the resolver found
        matched: MatchCount,
    },

    /// A wait condition did not hold within its deadline
    #[error(
        "Timed out after {}ms waiting for `{target}` to be {condition} (deadline {}ms)",
        elapsed.as_millis(),
        timeout.as_millis()
    )]
    Timeout {
        /// Condition that was being awaited
        condition: String,
        /// Locator description (or "page" for unconditional waits)
        target: String,
        /// Configured deadline
        timeout: Duration,
        /// Time actually spent waiting
        elapsed: Duration,
    },

    /// The actionability gate failed or the interaction could not be dispatched
    #[error("{action} on `{target}` failed: {reason}")]
    Action {
        /// Action name (fill, click, increment)
        action: String,
        /// Locator description
        target: String,
        /// Why the action was refused
        reason: String,
    },

    /// A predicate evaluated false against observed state
    #[error("Assertion failed: {0}")]
    Assertion(Box<AssertionFailure>),

    /// Selector expression could not be parsed
    #[error("Invalid selector `{selector}` at offset {offset}: {message}")]
    InvalidSelector {
        /// Source expression
        selector: String,
        /// Byte offset of the problem
        offset: usize,
        /// What went wrong
        message: String,
    },

    /// Navigation error
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// Page driver error (detached node, evaluation failure, closed page)
    #[error("Driver error: {message}")]
    Driver {
        /// Error message
        message: String,
    },

    /// Browser launch error
    #[error("Failed to launch browser: {message}")]
    BrowserLaunch {
        /// Error message
        message: String,
    },

    /// Scenario document is malformed
    #[error("Scenario error: {message}")]
    Scenario {
        /// Error message
        message: String,
    },

    /// Configuration is malformed
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

/// Coarse classification used by reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Zero or ambiguous matches
    Resolution,
    /// Wait deadline exceeded
    Timeout,
    /// Actionability gate or dispatch failure
    Action,
    /// Predicate false
    Assertion,
    /// Selector, scenario, or configuration problems found before acting
    Invalid,
    /// Browser, driver, navigation, or I/O failures
    Infrastructure,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Resolution => "resolution",
            Self::Timeout => "timeout",
            Self::Action => "action",
            Self::Assertion => "assertion",
            Self::Invalid => "invalid",
            Self::Infrastructure => "infrastructure",
        };
        f.write_str(name)
    }
}

impl EnsayoError {
    /// Classify this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Resolution { .. } => ErrorKind::Resolution,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Action { .. } => ErrorKind::Action,
            Self::Assertion(_) => ErrorKind::Assertion,
            Self::InvalidSelector { .. } | Self::Scenario { .. } | Self::Config { .. } => {
                ErrorKind::Invalid
            }
            Self::Navigation { .. }
            | Self::Driver { .. }
            | Self::BrowserLaunch { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Yaml(_) => ErrorKind::Infrastructure,
        }
    }

    /// Create a driver error
    #[must_use]
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    /// Create a scenario error
    #[must_use]
    pub fn scenario(message: impl Into<String>) -> Self {
        Self::Scenario {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an action error
    #[must_use]
    pub fn action(
        action: impl Into<String>,
        target: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Action {
            action: action.into(),
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Access the structured assertion failure, if this is one
    #[must_use]
    pub fn as_assertion(&self) -> Option<&AssertionFailure> {
        match self {
            Self::Assertion(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<AssertionFailure> for EnsayoError {
    fn from(failure: AssertionFailure) -> Self {
        Self::Assertion(Box::new(failure))
    }
}
