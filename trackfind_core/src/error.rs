//! Error types for the tracking core.
//!
//! Filters never raise: a rejected candidate is a NaN weight. Errors are
//! reserved for misconfiguration (surfaced at initialization) and for input
//! that contradicts the loaded geometry.

use thiserror::Error;
use trackfind_env::{EnvError, WireId};

/// Errors that can occur while processing an event.
#[derive(Debug, Clone, Error)]
pub enum TrackingError {
    #[error("Hit {index} references unknown wire {wire}")]
    UnknownWire { index: usize, wire: WireId },

    #[error("Filter '{0}' requires MC truth information, but the event carries none")]
    TruthMissing(String),

    #[error("A chain of {0} segments cannot be expressed as segment triples")]
    IncompatibleChain(usize),

    #[error("Environment error: {0}")]
    Env(#[from] EnvError),
}

/// Errors raised while assembling the pipeline.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown {kind} filter '{name}'")]
    UnknownFilter { kind: &'static str, name: String },

    #[error("Unknown parameter '{param}' for filter '{filter}'")]
    UnknownParameter { filter: String, param: String },

    #[error("Invalid parameter '{param}' for filter '{filter}': {reason}")]
    InvalidParameter {
        filter: String,
        param: String,
        reason: String,
    },

    #[error("Filter '{0}' requires MC truth information, which is not available")]
    TruthRequired(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Creates an invalid parameter error.
    pub fn invalid_parameter(
        filter: impl Into<String>,
        param: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            filter: filter.into(),
            param: param.into(),
            reason: reason.into(),
        }
    }
}
