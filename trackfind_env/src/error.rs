//! Error types for the trackfind environment layer.

use thiserror::Error;

use crate::types::WireId;

/// Errors raised by geometry and truth providers.
#[derive(Debug, Clone, Error)]
pub enum EnvError {
    /// The wire id does not exist in the loaded geometry
    #[error("Unknown wire: {0}")]
    UnknownWire(WireId),

    /// Geometry parameters are inconsistent
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Truth information was requested but never loaded
    #[error("MC truth information not loaded")]
    TruthNotLoaded,
}

impl EnvError {
    /// Creates an invalid geometry error.
    pub fn invalid_geometry(msg: impl Into<String>) -> Self {
        Self::InvalidGeometry(msg.into())
    }
}
