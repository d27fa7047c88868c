//! Error types for the synergy engine.
//!
//! Read paths never produce these: an absent unit, pair or pattern is reported
//! as `None`, an empty collection or the configured default.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Composition was attempted against an index that was never built.
    #[error("Trait index has not been built; call TraitIndex::build before composing")]
    IndexNotBuilt,

    #[error("Corrupt snapshot at {path}: {reason}")]
    CorruptSnapshot { path: PathBuf, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::Configuration(err.to_string())
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(err: serde_yaml::Error) -> Self {
        EngineError::Catalog(err.to_string())
    }
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
