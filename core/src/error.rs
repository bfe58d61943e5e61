//! Error types for the engine.
//!
//! Only configuration problems and cancellation are fatal. Everything that goes wrong while
//! analysing a single file is recorded as a degradation or a [`crate::report::RunWarning`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value} for `{name}`: {reason}")]
    InvalidThreshold {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("unknown detector id `{0}`")]
    UnknownDetector(String),
    #[error("unknown language `{0}` in detector toggles")]
    UnknownLanguage(String),
    #[error("invalid pattern for rule `{rule}`: {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid ignore glob `{pattern}`: {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// A single detector failing on a single file.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("pattern `{pattern}` failed: {message}")]
    Pattern { pattern: String, message: String },
    #[error("{0}")]
    Internal(String),
    #[error("detector panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("analysis cancelled")]
    Cancelled,
}
