//! Error types for ecstripe
//!
//! This module defines the common error types used throughout the system.
//! Errors fall into three families that callers treat differently:
//!
//! - contract violations (`is_fatal`): the caller broke a precondition, the
//!   operation did not run and must not be retried as-is
//! - codec failures (`is_retryable`): the erasure backend could not produce
//!   the requested shards, the caller may redirect to other shards
//! - metadata decode failures: a persisted record is corrupt or too new
//!
//! Integrity mismatches are not errors at all, they are reported as `bool`.

use thiserror::Error;

/// Common result type for ecstripe operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for ecstripe
#[derive(Debug, Error)]
pub enum Error {
    // Contract violations
    #[error("length {length} is not a multiple of {alignment}")]
    Misaligned { length: u64, alignment: u64 },

    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("contract violation: {0}")]
    ContractViolation(String),

    // Erasure coding errors
    #[error("insufficient shards for reconstruction: have {available}, need {required}")]
    InsufficientShards { available: usize, required: usize },

    #[error("erasure coding error: {0}")]
    ErasureCoding(String),

    // Persisted metadata errors
    #[error("decode error: {0}")]
    Decode(String),

    #[error("unsupported {record} encoding: compat version {compat}, supported up to {supported}")]
    UnsupportedVersion {
        record: &'static str,
        compat: u8,
        supported: u8,
    },

    // Ambient errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a contract violation error
    pub fn contract(msg: impl Into<String>) -> Self {
        Self::ContractViolation(msg.into())
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Check if this error is a caller-side precondition failure
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Misaligned { .. }
                | Self::SizeMismatch { .. }
                | Self::InvalidInput(_)
                | Self::InvalidArgument(_)
                | Self::ContractViolation(_)
        )
    }

    /// Check if the request may succeed against a different set of shards
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientShards { .. } | Self::ErasureCoding(_)
        )
    }

    /// Check if this error came from a corrupt or incompatible record
    #[must_use]
    pub fn is_malformed_metadata(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::UnsupportedVersion { .. })
    }
}
