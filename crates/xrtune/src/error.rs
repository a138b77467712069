#![forbid(unsafe_code)]

//! Top-level error type.

use xrtune_controls::SchemaRejected;
use xrtune_interact::PolicyConfigError;

/// Top-level error type for xrtune apps.
///
/// Per-frame operations never fail; only startup configuration and strict
/// registration produce errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Interaction policy could not be loaded or failed validation.
    #[error("interaction policy: {0}")]
    Policy(#[from] PolicyConfigError),
    /// Strict registration found schema defects.
    #[error(transparent)]
    Schema(#[from] SchemaRejected),
}

/// Standard result type for xrtune APIs.
pub type Result<T, E = Error> = std::result::Result<T, E>;
