//! crates/quiz_platform_core/src/error.rs
//!
//! The client-facing error taxonomy returned by every core service.

use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Validation(String),
    #[error("Upstream service unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("Invalid payment notification signature")]
    SignatureInvalid,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<PortError> for CoreError {
    fn from(e: PortError) -> Self {
        match e {
            PortError::NotFound(msg) => CoreError::NotFound(msg),
            PortError::Conflict(msg) => CoreError::Conflict(msg),
            PortError::IdCollision(what) => {
                CoreError::Internal(format!("could not allocate an id for {}", what))
            }
            PortError::Unauthorized => CoreError::Forbidden("Unauthorized".to_string()),
            PortError::Unexpected(msg) => CoreError::Internal(msg),
        }
    }
}

/// A convenience type alias for `Result<T, CoreError>`.
pub type CoreResult<T> = Result<T, CoreError>;

/// Converts a failure of an external collaborator (gateway, identity provider,
/// generator) into `UpstreamUnavailable`.
pub(crate) fn upstream(e: PortError) -> CoreError {
    CoreError::UpstreamUnavailable(e.to_string())
}
