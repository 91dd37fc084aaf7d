//! Shared error type across MessageHive crates.

use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Directory lookup / deregister miss.
    NotFound,
    /// Group persistence failed.
    Persistence,
    /// Malformed body or frame.
    BadRequest,
    /// Delivery did not complete within its budget.
    Timeout,
    /// Auth failed.
    AuthFailed,
    /// Unsupported config / protocol version.
    UnsupportedVersion,
    /// Internal server error.
    Internal,
}

impl ClientCode {
    /// String representation used in JSON responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::NotFound => "NOT_FOUND",
            ClientCode::Persistence => "PERSISTENCE",
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::Timeout => "TIMEOUT",
            ClientCode::AuthFailed => "AUTH_FAILED",
            ClientCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, HiveError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum HiveError {
    #[error("entity not found: {0}")]
    NotFound(String),
    #[error("persistence: {0}")]
    Persistence(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("delivery timed out")]
    DeliveryTimeout,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("auth failed")]
    AuthFailed,
    #[error("unsupported version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl HiveError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            HiveError::NotFound(_) => ClientCode::NotFound,
            HiveError::Persistence(_) => ClientCode::Persistence,
            HiveError::Decode(_) | HiveError::BadRequest(_) => ClientCode::BadRequest,
            HiveError::DeliveryTimeout => ClientCode::Timeout,
            HiveError::AuthFailed => ClientCode::AuthFailed,
            HiveError::UnsupportedVersion => ClientCode::UnsupportedVersion,
            HiveError::Internal(_) => ClientCode::Internal,
        }
    }
}
