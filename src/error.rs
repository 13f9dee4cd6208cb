//! The closed error taxonomy returned to callers of the cache service.
//!
//! Provider-specific errors ([`BackendError`](crate::imaging::BackendError),
//! [`StorageError`](crate::storage::StorageError),
//! [`BuildError`](crate::imaging::operations::BuildError)) never leak through
//! the service surface; they are mapped into one of four kinds here.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Malformed width, height, aspect ratio, format or name.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// No original exists for the tenant scope and name.
    #[error("image not found: {0}")]
    NotFound(String),
    /// The provider cannot decode the supplied bytes.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),
    /// Any other provider or storage failure.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Discriminant of [`ServiceError`], for callers that only branch on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidParameter,
    NotFound,
    UnsupportedFormat,
    Internal,
}

impl ErrorKind {
    /// HTTP status a transport layer should answer with.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::InvalidParameter => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::UnsupportedFormat => 415,
            ErrorKind::Internal => 500,
        }
    }
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::InvalidParameter(_) => ErrorKind::InvalidParameter,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            ServiceError::Internal(_) => ErrorKind::Internal,
        }
    }
}
