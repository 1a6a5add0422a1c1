//! Common error types for CredVault.

use thiserror::Error;

/// Top-level error type for CredVault operations.
///
/// Every variant is terminal for the request that raised it: nothing is
/// retried and nothing is persisted after an error.
#[derive(Debug, Error)]
pub enum Error {
    /// A required field is missing or a supplied value is malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A required resolution produced no match.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The container could not be opened (missing, wrong passphrase, corrupt).
    #[error("Open error: {0}")]
    Open(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Cryptographic operation failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Short machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::Open(_) => "open",
            Error::Io(_) => "io",
            Error::Crypto(_) => "crypto",
            Error::Serialization(_) => "serialization",
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind() {
        assert_eq!(Error::Validation("x".into()).kind(), "validation");
        assert_eq!(Error::NotFound("x".into()).kind(), "not_found");
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert_eq!(Error::from(io).kind(), "io");
    }

    #[test]
    fn test_error_display() {
        let err = Error::Open("Invalid passphrase".to_string());
        assert_eq!(err.to_string(), "Open error: Invalid passphrase");
    }
}
