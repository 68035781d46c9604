use std::fmt;
use thiserror::Error;

/// The error type for all gcp-identity operations.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<anyhow::Error>,
}

/// The kind of error that occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required parameter is missing/invalid, or the environment is not
    /// the one the operation requires (e.g. not running on GCE).
    ConfigInvalid,

    /// Credentials are missing, malformed or unusable for the operation.
    CredentialInvalid,

    /// The request cannot be constructed (invalid bucket/object/method, ...).
    RequestInvalid,

    /// A response payload could not be decoded (base64, JSON, ...).
    DecodeFailed,

    /// The presented token is not a well-formed JWT or is missing required
    /// header fields or claims.
    TokenMalformed,

    /// The token's `exp` claim is in the past.
    TokenExpired,

    /// The token's cryptographic signature does not verify.
    SignatureInvalid,

    /// The signing key named by the token is not in the key set, even after
    /// a refresh.
    KeyNotFound,

    /// The token's issuer does not equal the configured issuer.
    IssuerMismatch,

    /// The token's audience does not match the configured audience.
    AudienceMismatch,

    /// Unexpected errors (network, I/O, service errors, etc.).
    Unexpected,
}

impl Error {
    /// Create a new error with the given kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Add a source error.
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Check if this error is a token validation failure ("bad token") as
    /// opposed to an infrastructure failure, so callers can alert
    /// differently on the two.
    pub fn is_token_error(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::TokenMalformed
                | ErrorKind::TokenExpired
                | ErrorKind::SignatureInvalid
                | ErrorKind::KeyNotFound
                | ErrorKind::IssuerMismatch
                | ErrorKind::AudienceMismatch
        )
    }
}

// Convenience constructors
impl Error {
    /// Create a config invalid error.
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    /// Create a credential invalid error.
    pub fn credential_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CredentialInvalid, message)
    }

    /// Create a request invalid error.
    pub fn request_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RequestInvalid, message)
    }

    /// Create a decode failed error.
    pub fn decode_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DecodeFailed, message)
    }

    /// Create a token malformed error.
    pub fn token_malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TokenMalformed, message)
    }

    /// Create a token expired error.
    pub fn token_expired(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TokenExpired, message)
    }

    /// Create a signature invalid error.
    pub fn signature_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SignatureInvalid, message)
    }

    /// Create a key not found error.
    pub fn key_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::KeyNotFound, message)
    }

    /// Create an issuer mismatch error.
    pub fn issuer_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IssuerMismatch, message)
    }

    /// Create an audience mismatch error.
    pub fn audience_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AudienceMismatch, message)
    }

    /// Create an unexpected error.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::ConfigInvalid => write!(f, "invalid configuration"),
            ErrorKind::CredentialInvalid => write!(f, "invalid credentials"),
            ErrorKind::RequestInvalid => write!(f, "invalid request"),
            ErrorKind::DecodeFailed => write!(f, "decode failed"),
            ErrorKind::TokenMalformed => write!(f, "malformed token"),
            ErrorKind::TokenExpired => write!(f, "token expired"),
            ErrorKind::SignatureInvalid => write!(f, "invalid signature"),
            ErrorKind::KeyNotFound => write!(f, "signing key not found"),
            ErrorKind::IssuerMismatch => write!(f, "issuer mismatch"),
            ErrorKind::AudienceMismatch => write!(f, "audience mismatch"),
            ErrorKind::Unexpected => write!(f, "unexpected error"),
        }
    }
}

/// Convenience type alias for Results.
pub type Result<T> = std::result::Result<T, Error>;

// Common From implementations
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::unexpected(err.to_string()).with_source(err)
    }
}

impl From<http::Error> for Error {
    fn from(err: http::Error) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::uri::InvalidUri> for Error {
    fn from(err: http::uri::InvalidUri) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Self::decode_failed(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::unexpected(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_message() {
        let err = Error::config_invalid("audience must not be empty");
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
        assert_eq!(err.to_string(), "audience must not be empty");
    }

    #[test]
    fn test_is_token_error() {
        assert!(Error::token_expired("exp in the past").is_token_error());
        assert!(Error::key_not_found("kid missing").is_token_error());
        assert!(!Error::unexpected("network down").is_token_error());
        assert!(!Error::config_invalid("bad input").is_token_error());
    }

    #[test]
    fn test_source_preserved() {
        use std::error::Error as _;

        let io = std::io::Error::other("boom");
        let err = Error::unexpected("request failed").with_source(io);
        assert!(err.source().is_some());
    }
}
