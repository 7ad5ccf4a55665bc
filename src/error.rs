//! Error types for the toolbox IPC substrate.
//!
//! Every operation in this crate returns a `Result` based on the single
//! [`IpcError`] enum, so callers can match on the error kinds from the
//! protocol design (version drift vs. tampering vs. missing endpoint) rather
//! than on backend-specific failure types.

use thiserror::Error;

/// Crate-wide error type for all IPC operations.
#[derive(Error, Debug)]
pub enum IpcError {
    /// Codec decode failure: input was outside the token alphabet or had
    /// invalid length.
    #[error("malformed token")]
    MalformedToken,

    /// Envelope (outer or inner) failed to parse as JSON.
    #[error("malformed envelope json: {0}")]
    MalformedJson(String),

    /// A requested field was absent from the inner message.
    #[error("field missing: {0}")]
    FieldMissing(&'static str),

    /// The detached signature does not verify over the stored inner bytes.
    #[error("signature does not verify")]
    BadSignature,

    /// The envelope's protocol version does not match the version this
    /// process supports.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u64),

    /// The signer backend could not produce a signature (no identity
    /// configured, or the backend itself failed).
    #[error("signer unavailable: {0}")]
    SignerUnavailable(String),

    /// The destination endpoint's queue does not exist.
    #[error("endpoint unknown: {0}")]
    EndpointUnknown(String),

    /// `recv` elapsed without a message arriving.
    #[error("timed out waiting for a message")]
    Timeout,

    /// A filesystem operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Standard `Result` type for all IPC operations.
pub type Result<T> = std::result::Result<T, IpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_token_display() {
        assert_eq!(IpcError::MalformedToken.to_string(), "malformed token");
    }

    #[test]
    fn test_field_missing_display() {
        let err = IpcError::FieldMissing("topic");
        assert_eq!(err.to_string(), "field missing: topic");
    }

    #[test]
    fn test_bad_signature_display() {
        assert_eq!(
            IpcError::BadSignature.to_string(),
            "signature does not verify"
        );
    }

    #[test]
    fn test_unsupported_version_display() {
        let err = IpcError::UnsupportedVersion(2);
        assert_eq!(err.to_string(), "unsupported protocol version: 2");
    }

    #[test]
    fn test_timeout_display() {
        assert_eq!(
            IpcError::Timeout.to_string(),
            "timed out waiting for a message"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "nope");
        let ipc_err: IpcError = io_err.into();
        assert!(matches!(ipc_err, IpcError::Io(_)));
    }

    #[test]
    fn test_endpoint_unknown_display() {
        let err = IpcError::EndpointUnknown("svc/a".to_string());
        assert_eq!(err.to_string(), "endpoint unknown: svc/a");
    }

    #[test]
    fn test_result_alias() {
        let ok: Result<i32> = Ok(1);
        let err: Result<i32> = Err(IpcError::Timeout);
        assert!(ok.is_ok());
        assert!(err.is_err());
    }
}
