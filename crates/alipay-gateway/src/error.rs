//! Error types for the gateway client.

use std::time::Duration;

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// A local precondition failed (empty plaintext, missing cipher settings).
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// Key material is missing or malformed.
    #[error("invalid key material: {message}")]
    Key { message: String },

    /// Producing a request signature failed.
    #[error("signing failed: {reason}")]
    Signing { reason: String },

    /// Signature verification failed.
    #[error("signature verification failed: {reason}")]
    SignatureInvalid { reason: String },

    /// The response carried no signature for the located payload.
    #[error("response for {method} carries no signature")]
    MissingSignature { method: String },

    /// A certificate serial number could not be resolved to a public key.
    #[error("certificate not trusted: {cert_sn}")]
    CertificateNotTrusted { cert_sn: String },

    /// The certificate download sub-call failed.
    #[error("certificate download for {cert_sn} failed: {message}")]
    CertificateDownload { cert_sn: String, message: String },

    /// A certificate or the key inside it could not be parsed.
    #[error("certificate parse error: {message}")]
    CertificateParse { message: String },

    /// A downloaded certificate does not carry the requested serial number.
    #[error("certificate serial number mismatch: requested {requested}, got {actual}")]
    CertificateSnMismatch { requested: String, actual: String },

    /// The response document does not have the expected shape.
    #[error("malformed response: {message}")]
    MalformedResponse { message: String },

    /// Symmetric encryption or decryption failed.
    #[error("encryption error: {message}")]
    Encryption { message: String },

    /// The gateway answered with a verified `error_response`.
    #[error("gateway error {code}: {msg} ({sub_code}: {sub_msg})")]
    Gateway {
        code: String,
        msg: String,
        sub_code: String,
        sub_msg: String,
    },

    /// Rate limit exceeded.
    #[error("rate limited: retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Network error.
    #[error("network error: {message}")]
    Network { message: String },

    /// A verified payload could not be decoded into the expected type.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl GatewayError {
    /// Whether the error is retryable at the transport level.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Network { .. })
    }

    /// Whether the error means the response could not be authenticated.
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            Self::SignatureInvalid { .. }
                | Self::MissingSignature { .. }
                | Self::CertificateNotTrusted { .. }
                | Self::CertificateSnMismatch { .. }
        )
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
