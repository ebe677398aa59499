//! Error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Master key material was not exactly 32 bytes.
    #[error("invalid master key length: expected 32, found {0}")]
    InvalidKeyLength(usize),

    /// Key index exceeds the per-table key population.
    #[error("key index {0} out of range")]
    IndexOutOfRange(u16),

    /// Certificate bytes did not decode. Always recoverable by rejecting
    /// the single submission; never a panic.
    #[error("malformed certificate: {0}")]
    MalformedCertificate(&'static str),

    /// The certificate's issuer is not a configured trusted root, or the
    /// signature does not verify against that root.
    #[error("certificate issuer not trusted")]
    UntrustedIssuer,

    /// Current time is outside the certificate's validity window.
    #[error("certificate outside validity window")]
    Expired,

    /// AEAD tag mismatch. Deterministic for a given input; never retried.
    #[error("token authentication failed")]
    AuthenticationFailed,

    /// Token bytes did not decode.
    #[error("malformed token: expected {expected} bytes, found {found}")]
    MalformedToken { expected: usize, found: usize },

    /// No master key exists for the requested table.
    #[error("unknown key table {0}")]
    UnknownTable(u16),

    /// A key-table or trusted-roots file that did not decode.
    #[error("malformed key material file: {0}")]
    MalformedKeyFile(&'static str),

    /// A table assignment that is not 3 distinct known table ids.
    #[error("invalid table assignment")]
    InvalidAssignment,

    /// Device serial has no registration.
    #[error("device {0:?} is not registered")]
    UnknownDevice(String),

    /// `register_device` is exactly-once per serial.
    #[error("device {0:?} is already registered")]
    AlreadyRegistered(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
