use thiserror::Error;

#[derive(Error, Debug)]
pub enum JoseError {
    #[error("Malformed JWE header: {0}")]
    MalformedHeader(anyhow::Error),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Insufficient key length: {0}")]
    InsufficientKeyLength(anyhow::Error),

    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(anyhow::Error),

    #[error("Invalid options: {0}")]
    InvalidOptions(anyhow::Error),

    #[error("No matching key: {0}")]
    NoMatchingKey(anyhow::Error),

    #[error("Ambiguous key: {0}")]
    AmbiguousKey(anyhow::Error),

    #[error("Ambiguous recipient: {0} recipients have a matching key.")]
    AmbiguousRecipient(usize),

    #[error("Inconsistent content encryption key across recipients.")]
    InconsistentCek,

    #[error("Integrity check failed.")]
    IntegrityCheckFailed,

    #[error("Decryption failed.")]
    DecryptionFailed,

    #[error("Invalid serialization format: {0}")]
    SerializationFormatError(anyhow::Error),

    #[error("Cryptographic operation failed: {0}")]
    CryptoFailure(anyhow::Error),
}

impl JoseError {
    /// Return true if this error is an authenticated decryption failure.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::IntegrityCheckFailed | Self::DecryptionFailed)
    }
}
