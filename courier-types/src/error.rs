//! Error types for Courier wire handling.

use thiserror::Error;

/// Errors that can occur while encoding, sealing, opening or verifying
/// Courier messages.
#[derive(Debug, Error)]
pub enum CourierError {
    /// MessagePack serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] rmp_serde::encode::Error),

    /// MessagePack deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] rmp_serde::decode::Error),

    /// Envelope version this node does not speak
    #[error("unsupported envelope version: {0}")]
    UnsupportedVersion(u8),

    /// Envelope carries no entry for the opening identity
    #[error("envelope is not addressed to {0}")]
    NotAddressed(String),

    /// Tried to seal an envelope without recipients
    #[error("cannot seal an envelope to zero recipients")]
    NoRecipients,

    /// Recipient address has no public keys to seal to
    #[error("address {0} carries no encryption key")]
    MissingEncryptionKey(String),

    /// Key material could not be parsed
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Encryption or randomness failure
    #[error("crypto error: {0}")]
    Crypto(String),

    /// AEAD authentication failed while opening
    #[error("decryption failed: authentication error")]
    DecryptionFailed,

    /// Header sender does not match the key that signed the payload
    #[error("payload sender does not match signer")]
    SignerMismatch,

    /// Unknown wire error code
    #[error("invalid error code: {0}")]
    InvalidErrorCode(u32),

    /// Body does not carry the expected message type
    #[error("unexpected message type: expected {expected}, got {actual}")]
    UnexpectedType {
        /// Expected type tag.
        expected: &'static str,
        /// Type tag found on the payload.
        actual: String,
    },
}
