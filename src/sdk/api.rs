//! API for duet users
pub type DuetResult<T> = Result<T, DuetError>;
pub type BytesVec = Vec<u8>;

/// Crate-wide error kinds. No error is recovered inside the core; the
/// protocols treat any PSP-side error as fatal for the round and propagate
/// it unchanged.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DuetError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),

    #[error("this operation requires the private key")]
    SecretKeyRequired,

    #[error("ciphertext cannot be mapped to a plaintext in the decryption window")]
    Undecodable,

    #[error("modular inverse does not exist")]
    InverseDoesNotExist,

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

/// Expose duet's (de)serialization functions
/// that use the appropriate bincode config options.
pub use super::wire_bytes::{deserialize, serialize};
