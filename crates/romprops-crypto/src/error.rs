//! Error types for cryptographic operations

use thiserror::Error;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Invalid key size
    #[error("Invalid key size: expected {expected}, got {actual}")]
    InvalidKeySize {
        /// Expected key size in bytes
        expected: usize,
        /// Actual key size in bytes
        actual: usize,
    },

    /// Invalid IV size
    #[error("Invalid IV size: expected {expected}, got {actual}")]
    InvalidIvSize {
        /// Expected IV size in bytes
        expected: usize,
        /// Actual IV size in bytes
        actual: usize,
    },

    /// Data length is not a multiple of the cipher block size
    #[error("Data length {0} is not a multiple of the AES block size")]
    UnalignedLength(usize),

    /// Key not found
    #[error("Encryption key not found: {0}")]
    KeyNotFound(String),

    /// Invalid key format
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    /// Key did not decrypt its verification block correctly
    #[error("Key verification failed for {name}: {result}")]
    KeyVerification {
        /// Key name
        name: String,
        /// Verification outcome
        result: crate::keys::VerifyResult,
    },

    /// Cipher backend rejected the operation
    #[error("Cipher error: {0}")]
    Cipher(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for cryptographic operations
pub type CryptoResult<T> = Result<T, CryptoError>;
