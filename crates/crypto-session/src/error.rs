//! Crypto session error types

use thiserror::Error;

/// Cryptographic operation error
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid DH parameters: {0}")]
    InvalidParameter(String),

    #[error("Invalid peer public value {value} (expected 1..={max})")]
    InvalidPeerValue { value: u64, max: u64 },

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Plaintext character {ordinal} does not fit modulus {modulus}")]
    PlaintextOverflow { ordinal: u64, modulus: u64 },

    #[error("Ciphertext value {value} has no valid preimage under modulus {modulus}")]
    DecryptionRange { value: u64, modulus: u64 },
}

pub type CryptoResult<T> = Result<T, CryptoError>;
