//! Crypto Session - toy public-key primitives for Trustline
//!
//! Provides finite-field Diffie-Hellman, the CA's modular-exponentiation
//! signature scheme and the per-character exponentiation cipher used once
//! a handshake is established.
//!
//! Every primitive works on moduli that fit in 64 bits. They are small on
//! purpose and offer no real confidentiality.

mod arith;
mod cipher;
mod error;
mod key_agreement;
mod signature;

pub use arith::{gcd, is_prime, mod_inverse, mod_pow};
pub use cipher::*;
pub use error::*;
pub use key_agreement::*;
pub use signature::*;

/// Public exponent of every secret-derived cipher keypair
pub const DERIVED_PUBLIC_EXPONENT: u64 = 17;

/// Default DH modulus
pub const DEFAULT_DH_MODULUS: u64 = 23;

/// Default DH generator
pub const DEFAULT_DH_GENERATOR: u64 = 5;
