//! CA signature scheme
//!
//! A message hashes to `h = (h·31 + byte) mod n` over its UTF-8 bytes. The
//! signature is `hash^d mod n`, written as a decimal string and base64
//! encoded.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use shared_protocol::PublicKey;
use tracing::debug;

use crate::KeyPair;
use crate::arith::mod_pow;

/// Fixed demo keys: `p = 7`, `q = 11`, `e = 17`, `d = 53`
const DEMO_EXPONENTS: (u64, u64, u64) = (17, 53, 77);

const HASH_MULTIPLIER: u128 = 31;

/// Signs and verifies text with a single keypair
#[derive(Debug, Clone)]
pub struct SignatureScheme {
    keys: KeyPair,
}

impl SignatureScheme {
    pub fn new(keys: KeyPair) -> Self {
        Self { keys }
    }

    /// Scheme over the fixed demo keypair `(d, n) = (53, 77)`
    pub fn demo() -> Self {
        let (e, d, n) = DEMO_EXPONENTS;
        Self::new(KeyPair::from_exponents(e, d, n))
    }

    pub fn modulus(&self) -> u64 {
        self.keys.modulus()
    }

    /// Public half, published so anyone can check signatures
    pub fn verifying_key(&self) -> PublicKey {
        self.keys.public()
    }

    pub fn hash(&self, message: &str) -> u64 {
        let n = u128::from(self.modulus());
        message.bytes().fold(0u64, |h, byte| {
            ((u128::from(h) * HASH_MULTIPLIER + u128::from(byte)) % n) as u64
        })
    }

    pub fn sign(&self, message: &str) -> String {
        let hash = self.hash(message);
        let signature = self.keys.apply_private(hash);
        debug!(hash, signature, "Signed message");
        STANDARD.encode(signature.to_string())
    }

    /// Check `signature` against `message`. Any malformed signature is
    /// simply invalid.
    pub fn verify(&self, message: &str, signature: &str) -> bool {
        let Some(value) = decode_signature(signature) else {
            debug!("Signature is not a base64 decimal integer");
            return false;
        };

        let key = self.verifying_key();
        if value >= key.modulus {
            debug!(value, modulus = key.modulus, "Signature value out of range");
            return false;
        }

        let recovered = mod_pow(value, key.exponent, key.modulus);
        let hash = self.hash(message);
        if recovered != hash {
            debug!(recovered, hash, "Signature does not match message hash");
            return false;
        }
        true
    }
}

fn decode_signature(signature: &str) -> Option<u64> {
    let bytes = STANDARD.decode(signature).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
