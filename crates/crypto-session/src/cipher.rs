//! Per-character modular-exponentiation cipher
//!
//! Each character's ordinal `m` maps to `m^e mod n`; decryption maps each
//! value `c` back through `c^d mod n`. Keys come either from a keypair the
//! peer owns and publishes in its certificate, or from the DH shared secret.

use std::fmt;

use shared_protocol::PublicKey;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::arith::{gcd, is_prime, mod_inverse, mod_pow};
use crate::{CryptoError, CryptoResult, DERIVED_PUBLIC_EXPONENT, SharedSecret};

/// Multipliers applied to the shared secret to seed the two primes
const SEED_MULTIPLIERS: (u64, u64) = (61, 53);

/// Seeds are reduced modulo this bound
const SEED_BOUND: u64 = 1000;

/// Upper bound on candidate advances while searching for a prime pair
const MAX_PRIME_SEARCH: u64 = 100_000;

/// Private exponent with its modulus
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey {
    exponent: u64,
    modulus: u64,
}

impl PrivateKey {
    pub fn modulus(&self) -> u64 {
        self.modulus
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("modulus", &self.modulus)
            .finish_non_exhaustive()
    }
}

/// Exponentiation keypair sharing one modulus, `e·d ≡ 1 (mod φ(n))`
#[derive(Clone)]
pub struct KeyPair {
    public: PublicKey,
    private: PrivateKey,
}

impl KeyPair {
    /// Build a keypair from two distinct primes and a public exponent
    pub fn from_primes(p: u64, q: u64, e: u64) -> CryptoResult<Self> {
        if !is_prime(p) || !is_prime(q) {
            return Err(CryptoError::KeyDerivation(format!(
                "factors {p} and {q} must both be prime"
            )));
        }
        if p == q {
            return Err(CryptoError::KeyDerivation(format!(
                "factors must be distinct, got {p} twice"
            )));
        }
        let n = p.checked_mul(q).ok_or_else(|| {
            CryptoError::KeyDerivation(format!("modulus {p} * {q} overflows 64 bits"))
        })?;

        let phi = (p - 1) * (q - 1);
        if gcd(e, phi) != 1 {
            return Err(CryptoError::KeyDerivation(format!(
                "public exponent {e} is not coprime with phi(n) = {phi}"
            )));
        }
        let d = mod_inverse(e, phi).ok_or_else(|| {
            CryptoError::KeyDerivation(format!("no inverse of {e} modulo {phi}"))
        })?;

        Ok(Self {
            public: PublicKey::new(e, n),
            private: PrivateKey {
                exponent: d,
                modulus: n,
            },
        })
    }

    /// Derive a keypair from a DH shared secret.
    ///
    /// Seeds `p' = 61·s mod 1000` and `q' = 53·s mod 1000`, then advances
    /// both by one until both are prime. The public exponent is fixed at 17.
    pub fn from_shared_secret(secret: &SharedSecret) -> CryptoResult<Self> {
        let seed = secret.value() % SEED_BOUND;
        let mut p = SEED_MULTIPLIERS.0 * seed % SEED_BOUND;
        let mut q = SEED_MULTIPLIERS.1 * seed % SEED_BOUND;

        let mut steps = 0;
        while !(is_prime(p) && is_prime(q)) {
            if steps == MAX_PRIME_SEARCH {
                return Err(CryptoError::KeyDerivation(format!(
                    "no prime pair within {MAX_PRIME_SEARCH} steps of the seed"
                )));
            }
            p += 1;
            q += 1;
            steps += 1;
        }
        debug!(p, q, steps, "Derived cipher primes from shared secret");

        Self::from_primes(p, q, DERIVED_PUBLIC_EXPONENT)
    }

    /// Assemble a keypair from known exponents without validation
    pub(crate) fn from_exponents(e: u64, d: u64, n: u64) -> Self {
        Self {
            public: PublicKey {
                exponent: e,
                modulus: n,
            },
            private: PrivateKey {
                exponent: d,
                modulus: n,
            },
        }
    }

    pub fn public(&self) -> PublicKey {
        self.public
    }

    pub fn private(&self) -> &PrivateKey {
        &self.private
    }

    pub fn modulus(&self) -> u64 {
        self.public.modulus
    }

    pub fn encrypt(&self, text: &str) -> CryptoResult<Vec<u64>> {
        encrypt(text, &self.public)
    }

    pub fn decrypt(&self, values: &[u64]) -> CryptoResult<String> {
        decrypt(values, &self.private)
    }

    /// Exponentiate with the private exponent (used for signing)
    pub(crate) fn apply_private(&self, value: u64) -> u64 {
        mod_pow(value, self.private.exponent, self.private.modulus)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// Encrypt each character of `text` under `key`
pub fn encrypt(text: &str, key: &PublicKey) -> CryptoResult<Vec<u64>> {
    if key.modulus < 2 {
        return Err(CryptoError::InvalidKey(format!(
            "modulus {} is too small",
            key.modulus
        )));
    }

    text.chars()
        .map(|c| {
            let ordinal = c as u64;
            if ordinal >= key.modulus {
                return Err(CryptoError::PlaintextOverflow {
                    ordinal,
                    modulus: key.modulus,
                });
            }
            Ok(mod_pow(ordinal, key.exponent, key.modulus))
        })
        .collect()
}

/// Decrypt a sequence of values back into text
pub fn decrypt(values: &[u64], key: &PrivateKey) -> CryptoResult<String> {
    values
        .iter()
        .map(|&value| {
            let out_of_range = CryptoError::DecryptionRange {
                value,
                modulus: key.modulus,
            };
            if value >= key.modulus {
                return Err(out_of_range);
            }
            let ordinal = mod_pow(value, key.exponent, key.modulus);
            u32::try_from(ordinal)
                .ok()
                .and_then(char::from_u32)
                .ok_or(out_of_range)
        })
        .collect()
}

/// How a peer obtains its message keys
#[derive(Clone, Default)]
pub enum CipherPolicy {
    /// The peer owns this keypair and its certificate binds the public half.
    /// Outbound text is encrypted under the remote certificate's key.
    CertificateKeyed(KeyPair),
    /// The certificate binds the DH public value with the DH modulus; both
    /// sides derive the same keypair from the shared secret.
    ///
    /// Some secrets yield primes whose totient shares a factor with 17 and
    /// fail with [`CryptoError::KeyDerivation`]. Over the default group
    /// `(23, 5)` these are the secrets 4 and 11, so a handshake on the
    /// defaults occasionally fails after the DH exchange. Groups such as
    /// `(61, 12)` avoid them entirely.
    #[default]
    SecretDerived,
}

impl CipherPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CertificateKeyed(_) => "certificate-keyed",
            Self::SecretDerived => "secret-derived",
        }
    }

    /// Key material to bind in this peer's certificate
    pub fn certificate_key(&self, dh_public: u64, dh_modulus: u64) -> PublicKey {
        match self {
            Self::CertificateKeyed(keys) => keys.public(),
            Self::SecretDerived => PublicKey::new(dh_public, dh_modulus),
        }
    }

    /// Build the keys for an established session
    pub fn message_keys(
        &self,
        remote_key: PublicKey,
        secret: &SharedSecret,
    ) -> CryptoResult<MessageKeys> {
        match self {
            Self::CertificateKeyed(keys) => Ok(MessageKeys {
                outbound: remote_key,
                inbound: keys.private().clone(),
            }),
            Self::SecretDerived => {
                let keys = KeyPair::from_shared_secret(secret)?;
                Ok(MessageKeys {
                    outbound: keys.public(),
                    inbound: keys.private().clone(),
                })
            }
        }
    }
}

impl fmt::Debug for CipherPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CertificateKeyed(keys) => f
                .debug_tuple("CertificateKeyed")
                .field(&keys.public())
                .finish(),
            Self::SecretDerived => f.write_str("SecretDerived"),
        }
    }
}

/// Keys of an established session
#[derive(Debug, Clone)]
pub struct MessageKeys {
    outbound: PublicKey,
    inbound: PrivateKey,
}

impl MessageKeys {
    pub fn outbound_key(&self) -> PublicKey {
        self.outbound
    }

    pub fn encrypt(&self, text: &str) -> CryptoResult<Vec<u64>> {
        encrypt(text, &self.outbound)
    }

    pub fn decrypt(&self, values: &[u64]) -> CryptoResult<String> {
        decrypt(values, &self.inbound)
    }
}
