//! Finite-field Diffie-Hellman key agreement

use std::fmt;

use rand::rngs::OsRng;
use rand::{CryptoRng, Rng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::arith::{is_prime, mod_pow};
use crate::{CryptoError, CryptoResult, DEFAULT_DH_GENERATOR, DEFAULT_DH_MODULUS};

/// Public domain parameters `(p, g)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DhParams {
    pub modulus: u64,
    pub generator: u64,
}

impl DhParams {
    /// Create validated parameters
    pub fn new(modulus: u64, generator: u64) -> CryptoResult<Self> {
        let params = Self { modulus, generator };
        params.validate()?;
        Ok(params)
    }

    /// `p` must be an odd prime >= 5 and `g` must lie in `[2, p-2]`
    pub fn validate(&self) -> CryptoResult<()> {
        let p = self.modulus;
        if p < 5 || p % 2 == 0 {
            return Err(CryptoError::InvalidParameter(format!(
                "modulus {p} is not an odd integer >= 5"
            )));
        }
        if !is_prime(p) {
            return Err(CryptoError::InvalidParameter(format!(
                "modulus {p} is not prime"
            )));
        }
        if !(2..=p - 2).contains(&self.generator) {
            return Err(CryptoError::InvalidParameter(format!(
                "generator {} is outside [2, {}]",
                self.generator,
                p - 2
            )));
        }
        Ok(())
    }
}

impl Default for DhParams {
    fn default() -> Self {
        Self {
            modulus: DEFAULT_DH_MODULUS,
            generator: DEFAULT_DH_GENERATOR,
        }
    }
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct PrivateExponent(u64);

/// Ephemeral DH keypair.
///
/// Consumed by [`KeyAgreement::derive_secret`], so a keypair yields exactly
/// one shared secret.
pub struct KeyAgreement {
    params: DhParams,
    private: PrivateExponent,
    public: u64,
}

impl KeyAgreement {
    /// Generate a keypair from the OS random source
    pub fn generate(params: DhParams) -> CryptoResult<Self> {
        Self::generate_with_rng(params, &mut OsRng)
    }

    /// Generate a keypair with a caller-supplied RNG
    pub fn generate_with_rng<R: RngCore + CryptoRng>(
        params: DhParams,
        rng: &mut R,
    ) -> CryptoResult<Self> {
        params.validate()?;
        let private = rng.gen_range(2..=params.modulus - 2);
        Ok(Self::with_private(params, private))
    }

    /// Import a fixed private exponent, which must lie in `[2, p-2]`
    pub fn from_private(params: DhParams, private: u64) -> CryptoResult<Self> {
        params.validate()?;
        if !(2..=params.modulus - 2).contains(&private) {
            return Err(CryptoError::InvalidParameter(format!(
                "private exponent is outside [2, {}]",
                params.modulus - 2
            )));
        }
        Ok(Self::with_private(params, private))
    }

    fn with_private(params: DhParams, private: u64) -> Self {
        let public = mod_pow(params.generator, private, params.modulus);
        Self {
            params,
            private: PrivateExponent(private),
            public,
        }
    }

    pub fn params(&self) -> DhParams {
        self.params
    }

    /// `g^private mod p`
    pub fn public_value(&self) -> u64 {
        self.public
    }

    /// Compute `peer_public^private mod p`
    pub fn derive_secret(self, peer_public: u64) -> CryptoResult<SharedSecret> {
        let p = self.params.modulus;
        if !(1..p).contains(&peer_public) {
            return Err(CryptoError::InvalidPeerValue {
                value: peer_public,
                max: p - 1,
            });
        }
        Ok(SharedSecret(mod_pow(peer_public, self.private.0, p)))
    }
}

impl fmt::Debug for KeyAgreement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyAgreement")
            .field("params", &self.params)
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// Result of a DH exchange, in `[0, p-1]`
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret(pub(crate) u64);

impl SharedSecret {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commutativity() {
        for (p, g) in [(23, 5), (61, 12), (2_147_483_647, 7)] {
            let params = DhParams::new(p, g).unwrap();
            for _ in 0..20 {
                let alice = KeyAgreement::generate(params).unwrap();
                let bob = KeyAgreement::generate(params).unwrap();

                let alice_public = alice.public_value();
                let bob_public = bob.public_value();

                let alice_secret = alice.derive_secret(bob_public).unwrap();
                let bob_secret = bob.derive_secret(alice_public).unwrap();
                assert_eq!(alice_secret.value(), bob_secret.value());
                assert!(alice_secret.value() < p);
            }
        }
    }

    #[test]
    fn test_fixed_exponents() {
        let params = DhParams::default();
        let alice = KeyAgreement::from_private(params, 6).unwrap();
        let bob = KeyAgreement::from_private(params, 15).unwrap();
        assert_eq!(alice.public_value(), 8);
        assert_eq!(bob.public_value(), 19);

        let secret = alice.derive_secret(19).unwrap();
        assert_eq!(secret.value(), 2);
    }

    #[test]
    fn test_private_exponent_range() {
        let params = DhParams::default();
        for _ in 0..200 {
            let pair = KeyAgreement::generate(params).unwrap();
            assert!((1..23).contains(&pair.public_value()));
        }
        assert!(KeyAgreement::from_private(params, 1).is_err());
        assert!(KeyAgreement::from_private(params, 22).is_err());
        assert!(KeyAgreement::from_private(params, 21).is_ok());
    }

    #[test]
    fn test_invalid_parameters() {
        for (p, g) in [(4, 2), (3, 2), (21, 5), (25, 5), (23, 1), (23, 22), (23, 0)] {
            assert!(
                matches!(DhParams::new(p, g), Err(CryptoError::InvalidParameter(_))),
                "accepted p={p} g={g}"
            );
        }
        assert!(DhParams::new(5, 2).is_ok());
    }

    #[test]
    fn test_invalid_peer_value() {
        let params = DhParams::default();
        for value in [0, 23, 100] {
            let pair = KeyAgreement::generate(params).unwrap();
            assert!(matches!(
                pair.derive_secret(value),
                Err(CryptoError::InvalidPeerValue { max: 22, .. })
            ));
        }
    }

    #[test]
    fn test_debug_redacts_private_exponent() {
        let pair = KeyAgreement::from_private(DhParams::default(), 6).unwrap();
        let rendered = format!("{pair:?}");
        assert!(!rendered.contains("private"));
        assert_eq!(format!("{:?}", pair.derive_secret(19).unwrap()), "SharedSecret(..)");
    }
}
