//! Peer configuration

use crypto_session::{CipherPolicy, DhParams};
use net_transport::IoTimeouts;
use shared_protocol::NetworkConfig;

use crate::{HandshakeError, HandshakeResult};

/// Everything a peer needs to run handshakes
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Identity requested from the CA
    pub name: String,
    pub dh_params: DhParams,
    pub cipher_policy: CipherPolicy,
    pub ca_addr: String,
    pub timeouts: IoTimeouts,
}

impl PeerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dh_params: DhParams::default(),
            cipher_policy: CipherPolicy::default(),
            ca_addr: NetworkConfig::default().ca_addr(),
            timeouts: IoTimeouts::default(),
        }
    }

    pub fn with_dh_params(mut self, dh_params: DhParams) -> Self {
        self.dh_params = dh_params;
        self
    }

    pub fn with_cipher_policy(mut self, cipher_policy: CipherPolicy) -> Self {
        self.cipher_policy = cipher_policy;
        self
    }

    pub fn with_ca_addr(mut self, ca_addr: impl Into<String>) -> Self {
        self.ca_addr = ca_addr.into();
        self
    }

    pub fn with_timeouts(mut self, timeouts: IoTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn validate(&self) -> HandshakeResult<()> {
        if self.name.trim().is_empty() {
            return Err(HandshakeError::InvalidConfig(
                "peer name must not be empty".to_string(),
            ));
        }
        if self.ca_addr.trim().is_empty() {
            return Err(HandshakeError::InvalidConfig(
                "CA address must not be empty".to_string(),
            ));
        }
        self.dh_params.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_defaults() {
        let config = PeerConfig::new("Alice");
        assert_eq!(config.ca_addr, "localhost:4999");
        assert_eq!(config.dh_params, DhParams::default());
        assert_eq!(config.cipher_policy.name(), "secret-derived");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let err = PeerConfig::new(" ").validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let bad_params = DhParams {
            modulus: 24,
            generator: 5,
        };
        let err = PeerConfig::new("Bob")
            .with_dh_params(bad_params)
            .validate()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
