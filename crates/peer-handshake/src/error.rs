//! Handshake error types

use std::fmt;
use std::time::Duration;

use certificate_authority::CaClientError;
use crypto_session::CryptoError;
use net_transport::TransportError;
use shared_protocol::ProtocolError;
use thiserror::Error;

use crate::HandshakePhase;

/// Broad category of a handshake failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Network failure talking to the CA or the peer
    Transport,
    /// A payload did not decode into the expected shape
    ProtocolDecoding,
    /// The peer could not be authenticated
    Trust,
    /// A value fell outside the range an operation accepts
    CryptoRange,
    Timeout,
    /// Message keys could not be derived from the shared secret
    KeyDerivation,
    /// Local setup is unusable
    Configuration,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transport => "transport",
            Self::ProtocolDecoding => "protocol-decoding",
            Self::Trust => "trust",
            Self::CryptoRange => "crypto-range",
            Self::Timeout => "timeout",
            Self::KeyDerivation => "key-derivation",
            Self::Configuration => "configuration",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("Failed to obtain a certificate: {0}")]
    CertificateAcquisition(#[source] CaClientError),

    #[error("Peer unreachable: {0}")]
    PeerUnreachable(#[source] TransportError),

    #[error("Malformed certificate from peer: {0}")]
    MalformedCertificate(String),

    #[error("Certificate for {subject} was not vouched for by the CA")]
    UntrustedPeer { subject: String },

    #[error("Expected peer {expected}, certificate names {actual}")]
    IdentityMismatch { expected: String, actual: String },

    #[error("CA unreachable during verification: {0}")]
    VerifierUnreachable(#[source] CaClientError),

    #[error("Peer certificate uses DH modulus {actual}, expected {expected}")]
    DomainParameterMismatch { expected: u64, actual: u64 },

    #[error("Peer sent DH value {received} but its certificate binds {certified}")]
    KeyBindingMismatch { certified: u64, received: u64 },

    #[error("Timed out in phase {phase} after {after:?}")]
    Timeout {
        phase: HandshakePhase,
        after: Duration,
    },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Transport error: {0}")]
    Transport(#[source] TransportError),

    #[error("Handshake cannot run from phase {0}")]
    NotRunnable(HandshakePhase),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl HandshakeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CertificateAcquisition(CaClientError::UnexpectedResponse(_)) => {
                ErrorKind::ProtocolDecoding
            }
            Self::CertificateAcquisition(CaClientError::Rejected(_)) => ErrorKind::Configuration,
            Self::CertificateAcquisition(_) | Self::PeerUnreachable(_) | Self::Transport(_) => {
                ErrorKind::Transport
            }
            Self::MalformedCertificate(_) | Self::Protocol(_) => ErrorKind::ProtocolDecoding,
            Self::UntrustedPeer { .. }
            | Self::IdentityMismatch { .. }
            | Self::VerifierUnreachable(_)
            | Self::DomainParameterMismatch { .. }
            | Self::KeyBindingMismatch { .. } => ErrorKind::Trust,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Crypto(CryptoError::KeyDerivation(_)) => ErrorKind::KeyDerivation,
            Self::Crypto(CryptoError::InvalidParameter(_)) => ErrorKind::Configuration,
            Self::Crypto(_) => ErrorKind::CryptoRange,
            Self::NotRunnable(_) | Self::InvalidConfig(_) => ErrorKind::Configuration,
        }
    }

    /// The remote side hung up
    pub fn is_connection_closed(&self) -> bool {
        matches!(
            self,
            Self::PeerUnreachable(TransportError::ConnectionClosed)
                | Self::Transport(TransportError::ConnectionClosed)
        )
    }
}

/// Errors after establishment. Decoding failures stay protocol errors and
/// timeouts are attributed to the established channel.
impl From<TransportError> for HandshakeError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Protocol(e) => Self::Protocol(e),
            TransportError::Timeout(after) => Self::Timeout {
                phase: HandshakePhase::Established,
                after,
            },
            other => Self::Transport(other),
        }
    }
}

pub type HandshakeResult<T> = Result<T, HandshakeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let cases = [
            (
                HandshakeError::CertificateAcquisition(CaClientError::Rejected("no".into())),
                ErrorKind::Configuration,
            ),
            (
                HandshakeError::PeerUnreachable(TransportError::ConnectionClosed),
                ErrorKind::Transport,
            ),
            (
                HandshakeError::MalformedCertificate("bad".into()),
                ErrorKind::ProtocolDecoding,
            ),
            (
                HandshakeError::IdentityMismatch {
                    expected: "Alice".into(),
                    actual: "Mallory".into(),
                },
                ErrorKind::Trust,
            ),
            (
                HandshakeError::Crypto(CryptoError::KeyDerivation("p == q".into())),
                ErrorKind::KeyDerivation,
            ),
            (
                HandshakeError::Crypto(CryptoError::InvalidPeerValue { value: 0, max: 22 }),
                ErrorKind::CryptoRange,
            ),
        ];
        for (err, kind) in cases {
            assert_eq!(err.kind(), kind, "{err}");
        }
    }

    #[test]
    fn test_from_transport() {
        let err = HandshakeError::from(TransportError::Timeout(Duration::from_secs(1)));
        assert_eq!(err.kind(), ErrorKind::Timeout);

        let err = HandshakeError::from(TransportError::ConnectionClosed);
        assert!(err.is_connection_closed());

        let err = HandshakeError::from(TransportError::Protocol(ProtocolError::InvalidDhValue(
            "x".into(),
        )));
        assert_eq!(err.kind(), ErrorKind::ProtocolDecoding);
    }
}
