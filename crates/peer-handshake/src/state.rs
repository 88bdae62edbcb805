//! Handshake state machine

use std::fmt;

use crypto_session::{KeyAgreement, SharedSecret};
use shared_protocol::Certificate;

use crate::ErrorKind;

/// Where a handshake stands, with the data each step carries forward.
///
/// `Start` is initial; `Established` and `Failed` are terminal.
#[derive(Debug)]
pub enum HandshakeState {
    Start,
    CertRequested {
        key_agreement: KeyAgreement,
        local_cert: Certificate,
    },
    CertsExchanged {
        key_agreement: KeyAgreement,
        remote_cert: Certificate,
    },
    PeerVerified {
        key_agreement: KeyAgreement,
        remote_cert: Certificate,
    },
    SecretDerived {
        secret: SharedSecret,
        remote_cert: Certificate,
    },
    Established,
    Failed {
        /// Last phase reached before the failure
        phase: HandshakePhase,
        kind: ErrorKind,
    },
}

impl HandshakeState {
    pub fn phase(&self) -> HandshakePhase {
        match self {
            Self::Start => HandshakePhase::Start,
            Self::CertRequested { .. } => HandshakePhase::CertRequested,
            Self::CertsExchanged { .. } => HandshakePhase::CertsExchanged,
            Self::PeerVerified { .. } => HandshakePhase::PeerVerified,
            Self::SecretDerived { .. } => HandshakePhase::SecretDerived,
            Self::Established => HandshakePhase::Established,
            Self::Failed { .. } => HandshakePhase::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Established | Self::Failed { .. })
    }

    /// Failure category, once failed
    pub fn failure(&self) -> Option<ErrorKind> {
        match self {
            Self::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Data-free tag of [`HandshakeState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakePhase {
    Start,
    CertRequested,
    CertsExchanged,
    PeerVerified,
    SecretDerived,
    Established,
    Failed,
}

impl fmt::Display for HandshakePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "START",
            Self::CertRequested => "CERT_REQUESTED",
            Self::CertsExchanged => "CERTS_EXCHANGED",
            Self::PeerVerified => "PEER_VERIFIED",
            Self::SecretDerived => "SECRET_DERIVED",
            Self::Established => "ESTABLISHED",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}
