//! CA request/response shapes and peer-to-peer handshake messages

use serde::{Deserialize, Serialize};

use crate::{Certificate, ProtocolError, ProtocolResult, PublicKey};

/// Request sent to the certificate authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CaRequest {
    /// Issue (or re-issue) a certificate for `subject`
    Issue {
        subject: String,
        public_key: PublicKey,
    },
    /// Check expiry and signature of a certificate
    Verify { certificate: Certificate },
    /// Any request type the CA does not know
    #[serde(other)]
    Unknown,
}

impl CaRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Issue { .. } => "issue",
            Self::Verify { .. } => "verify",
            Self::Unknown => "unknown",
        }
    }
}

/// Response from the certificate authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaResponse {
    Success(CaOutcome),
    Error { message: String },
}

/// Payload of a successful CA response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CaOutcome {
    Issued { certificate: Certificate },
    Verified { valid: bool },
}

impl CaResponse {
    pub fn issued(certificate: Certificate) -> Self {
        Self::Success(CaOutcome::Issued { certificate })
    }

    pub fn verified(valid: bool) -> Self {
        Self::Success(CaOutcome::Verified { valid })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Message exchanged between two peers during and after the handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerMessage {
    /// The sender's CA-issued certificate
    Certificate { certificate: Certificate },
    /// Raw DH public value as a decimal string
    DhPublic { value: String },
    /// Encrypted text, one value per plaintext character
    Ciphertext { values: Vec<u64> },
}

impl PeerMessage {
    pub fn dh_public(value: u64) -> Self {
        Self::DhPublic {
            value: value.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Certificate { .. } => "certificate",
            Self::DhPublic { .. } => "dh_public",
            Self::Ciphertext { .. } => "ciphertext",
        }
    }

    pub fn into_certificate(self) -> ProtocolResult<Certificate> {
        match self {
            Self::Certificate { certificate } => Ok(certificate),
            other => Err(ProtocolError::UnexpectedMessage {
                expected: "certificate",
                actual: other.kind(),
            }),
        }
    }

    /// Parse the decimal DH public value
    pub fn into_dh_public(self) -> ProtocolResult<u64> {
        match self {
            Self::DhPublic { value } => {
                let trimmed = value.trim();
                if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(ProtocolError::InvalidDhValue(value));
                }
                trimmed
                    .parse()
                    .map_err(|_| ProtocolError::InvalidDhValue(value.clone()))
            }
            other => Err(ProtocolError::UnexpectedMessage {
                expected: "dh_public",
                actual: other.kind(),
            }),
        }
    }

    pub fn into_ciphertext(self) -> ProtocolResult<Vec<u64>> {
        match self {
            Self::Ciphertext { values } => Ok(values),
            other => Err(ProtocolError::UnexpectedMessage {
                expected: "ciphertext",
                actual: other.kind(),
            }),
        }
    }
}
