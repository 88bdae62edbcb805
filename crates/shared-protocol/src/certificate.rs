//! Certificate entity and its canonical encoding

use std::fmt;

use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::{ProtocolError, ProtocolResult};

/// Public key material bound by a certificate, `(exponent, modulus)`.
///
/// Under the secret-derived cipher policy this is a DH public value paired
/// with the DH modulus; under the certificate-keyed policy it is an
/// RSA-style public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(u64, u64)", into = "(u64, u64)")]
pub struct PublicKey {
    pub exponent: u64,
    pub modulus: u64,
}

impl PublicKey {
    pub fn new(exponent: u64, modulus: u64) -> Self {
        Self { exponent, modulus }
    }
}

impl From<(u64, u64)> for PublicKey {
    fn from((exponent, modulus): (u64, u64)) -> Self {
        Self { exponent, modulus }
    }
}

impl From<PublicKey> for (u64, u64) {
    fn from(key: PublicKey) -> Self {
        (key.exponent, key.modulus)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.exponent, self.modulus)
    }
}

/// Render a timestamp the way it appears on the wire and in signed data
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 timestamp, or a naive ISO-8601 one interpreted as UTC
pub fn parse_timestamp(raw: &str) -> ProtocolResult<DateTime<Utc>> {
    let parsed = match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(_) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|e| {
                ProtocolError::MalformedCertificate(format!("invalid timestamp {raw:?}: {e}"))
            })?,
    };
    // Canonical encoding carries microseconds only
    Ok(parsed.trunc_subsecs(6))
}

/// Every certificate field covered by the CA signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateBody {
    pub subject: String,
    pub public_key: PublicKey,
    pub issuer: String,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

impl CertificateBody {
    /// Build a body valid from `issued_at` for `validity`.
    ///
    /// Timestamps are truncated to microseconds so the body survives a trip
    /// through the wire encoding unchanged.
    pub fn new(
        subject: impl Into<String>,
        public_key: PublicKey,
        issuer: impl Into<String>,
        issued_at: DateTime<Utc>,
        validity: Duration,
    ) -> Self {
        let valid_from = issued_at.trunc_subsecs(6);
        Self {
            subject: subject.into(),
            public_key,
            issuer: issuer.into(),
            valid_from,
            valid_until: valid_from + validity,
        }
    }

    /// Deterministic encoding of the signed fields.
    ///
    /// Compact JSON with keys in lexicographic order; the signature is never
    /// part of it.
    pub fn canonical_encoding(&self) -> String {
        serde_json::json!({
            "issuer": self.issuer,
            "public_key": [self.public_key.exponent, self.public_key.modulus],
            "subject": self.subject,
            "valid_from": format_timestamp(&self.valid_from),
            "valid_until": format_timestamp(&self.valid_until),
        })
        .to_string()
    }
}

/// Signed binding of a subject identity to a public key.
///
/// There are no setters: a certificate is built once, either unsigned or
/// signed, and travels verbatim afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CertificateDict", into = "CertificateDict")]
pub struct Certificate {
    body: CertificateBody,
    signature: Option<String>,
}

impl Certificate {
    pub fn unsigned(body: CertificateBody) -> Self {
        Self {
            body,
            signature: None,
        }
    }

    pub fn signed(body: CertificateBody, signature: String) -> Self {
        Self {
            body,
            signature: Some(signature),
        }
    }

    pub fn body(&self) -> &CertificateBody {
        &self.body
    }

    pub fn subject(&self) -> &str {
        &self.body.subject
    }

    pub fn public_key(&self) -> PublicKey {
        self.body.public_key
    }

    pub fn issuer(&self) -> &str {
        &self.body.issuer
    }

    pub fn valid_from(&self) -> DateTime<Utc> {
        self.body.valid_from
    }

    pub fn valid_until(&self) -> DateTime<Utc> {
        self.body.valid_until
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// True once `now` is past the end of the validity window
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.body.valid_until
    }

    pub fn canonical_encoding(&self) -> String {
        self.body.canonical_encoding()
    }

    pub fn into_parts(self) -> (CertificateBody, Option<String>) {
        (self.body, self.signature)
    }

    pub fn to_dict(&self) -> CertificateDict {
        CertificateDict::from(self.clone())
    }
}

/// Wire shape of a certificate.
///
/// Decoding is strict: unknown fields, negative or oversized key components
/// and unparseable timestamps are all rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CertificateDict {
    pub subject: String,
    pub public_key: PublicKey,
    pub issuer: String,
    pub valid_from: String,
    pub valid_until: String,
    pub signature: Option<String>,
}

impl From<Certificate> for CertificateDict {
    fn from(cert: Certificate) -> Self {
        let (body, signature) = cert.into_parts();
        Self {
            valid_from: format_timestamp(&body.valid_from),
            valid_until: format_timestamp(&body.valid_until),
            subject: body.subject,
            public_key: body.public_key,
            issuer: body.issuer,
            signature,
        }
    }
}

impl TryFrom<CertificateDict> for Certificate {
    type Error = ProtocolError;

    fn try_from(dict: CertificateDict) -> Result<Self, Self::Error> {
        if dict.subject.is_empty() {
            return Err(ProtocolError::MalformedCertificate(
                "subject must not be empty".to_string(),
            ));
        }

        let valid_from = parse_timestamp(&dict.valid_from)?;
        let valid_until = parse_timestamp(&dict.valid_until)?;
        if valid_from > valid_until {
            return Err(ProtocolError::MalformedCertificate(format!(
                "validity window is inverted: {} > {}",
                dict.valid_from, dict.valid_until
            )));
        }

        Ok(Self {
            body: CertificateBody {
                subject: dict.subject,
                public_key: dict.public_key,
                issuer: dict.issuer,
                valid_from,
                valid_until,
            },
            signature: dict.signature,
        })
    }
}
