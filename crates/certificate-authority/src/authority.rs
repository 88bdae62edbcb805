//! Certificate issuance and verification

use chrono::{DateTime, Duration, Utc};
use crypto_session::SignatureScheme;
use shared_protocol::{
    CA_ISSUER, CERTIFICATE_VALIDITY_DAYS, CaRequest, CaResponse, Certificate, CertificateBody,
    PublicKey,
};
use tracing::{debug, info, warn};

use crate::CertificateStore;

/// Signs certificates and checks the ones presented back to it
#[derive(Debug)]
pub struct CertificateAuthority {
    scheme: SignatureScheme,
    store: CertificateStore,
    issuer: String,
    validity: Duration,
}

impl CertificateAuthority {
    pub fn new(scheme: SignatureScheme, store: CertificateStore) -> Self {
        Self {
            scheme,
            store,
            issuer: CA_ISSUER.to_string(),
            validity: Duration::days(CERTIFICATE_VALIDITY_DAYS),
        }
    }

    /// Override the validity window of newly issued certificates
    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    pub fn verifying_key(&self) -> PublicKey {
        self.scheme.verifying_key()
    }

    pub fn issued(&self) -> &CertificateStore {
        &self.store
    }

    pub fn issue_certificate(&self, subject: &str, public_key: PublicKey) -> Certificate {
        self.issue_certificate_at(subject, public_key, Utc::now())
    }

    /// Issue a certificate valid from `now`, replacing any earlier one for
    /// the same subject
    pub fn issue_certificate_at(
        &self,
        subject: &str,
        public_key: PublicKey,
        now: DateTime<Utc>,
    ) -> Certificate {
        let body = CertificateBody::new(subject, public_key, &self.issuer, now, self.validity);
        let signature = self.scheme.sign(&body.canonical_encoding());
        let certificate = Certificate::signed(body, signature);

        if self.store.insert(certificate.clone()).is_some() {
            debug!(subject, "Replaced previously issued certificate");
        }
        info!(
            subject,
            key = %public_key,
            valid_until = %certificate.valid_until(),
            "Issued certificate"
        );
        certificate
    }

    pub fn verify_certificate(&self, certificate: &Certificate) -> bool {
        self.verify_certificate_at(certificate, Utc::now())
    }

    /// Expired or unsigned certificates are invalid; otherwise the signature
    /// decides
    pub fn verify_certificate_at(&self, certificate: &Certificate, now: DateTime<Utc>) -> bool {
        let subject = certificate.subject();

        if certificate.is_expired_at(now) {
            info!(subject, valid_until = %certificate.valid_until(), "Certificate expired");
            return false;
        }
        let Some(signature) = certificate.signature() else {
            warn!(subject, "Certificate carries no signature");
            return false;
        };

        let valid = self
            .scheme
            .verify(&certificate.canonical_encoding(), signature);
        if valid {
            debug!(subject, "Certificate signature valid");
        } else {
            warn!(subject, "Certificate signature invalid");
        }
        valid
    }

    /// Answer one decoded request
    pub fn handle_request(&self, request: CaRequest) -> CaResponse {
        match request {
            CaRequest::Issue {
                subject,
                public_key,
            } => {
                if subject.trim().is_empty() {
                    return CaResponse::error("Subject must not be empty");
                }
                CaResponse::issued(self.issue_certificate(&subject, public_key))
            }
            CaRequest::Verify { certificate } => {
                CaResponse::verified(self.verify_certificate(&certificate))
            }
            CaRequest::Unknown => CaResponse::error("Unknown request type"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto_session::KeyPair;
    use shared_protocol::CaOutcome;

    fn authority() -> CertificateAuthority {
        let keys = KeyPair::from_primes(2_147_483_647, 4_294_967_291, 65_537).unwrap();
        CertificateAuthority::new(SignatureScheme::new(keys), CertificateStore::new())
    }

    fn now() -> DateTime<Utc> {
        "2026-03-01T12:00:00.123456Z".parse().unwrap()
    }

    #[test]
    fn test_issue_fields() {
        let ca = authority();
        let cert = ca.issue_certificate_at("Alice", PublicKey::new(8, 23), now());

        assert_eq!(cert.subject(), "Alice");
        assert_eq!(cert.issuer(), "TrustedCA");
        assert_eq!(cert.public_key(), PublicKey::new(8, 23));
        assert_eq!(cert.valid_from(), now());
        assert_eq!(cert.valid_until() - cert.valid_from(), Duration::days(365));
        assert!(cert.is_signed());
        assert_eq!(ca.issued().get("Alice"), Some(cert));
    }

    #[test]
    fn test_reissue_overwrites() {
        let ca = authority();
        ca.issue_certificate_at("Alice", PublicKey::new(8, 23), now());
        let second = ca.issue_certificate_at("Alice", PublicKey::new(19, 23), now());

        assert_eq!(ca.issued().len(), 1);
        assert_eq!(ca.issued().get("Alice"), Some(second));
        assert_eq!(ca.issued().subjects(), vec!["Alice".to_string()]);
    }

    #[test]
    fn test_verify_and_expiry() {
        let ca = authority();
        let cert = ca.issue_certificate_at("Bob", PublicKey::new(17, 4757), now());

        assert!(ca.verify_certificate_at(&cert, now()));
        assert!(ca.verify_certificate_at(&cert, cert.valid_until()));
        assert!(!ca.verify_certificate_at(&cert, cert.valid_until() + Duration::microseconds(1)));
    }

    #[test]
    fn test_tampered_fields_fail() {
        let ca = authority();
        let cert = ca.issue_certificate_at("Alice", PublicKey::new(8, 23), now());
        let (body, signature) = cert.into_parts();
        let signature = signature.unwrap();

        let mut tampered = Vec::new();
        let mut b = body.clone();
        b.subject = "Mallory".to_string();
        tampered.push(b);
        let mut b = body.clone();
        b.public_key = PublicKey::new(9, 23);
        tampered.push(b);
        let mut b = body.clone();
        b.issuer = "RogueCA".to_string();
        tampered.push(b);
        let mut b = body.clone();
        b.valid_until += Duration::days(1);
        tampered.push(b);

        for body in tampered {
            let forged = Certificate::signed(body, signature.clone());
            assert!(!ca.verify_certificate_at(&forged, now()), "{forged:?}");
        }
        assert!(ca.verify_certificate_at(&Certificate::signed(body, signature), now()));
    }

    #[test]
    fn test_unsigned_certificate_fails() {
        let ca = authority();
        let body = CertificateBody::new(
            "Alice",
            PublicKey::new(8, 23),
            CA_ISSUER,
            now(),
            Duration::days(1),
        );
        assert!(!ca.verify_certificate_at(&Certificate::unsigned(body), now()));
    }

    #[test]
    fn test_rogue_authority_signature_fails() {
        let ca = authority();
        let rogue_keys = KeyPair::from_primes(4_294_967_291, 2_147_483_629, 65_537).unwrap();
        let rogue =
            CertificateAuthority::new(SignatureScheme::new(rogue_keys), CertificateStore::new());

        let forged = rogue.issue_certificate_at("Alice", PublicKey::new(8, 23), now());
        assert!(!ca.verify_certificate_at(&forged, now()));
        assert!(ca.issued().is_empty());
    }

    #[test]
    fn test_demo_authority_round_trip() {
        let ca = CertificateAuthority::new(SignatureScheme::demo(), CertificateStore::new());
        let cert = ca.issue_certificate("Alice", PublicKey::new(6, 77));
        assert!(ca.verify_certificate(&cert));
        assert_eq!(ca.verifying_key(), PublicKey::new(17, 77));
    }

    #[test]
    fn test_handle_request() {
        let ca = authority();

        let issued = ca.handle_request(CaRequest::Issue {
            subject: "Alice".to_string(),
            public_key: PublicKey::new(8, 23),
        });
        let CaResponse::Success(CaOutcome::Issued { certificate }) = issued else {
            panic!("unexpected response {issued:?}");
        };

        assert_eq!(
            ca.handle_request(CaRequest::Verify { certificate }),
            CaResponse::verified(true)
        );
        assert_eq!(
            ca.handle_request(CaRequest::Unknown),
            CaResponse::error("Unknown request type")
        );
        assert!(matches!(
            ca.handle_request(CaRequest::Issue {
                subject: " ".to_string(),
                public_key: PublicKey::new(8, 23),
            }),
            CaResponse::Error { .. }
        ));
    }
}
