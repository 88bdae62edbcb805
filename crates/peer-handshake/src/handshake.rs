//! Handshake driver

use certificate_authority::{CaClient, CaClientError};
use crypto_session::{CipherPolicy, KeyAgreement};
use net_transport::{FramedConnection, TransportError};
use shared_protocol::{Certificate, PeerMessage};
use tokio::net::TcpListener;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::{
    HandshakeError, HandshakePhase, HandshakeResult, HandshakeState, PeerConfig, Responder,
    SecureChannel,
};

/// Which side of the exchange this peer plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Dials the remote peer and sends first
    Initiator,
    /// Accepts the connection and answers
    Responder,
}

enum Link {
    /// Address still to be dialed
    Pending(String),
    Connected(FramedConnection),
    Closed,
}

/// One handshake attempt against one remote peer
pub struct Handshake {
    id: Uuid,
    role: Role,
    config: PeerConfig,
    expected_peer: String,
    ca: CaClient,
    state: HandshakeState,
    /// Last phase entered; reported when a step fails
    reached: HandshakePhase,
    link: Link,
}

impl Handshake {
    /// Handshake that dials `peer_addr` and expects its certificate to name
    /// `expected_peer`
    pub fn initiator(
        config: PeerConfig,
        peer_addr: impl Into<String>,
        expected_peer: impl Into<String>,
    ) -> Self {
        Self::with_link(config, Role::Initiator, Link::Pending(peer_addr.into()), expected_peer)
    }

    /// Handshake over an already accepted connection
    pub fn responder(
        config: PeerConfig,
        conn: FramedConnection,
        expected_peer: impl Into<String>,
    ) -> Self {
        Self::with_link(config, Role::Responder, Link::Connected(conn), expected_peer)
    }

    fn with_link(
        config: PeerConfig,
        role: Role,
        link: Link,
        expected_peer: impl Into<String>,
    ) -> Self {
        let ca = CaClient::new(config.ca_addr.clone(), config.timeouts);
        Self {
            id: Uuid::new_v4(),
            role,
            config,
            expected_peer: expected_peer.into(),
            ca,
            state: HandshakeState::Start,
            reached: HandshakePhase::Start,
            link,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    pub fn phase(&self) -> HandshakePhase {
        self.state.phase()
    }

    /// Whether a connection to the remote peer is currently open
    pub fn is_connected(&self) -> bool {
        matches!(self.link, Link::Connected(_))
    }

    /// Drive the handshake from `Start` to `Established`.
    ///
    /// On error the state becomes `Failed` and the connection is dropped.
    pub async fn run(&mut self) -> HandshakeResult<SecureChannel> {
        if !matches!(self.state, HandshakeState::Start) {
            return Err(HandshakeError::NotRunnable(self.phase()));
        }

        let span = info_span!(
            "handshake",
            id = %self.id,
            local = %self.config.name,
            expected = %self.expected_peer,
            role = ?self.role,
        );

        let result = self.drive().instrument(span.clone()).await;
        if let Err(err) = &result {
            let phase = self.reached;
            span.in_scope(|| {
                warn!(%phase, kind = %err.kind(), "Handshake failed: {}", err);
            });
            self.link = Link::Closed;
            self.state = HandshakeState::Failed {
                phase,
                kind: err.kind(),
            };
        }
        result
    }

    async fn drive(&mut self) -> HandshakeResult<SecureChannel> {
        self.config.validate()?;

        self.request_certificate().await?;
        self.exchange_certificates().await?;
        self.verify_peer().await?;
        self.exchange_dh_values().await?;
        self.establish()
    }

    fn transition(&mut self, next: HandshakeState) {
        let phase = next.phase();
        info!(from = %self.reached, to = %phase, "Handshake advanced");
        self.reached = phase;
        self.state = next;
    }

    fn take_state(&mut self) -> HandshakeState {
        std::mem::replace(&mut self.state, HandshakeState::Start)
    }

    /// START -> CERT_REQUESTED
    async fn request_certificate(&mut self) -> HandshakeResult<()> {
        let key_agreement = KeyAgreement::generate(self.config.dh_params)?;
        let cert_key = self
            .config
            .cipher_policy
            .certificate_key(key_agreement.public_value(), self.config.dh_params.modulus);

        debug!(key = %cert_key, "Requesting certificate");
        let local_cert = self
            .ca
            .issue(&self.config.name, cert_key)
            .await
            .map_err(|e| self.ca_failure(e, HandshakeError::CertificateAcquisition))?;

        self.transition(HandshakeState::CertRequested {
            key_agreement,
            local_cert,
        });
        Ok(())
    }

    /// CERT_REQUESTED -> CERTS_EXCHANGED
    async fn exchange_certificates(&mut self) -> HandshakeResult<()> {
        if let Link::Pending(addr) = &self.link {
            let addr = addr.clone();
            debug!(%addr, "Connecting to peer");
            let conn = FramedConnection::connect(&addr, self.config.timeouts)
                .await
                .map_err(|e| self.peer_failure(e))?;
            self.link = Link::Connected(conn);
        }

        let HandshakeState::CertRequested {
            key_agreement,
            local_cert,
        } = self.take_state()
        else {
            return Err(HandshakeError::NotRunnable(self.reached));
        };

        let outgoing = PeerMessage::Certificate {
            certificate: local_cert,
        };
        let incoming = match self.role {
            Role::Initiator => {
                self.send(&outgoing).await?;
                self.recv().await
            }
            Role::Responder => {
                let incoming = self.recv().await;
                if incoming.is_ok() {
                    self.send(&outgoing).await?;
                }
                incoming
            }
        };

        let remote_cert = incoming
            .and_then(|message| message.into_certificate().map_err(HandshakeError::from))
            .map_err(|e| match e {
                HandshakeError::Protocol(e) => HandshakeError::MalformedCertificate(e.to_string()),
                other => other,
            })?;
        debug!(subject = remote_cert.subject(), "Received peer certificate");

        self.transition(HandshakeState::CertsExchanged {
            key_agreement,
            remote_cert,
        });
        Ok(())
    }

    /// CERTS_EXCHANGED -> PEER_VERIFIED
    async fn verify_peer(&mut self) -> HandshakeResult<()> {
        let HandshakeState::CertsExchanged {
            key_agreement,
            remote_cert,
        } = self.take_state()
        else {
            return Err(HandshakeError::NotRunnable(self.reached));
        };

        if remote_cert.subject() != self.expected_peer {
            return Err(HandshakeError::IdentityMismatch {
                expected: self.expected_peer.clone(),
                actual: remote_cert.subject().to_string(),
            });
        }

        let valid = self
            .ca
            .verify(&remote_cert)
            .await
            .map_err(|e| self.ca_failure(e, HandshakeError::VerifierUnreachable))?;
        if !valid {
            return Err(HandshakeError::UntrustedPeer {
                subject: remote_cert.subject().to_string(),
            });
        }
        info!(subject = remote_cert.subject(), "Peer certificate verified");

        self.transition(HandshakeState::PeerVerified {
            key_agreement,
            remote_cert,
        });
        Ok(())
    }

    /// PEER_VERIFIED -> SECRET_DERIVED
    async fn exchange_dh_values(&mut self) -> HandshakeResult<()> {
        let HandshakeState::PeerVerified {
            key_agreement,
            remote_cert,
        } = self.take_state()
        else {
            return Err(HandshakeError::NotRunnable(self.reached));
        };

        let outgoing = PeerMessage::dh_public(key_agreement.public_value());
        let incoming = match self.role {
            Role::Initiator => {
                self.send(&outgoing).await?;
                self.recv().await?
            }
            Role::Responder => {
                let incoming = self.recv().await?;
                self.send(&outgoing).await?;
                incoming
            }
        };
        let peer_public = incoming.into_dh_public()?;
        debug!(peer_public, "Received peer DH value");

        if let CipherPolicy::SecretDerived = self.config.cipher_policy {
            check_key_binding(&remote_cert, key_agreement.params().modulus, peer_public)?;
        }

        let secret = key_agreement.derive_secret(peer_public)?;
        self.transition(HandshakeState::SecretDerived {
            secret,
            remote_cert,
        });
        Ok(())
    }

    /// SECRET_DERIVED -> ESTABLISHED
    fn establish(&mut self) -> HandshakeResult<SecureChannel> {
        let HandshakeState::SecretDerived {
            secret,
            remote_cert,
        } = self.take_state()
        else {
            return Err(HandshakeError::NotRunnable(self.reached));
        };

        let keys = self
            .config
            .cipher_policy
            .message_keys(remote_cert.public_key(), &secret)?;
        drop(secret);

        let Link::Connected(conn) = std::mem::replace(&mut self.link, Link::Closed) else {
            return Err(HandshakeError::Transport(TransportError::ConnectionClosed));
        };

        self.transition(HandshakeState::Established);
        info!(
            remote = remote_cert.subject(),
            policy = self.config.cipher_policy.name(),
            "Secure channel established"
        );
        Ok(SecureChannel::new(
            self.id,
            self.config.name.clone(),
            remote_cert,
            keys,
            conn,
        ))
    }

    async fn send(&mut self, message: &PeerMessage) -> HandshakeResult<()> {
        let phase = self.reached;
        let Link::Connected(conn) = &mut self.link else {
            return Err(HandshakeError::PeerUnreachable(TransportError::ConnectionClosed));
        };
        conn.send(message)
            .await
            .map_err(|e| transport_failure(phase, e))
    }

    async fn recv(&mut self) -> HandshakeResult<PeerMessage> {
        let phase = self.reached;
        let Link::Connected(conn) = &mut self.link else {
            return Err(HandshakeError::PeerUnreachable(TransportError::ConnectionClosed));
        };
        conn.recv().await.map_err(|e| transport_failure(phase, e))
    }

    fn peer_failure(&self, err: TransportError) -> HandshakeError {
        transport_failure(self.reached, err)
    }

    fn ca_failure(
        &self,
        err: CaClientError,
        wrap: fn(CaClientError) -> HandshakeError,
    ) -> HandshakeError {
        match err {
            CaClientError::Unreachable {
                source: TransportError::Timeout(after),
                ..
            }
            | CaClientError::Transport(TransportError::Timeout(after)) => HandshakeError::Timeout {
                phase: self.reached,
                after,
            },
            other => wrap(other),
        }
    }
}

fn transport_failure(phase: HandshakePhase, err: TransportError) -> HandshakeError {
    match err {
        TransportError::Timeout(after) => HandshakeError::Timeout { phase, after },
        TransportError::Protocol(e) => HandshakeError::Protocol(e),
        other => HandshakeError::PeerUnreachable(other),
    }
}

/// A secret-derived certificate binds `(dh_public, p)`; the live DH value
/// and modulus must match it.
fn check_key_binding(
    remote_cert: &Certificate,
    local_modulus: u64,
    peer_public: u64,
) -> HandshakeResult<()> {
    let certified = remote_cert.public_key();
    if certified.modulus != local_modulus {
        return Err(HandshakeError::DomainParameterMismatch {
            expected: local_modulus,
            actual: certified.modulus,
        });
    }
    if certified.exponent != peer_public {
        return Err(HandshakeError::KeyBindingMismatch {
            certified: certified.exponent,
            received: peer_public,
        });
    }
    Ok(())
}

/// Entry point for running handshakes with a fixed configuration
#[derive(Debug, Clone)]
pub struct HandshakePeer {
    config: PeerConfig,
}

impl HandshakePeer {
    pub fn new(config: PeerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    /// Dial `peer_addr` and run the initiator side
    pub async fn connect(
        &self,
        peer_addr: &str,
        expected_peer: &str,
    ) -> HandshakeResult<SecureChannel> {
        Handshake::initiator(self.config.clone(), peer_addr, expected_peer)
            .run()
            .await
    }

    /// Accept one connection from `listener` and run the responder side
    pub async fn accept(
        &self,
        listener: &TcpListener,
        expected_peer: &str,
    ) -> HandshakeResult<SecureChannel> {
        let (stream, remote_addr) = listener
            .accept()
            .await
            .map_err(|e| HandshakeError::PeerUnreachable(e.into()))?;
        debug!(%remote_addr, "Accepted peer connection");

        let conn = FramedConnection::from_tcp(stream, self.config.timeouts)
            .map_err(HandshakeError::PeerUnreachable)?;
        Handshake::responder(self.config.clone(), conn, expected_peer)
            .run()
            .await
    }

    /// Listener that answers handshakes from `expected_peer` indefinitely
    pub fn responder(&self, expected_peer: &str) -> Responder {
        Responder::new(self.config.clone(), expected_peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use chrono::{Duration, Utc};
    use shared_protocol::{CertificateBody, PublicKey};

    fn cert(key: PublicKey) -> Certificate {
        let body = CertificateBody::new("Bob", key, "TrustedCA", Utc::now(), Duration::days(1));
        Certificate::unsigned(body)
    }

    #[test]
    fn test_key_binding() {
        assert!(check_key_binding(&cert(PublicKey::new(19, 23)), 23, 19).is_ok());

        let err = check_key_binding(&cert(PublicKey::new(19, 29)), 23, 19).unwrap_err();
        assert!(matches!(
            err,
            HandshakeError::DomainParameterMismatch {
                expected: 23,
                actual: 29
            }
        ));

        let err = check_key_binding(&cert(PublicKey::new(19, 23)), 23, 8).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Trust);
    }

    #[tokio::test]
    async fn test_unreachable_ca_fails_before_dialing() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ca_addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let config = PeerConfig::new("Alice").with_ca_addr(ca_addr);
        let mut handshake = Handshake::initiator(config, "127.0.0.1:9", "Bob");
        let err = handshake.run().await.unwrap_err();

        assert!(matches!(err, HandshakeError::CertificateAcquisition(_)));
        assert_eq!(handshake.state().failure(), Some(ErrorKind::Transport));
        assert!(matches!(
            handshake.state(),
            HandshakeState::Failed {
                phase: HandshakePhase::Start,
                ..
            }
        ));
        assert_eq!(handshake.phase(), HandshakePhase::Failed);
        assert!(!handshake.is_connected());

        let again = handshake.run().await.unwrap_err();
        assert!(matches!(again, HandshakeError::NotRunnable(HandshakePhase::Failed)));
    }
}
