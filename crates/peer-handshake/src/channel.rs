//! Encrypted message channel

use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use crypto_session::MessageKeys;
use net_transport::FramedConnection;
use shared_protocol::{Certificate, PeerMessage};
use tracing::{debug, info};
use uuid::Uuid;

use crate::HandshakeResult;

/// A decrypted message together with what went over the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub received_at: DateTime<Utc>,
    pub sender: String,
    pub plaintext: String,
    pub ciphertext: Vec<u64>,
}

/// Connection to a verified peer with established message keys
pub struct SecureChannel {
    session_id: Uuid,
    local_name: String,
    remote_cert: Certificate,
    keys: MessageKeys,
    conn: FramedConnection,
}

impl SecureChannel {
    pub(crate) fn new(
        session_id: Uuid,
        local_name: String,
        remote_cert: Certificate,
        keys: MessageKeys,
        conn: FramedConnection,
    ) -> Self {
        Self {
            session_id,
            local_name,
            remote_cert,
            keys,
            conn,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn remote_certificate(&self) -> &Certificate {
        &self.remote_cert
    }

    pub fn remote_subject(&self) -> &str {
        self.remote_cert.subject()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.conn.peer_addr()
    }

    /// Encrypt `text` and send it; returns the ciphertext that was sent
    pub async fn send_text(&mut self, text: &str) -> HandshakeResult<Vec<u64>> {
        let values = self.keys.encrypt(text)?;
        debug!(ciphertext = ?values, "Sending encrypted message");

        self.conn
            .send(&PeerMessage::Ciphertext {
                values: values.clone(),
            })
            .await?;
        info!(
            to = self.remote_subject(),
            chars = values.len(),
            "Encrypted message sent"
        );
        Ok(values)
    }

    /// Wait for the next ciphertext and decrypt it
    pub async fn recv_text(&mut self) -> HandshakeResult<ReceivedMessage> {
        let message: PeerMessage = self.conn.recv().await?;
        let ciphertext = message.into_ciphertext()?;
        let plaintext = self.keys.decrypt(&ciphertext)?;
        info!(
            from = self.remote_subject(),
            chars = ciphertext.len(),
            "Encrypted message received"
        );

        Ok(ReceivedMessage {
            received_at: Utc::now(),
            sender: self.remote_subject().to_string(),
            plaintext,
            ciphertext,
        })
    }

    pub async fn close(mut self) -> HandshakeResult<()> {
        self.conn.shutdown().await?;
        debug!(session = %self.session_id, "Secure channel closed");
        Ok(())
    }
}

impl std::fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureChannel")
            .field("session_id", &self.session_id)
            .field("local_name", &self.local_name)
            .field("remote", &self.remote_cert.subject())
            .field("outbound_key", &self.keys.outbound_key())
            .finish_non_exhaustive()
    }
}
