//! Long-running responder

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use net_transport::FramedConnection;
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{ErrorKind, Handshake, PeerConfig, ReceivedMessage};

/// Messages received by a [`Responder`], in arrival order
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    entries: Arc<Mutex<Vec<ReceivedMessage>>>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, message: ReceivedMessage) {
        self.entries.lock().push(message);
    }

    pub fn snapshot(&self) -> Vec<ReceivedMessage> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Observable outcome of one inbound connection
#[derive(Debug, Clone)]
pub enum ResponderEvent {
    MessageReceived(ReceivedMessage),
    HandshakeFailed {
        remote_addr: SocketAddr,
        kind: ErrorKind,
        error: String,
    },
}

/// Accepts connections, answers each handshake and decrypts what follows
pub struct Responder {
    config: PeerConfig,
    expected_peer: String,
    log: MessageLog,
    events: Option<mpsc::Sender<ResponderEvent>>,
}

impl Responder {
    pub fn new(config: PeerConfig, expected_peer: impl Into<String>) -> Self {
        Self {
            config,
            expected_peer: expected_peer.into(),
            log: MessageLog::new(),
            events: None,
        }
    }

    /// Report every received message and failed handshake to `sink`
    pub fn with_event_sink(mut self, sink: mpsc::Sender<ResponderEvent>) -> Self {
        self.events = Some(sink);
        self
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        self.serve_with_shutdown(listener, std::future::pending())
            .await
    }

    /// Serve until `shutdown` resolves. Per-connection failures never stop
    /// the loop.
    pub async fn serve_with_shutdown<F>(
        self,
        listener: TcpListener,
        shutdown: F,
    ) -> std::io::Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(
            name = %self.config.name,
            expected = %self.expected_peer,
            "Listening for handshakes on {}",
            listener.local_addr()?
        );
        let shared = Arc::new(self);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Responder shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!("Accept failed: {}", e);
                            continue;
                        }
                    };
                    let responder = shared.clone();
                    tokio::spawn(async move {
                        responder.handle_connection(stream, remote_addr).await;
                    });
                }
            }
        }
    }

    async fn handle_connection(&self, stream: TcpStream, remote_addr: SocketAddr) {
        debug!(%remote_addr, "Peer connection accepted");

        let conn = match FramedConnection::from_tcp(stream, self.config.timeouts) {
            Ok(conn) => conn,
            Err(e) => {
                warn!(%remote_addr, "Failed to set up connection: {}", e);
                return;
            }
        };

        let mut handshake = Handshake::responder(self.config.clone(), conn, &self.expected_peer);
        let mut channel = match handshake.run().await {
            Ok(channel) => channel,
            Err(e) => {
                self.emit(ResponderEvent::HandshakeFailed {
                    remote_addr,
                    kind: e.kind(),
                    error: e.to_string(),
                })
                .await;
                return;
            }
        };

        loop {
            match channel.recv_text().await {
                Ok(message) => {
                    info!(
                        %remote_addr,
                        from = %message.sender,
                        plaintext = %message.plaintext,
                        "Decrypted message"
                    );
                    self.log.record(message.clone());
                    self.emit(ResponderEvent::MessageReceived(message)).await;
                }
                Err(e) if e.is_connection_closed() => {
                    debug!(%remote_addr, "Peer closed the channel");
                    break;
                }
                Err(e) => {
                    warn!(%remote_addr, kind = %e.kind(), "Failed to receive message: {}", e);
                    break;
                }
            }
        }
    }

    async fn emit(&self, event: ResponderEvent) {
        let Some(events) = &self.events else {
            return;
        };
        if events.send(event).await.is_err() {
            debug!("Responder event receiver dropped");
        }
    }
}
