//! CA network server

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use net_transport::{FramedConnection, IoTimeouts, TransportError};
use shared_protocol::{CaRequest, CaResponse};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::CertificateAuthority;

/// Accepts framed CA requests, one request/response per connection
pub struct CaServer {
    authority: Arc<CertificateAuthority>,
    timeouts: IoTimeouts,
}

impl CaServer {
    pub fn new(authority: Arc<CertificateAuthority>, timeouts: IoTimeouts) -> Self {
        Self {
            authority,
            timeouts,
        }
    }

    pub fn authority(&self) -> &Arc<CertificateAuthority> {
        &self.authority
    }

    /// Serve until the listener fails
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        self.serve_with_shutdown(listener, std::future::pending())
            .await
    }

    /// Serve until `shutdown` resolves
    pub async fn serve_with_shutdown<F>(
        self,
        listener: TcpListener,
        shutdown: F,
    ) -> std::io::Result<()>
    where
        F: Future<Output = ()>,
    {
        info!("Certificate authority listening on {}", listener.local_addr()?);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Certificate authority shutting down");
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
                    let authority = self.authority.clone();
                    let timeouts = self.timeouts;
                    tokio::spawn(async move {
                        handle_connection(authority, stream, remote_addr, timeouts).await;
                    });
                }
            }
        }
    }
}

async fn handle_connection(
    authority: Arc<CertificateAuthority>,
    stream: TcpStream,
    remote_addr: SocketAddr,
    timeouts: IoTimeouts,
) {
    debug!(%remote_addr, "CA connection accepted");

    let mut conn = match FramedConnection::from_tcp(stream, timeouts) {
        Ok(conn) => conn,
        Err(e) => {
            warn!(%remote_addr, "Failed to set up connection: {}", e);
            return;
        }
    };

    let response = match conn.recv::<CaRequest>().await {
        Ok(request) => {
            debug!(%remote_addr, kind = request.kind(), "CA request");
            authority.handle_request(request)
        }
        Err(TransportError::ConnectionClosed) => {
            debug!(%remote_addr, "Connection closed before a request arrived");
            return;
        }
        Err(TransportError::Protocol(e)) => {
            warn!(%remote_addr, "Undecodable request: {}", e);
            CaResponse::error(format!("Invalid request: {e}"))
        }
        Err(e) => {
            warn!(%remote_addr, "Failed to read request: {}", e);
            return;
        }
    };

    if let Err(e) = conn.send(&response).await {
        error!(%remote_addr, "Failed to send response: {}", e);
        return;
    }
    if let Err(e) = conn.shutdown().await {
        debug!(%remote_addr, "Connection shutdown failed: {}", e);
    }
    debug!(%remote_addr, "CA connection closed");
}
