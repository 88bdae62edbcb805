//! Client for talking to a remote certificate authority

use net_transport::{FramedConnection, IoTimeouts};
use shared_protocol::{CaOutcome, CaRequest, CaResponse, Certificate, PublicKey};
use tracing::debug;

use crate::{CaClientError, CaClientResult};

/// Opens one connection per request
#[derive(Debug, Clone)]
pub struct CaClient {
    addr: String,
    timeouts: IoTimeouts,
}

impl CaClient {
    pub fn new(addr: impl Into<String>, timeouts: IoTimeouts) -> Self {
        Self {
            addr: addr.into(),
            timeouts,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Ask the authority to issue a certificate binding `subject` to `public_key`
    pub async fn issue(&self, subject: &str, public_key: PublicKey) -> CaClientResult<Certificate> {
        let request = CaRequest::Issue {
            subject: subject.to_string(),
            public_key,
        };
        match self.exchange(&request).await? {
            CaOutcome::Issued { certificate } => {
                debug!(subject, "Certificate received from CA");
                Ok(certificate)
            }
            CaOutcome::Verified { .. } => Err(CaClientError::UnexpectedResponse("certificate")),
        }
    }

    /// Ask the authority whether `certificate` is valid
    pub async fn verify(&self, certificate: &Certificate) -> CaClientResult<bool> {
        let request = CaRequest::Verify {
            certificate: certificate.clone(),
        };
        match self.exchange(&request).await? {
            CaOutcome::Verified { valid } => {
                debug!(subject = certificate.subject(), valid, "CA verification result");
                Ok(valid)
            }
            CaOutcome::Issued { .. } => Err(CaClientError::UnexpectedResponse("valid")),
        }
    }

    async fn exchange(&self, request: &CaRequest) -> CaClientResult<CaOutcome> {
        let mut conn = FramedConnection::connect(&self.addr, self.timeouts)
            .await
            .map_err(|source| CaClientError::Unreachable {
                addr: self.addr.clone(),
                source,
            })?;

        let response: CaResponse = conn.request(request).await?;
        if let Err(e) = conn.shutdown().await {
            debug!(addr = %self.addr, "CA connection shutdown failed: {}", e);
        }

        match response {
            CaResponse::Success(outcome) => Ok(outcome),
            CaResponse::Error { message } => Err(CaClientError::Rejected(message)),
        }
    }
}
