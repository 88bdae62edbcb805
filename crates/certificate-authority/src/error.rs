//! CA client error types

use net_transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaClientError {
    #[error("Certificate authority unreachable at {addr}: {source}")]
    Unreachable {
        addr: String,
        #[source]
        source: TransportError,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Certificate authority rejected the request: {0}")]
    Rejected(String),

    #[error("Unexpected response from certificate authority: expected {0}")]
    UnexpectedResponse(&'static str),
}

pub type CaClientResult<T> = Result<T, CaClientError>;
