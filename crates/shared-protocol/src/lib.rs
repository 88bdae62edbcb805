//! Shared Protocol Definitions for Trustline
//!
//! This crate contains the certificate entity, the CA request/response
//! shapes and the peer-to-peer handshake messages shared by the
//! certificate authority and the peers.

mod certificate;
mod config;
mod error;
mod messages;

pub use certificate::*;
pub use config::*;
pub use error::*;
pub use messages::*;

/// Issuer name stamped on every certificate
pub const CA_ISSUER: &str = "TrustedCA";

/// Certificate lifetime in days
pub const CERTIFICATE_VALIDITY_DAYS: i64 = 365;

/// Maximum framed payload size (1 MiB)
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;
