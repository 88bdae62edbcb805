//! Network Transport - length-prefixed JSON framing over TCP for Trustline
//!
//! Every message travels as an 8-byte big-endian length followed by that
//! many bytes of JSON. A connection carries one request/response exchange
//! with the CA, or one handshake plus message traffic between peers.

mod connection;
mod error;
mod framing;

pub use connection::*;
pub use error::*;
pub use framing::*;
