//! Peer Handshake - CA-backed Diffie-Hellman handshake between two peers
//!
//! A [`Handshake`] walks an explicit state machine: obtain a certificate,
//! swap certificates with the remote peer, have the CA vouch for the remote
//! one, exchange DH public values and derive message keys. Only a completed
//! handshake yields a [`SecureChannel`], the sole way to send or receive
//! text.

mod channel;
mod config;
mod error;
mod handshake;
mod listener;
mod state;

pub use channel::*;
pub use config::*;
pub use error::*;
pub use handshake::*;
pub use listener::*;
pub use state::*;
