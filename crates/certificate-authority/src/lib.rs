//! Certificate Authority - issues and verifies signed identity certificates
//!
//! The authority owns one signing keypair and a store of everything it has
//! issued. [`CaServer`] exposes it over framed TCP and [`CaClient`] is the
//! peer-side counterpart.

mod authority;
mod client;
mod error;
mod server;
mod store;

pub use authority::*;
pub use client::*;
pub use error::*;
pub use server::*;
pub use store::*;
