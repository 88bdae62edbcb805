//! Trustline Certificate Authority
//!
//! Issues and verifies peer certificates over length-prefixed JSON on TCP.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use certificate_authority::{CaServer, CertificateAuthority, CertificateStore};
use clap::Parser;
use crypto_session::{KeyPair, SignatureScheme};
use net_transport::IoTimeouts;
use shared_protocol::{DEFAULT_CA_PORT, DEFAULT_HOST};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Certificate authority for Trustline peers
#[derive(Parser)]
#[command(name = "ca-server")]
#[command(author, version, about)]
struct Cli {
    /// Host to bind
    #[arg(long, env = "CA_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Port to bind
    #[arg(short, long, env = "CA_PORT", default_value_t = DEFAULT_CA_PORT)]
    port: u16,

    /// First prime of the signing key (demo key if omitted)
    #[arg(long, env = "CA_P", requires_all = ["q", "e"])]
    p: Option<u64>,

    /// Second prime of the signing key
    #[arg(long, env = "CA_Q", requires_all = ["p", "e"])]
    q: Option<u64>,

    /// Public exponent of the signing key
    #[arg(long, env = "CA_E", requires_all = ["p", "q"])]
    e: Option<u64>,

    /// Read/write timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ca_server=info".parse()?)
                .add_directive("certificate_authority=debug".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let scheme = match (cli.p, cli.q, cli.e) {
        (Some(p), Some(q), Some(e)) => {
            let keys = KeyPair::from_primes(p, q, e).context("Invalid CA signing key")?;
            SignatureScheme::new(keys)
        }
        _ => SignatureScheme::demo(),
    };
    info!(verifying_key = %scheme.verifying_key(), "Starting Trustline Certificate Authority");

    let authority = Arc::new(CertificateAuthority::new(scheme, CertificateStore::new()));
    let timeouts = IoTimeouts {
        read: Duration::from_secs(cli.timeout),
        write: Duration::from_secs(cli.timeout),
        ..IoTimeouts::default()
    };

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    CaServer::new(authority.clone(), timeouts)
        .serve_with_shutdown(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for ctrl-c: {}", e);
            }
        })
        .await?;

    info!(issued = authority.issued().len(), "Certificate authority stopped");
    Ok(())
}
