//! Trustline Peer
//!
//! Runs the CA-backed handshake against another peer and exchanges
//! encrypted text over the resulting channel.

use std::time::Duration;

use anyhow::{Context, bail};
use certificate_authority::CaClient;
use clap::{Parser, Subcommand, ValueEnum};
use crypto_session::{
    CipherPolicy, DEFAULT_DH_GENERATOR, DEFAULT_DH_MODULUS, DhParams, KeyAgreement, KeyPair,
};
use net_transport::IoTimeouts;
use peer_handshake::{HandshakePeer, PeerConfig, ResponderEvent};
use shared_protocol::NetworkConfig;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Trustline peer
#[derive(Parser)]
#[command(name = "peer")]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Identity to request from the CA
    #[arg(short, long, env = "PEER_NAME", default_value = "Alice")]
    name: String,

    /// Address of the certificate authority
    #[arg(long, env = "CA_ADDR")]
    ca_addr: Option<String>,

    /// How message keys are obtained
    #[arg(long, value_enum, default_value_t = Policy::SecretDerived)]
    policy: Policy,

    /// First prime of the owned keypair (certificate-keyed policy)
    #[arg(long, env = "RSA_P", default_value_t = 61)]
    rsa_p: u64,

    /// Second prime of the owned keypair
    #[arg(long, env = "RSA_Q", default_value_t = 53)]
    rsa_q: u64,

    /// Public exponent of the owned keypair
    #[arg(long, env = "RSA_E", default_value_t = 17)]
    rsa_e: u64,

    /// DH modulus
    #[arg(long, env = "DH_P", default_value_t = DEFAULT_DH_MODULUS)]
    dh_p: u64,

    /// DH generator
    #[arg(long, env = "DH_G", default_value_t = DEFAULT_DH_GENERATOR)]
    dh_g: u64,

    /// Network timeout in seconds
    #[arg(short, long, default_value_t = 30)]
    timeout: u64,
}

#[derive(Clone, Copy, ValueEnum)]
enum Policy {
    SecretDerived,
    CertificateKeyed,
}

#[derive(Subcommand)]
enum Commands {
    /// Handshake with a listening peer and send a message
    Send {
        /// Expected identity of the remote peer
        #[arg(long, default_value = "Bob")]
        to: String,

        /// Remote address (defaults to the well-known port of `to`)
        #[arg(long)]
        addr: Option<String>,

        /// Message words, joined with spaces
        #[arg(short, long, num_args = 1.., default_values = ["Hello", "world"])]
        message: Vec<String>,
    },

    /// Accept handshakes and print decrypted messages
    Listen {
        /// Identity expected from connecting peers
        #[arg(long, default_value = "Alice")]
        from: String,

        /// Address to bind (defaults to this peer's well-known port)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Ask the CA for a certificate and have it verified
    ProbeCa,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("peer=info".parse()?)
                .add_directive("peer_handshake=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let network = NetworkConfig::default();
    let config = build_config(&cli, &network)?;

    match cli.command {
        Commands::Send { to, addr, message } => {
            let addr = match addr.or_else(|| network.peer_addr(&to)) {
                Some(addr) => addr,
                None => bail!("No well-known address for {to}; pass --addr"),
            };
            send(config, &addr, &to, &message.join(" ")).await
        }
        Commands::Listen { from, bind } => {
            let bind = match bind.or_else(|| network.peer_addr(&config.name)) {
                Some(bind) => bind,
                None => bail!("No well-known port for {}; pass --bind", config.name),
            };
            listen(config, &bind, &from).await
        }
        Commands::ProbeCa => probe_ca(&config).await,
    }
}

fn build_config(cli: &Cli, network: &NetworkConfig) -> anyhow::Result<PeerConfig> {
    let cipher_policy = match cli.policy {
        Policy::SecretDerived => CipherPolicy::SecretDerived,
        Policy::CertificateKeyed => {
            let keys = KeyPair::from_primes(cli.rsa_p, cli.rsa_q, cli.rsa_e)
                .context("Invalid RSA_P/RSA_Q/RSA_E keypair")?;
            CipherPolicy::CertificateKeyed(keys)
        }
    };
    let dh_params = DhParams::new(cli.dh_p, cli.dh_g).context("Invalid DH parameters")?;
    let ca_addr = cli.ca_addr.clone().unwrap_or_else(|| network.ca_addr());

    let config = PeerConfig::new(&cli.name)
        .with_dh_params(dh_params)
        .with_cipher_policy(cipher_policy)
        .with_ca_addr(ca_addr)
        .with_timeouts(IoTimeouts {
            read: Duration::from_secs(cli.timeout),
            write: Duration::from_secs(cli.timeout),
            ..IoTimeouts::default()
        });
    config.validate()?;
    Ok(config)
}

async fn send(config: PeerConfig, addr: &str, to: &str, message: &str) -> anyhow::Result<()> {
    info!(name = %config.name, %addr, policy = config.cipher_policy.name(), "Connecting to {}", to);

    let mut channel = HandshakePeer::new(config)
        .connect(addr, to)
        .await
        .with_context(|| format!("Handshake with {to} failed"))?;

    let ordinals: Vec<u32> = message.chars().map(u32::from).collect();
    debug!(?ordinals, "Plaintext ordinals");

    let ciphertext = channel.send_text(message).await?;
    let binary: Vec<String> = ciphertext.iter().map(|value| format!("{value:b}")).collect();
    debug!(?binary, "Binary representation");
    info!(?ciphertext, "Message sent: {}", message);

    channel.close().await?;
    Ok(())
}

async fn listen(config: PeerConfig, bind: &str, from: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    let (tx, mut rx) = mpsc::channel(64);

    let responder = HandshakePeer::new(config).responder(from).with_event_sink(tx);
    let log = responder.log().clone();

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ResponderEvent::MessageReceived(message) => {
                    info!(
                        from = %message.sender,
                        ciphertext = ?message.ciphertext,
                        "Decrypted message: {}",
                        message.plaintext
                    );
                }
                ResponderEvent::HandshakeFailed {
                    remote_addr,
                    kind,
                    error,
                } => {
                    warn!(%remote_addr, %kind, "Rejected connection: {}", error);
                }
            }
        }
    });

    responder
        .serve_with_shutdown(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for ctrl-c: {}", e);
            }
        })
        .await?;

    info!(received = log.len(), "Listener stopped");
    Ok(())
}

async fn probe_ca(config: &PeerConfig) -> anyhow::Result<()> {
    let client = CaClient::new(config.ca_addr.clone(), config.timeouts);
    let key_agreement = KeyAgreement::generate(config.dh_params)?;
    let key = config
        .cipher_policy
        .certificate_key(key_agreement.public_value(), config.dh_params.modulus);

    let certificate = client
        .issue(&config.name, key)
        .await
        .context("Certificate request failed")?;
    info!(
        subject = certificate.subject(),
        key = %certificate.public_key(),
        valid_until = %certificate.valid_until(),
        "Certificate issued"
    );

    let valid = client.verify(&certificate).await?;
    info!(valid, "Certificate verified by CA");
    if !valid {
        bail!("CA rejected its own certificate");
    }
    Ok(())
}
