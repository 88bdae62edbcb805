//! Network addressing defaults

/// Default host for the CA and both peers
pub const DEFAULT_HOST: &str = "localhost";

/// Default CA port
pub const DEFAULT_CA_PORT: u16 = 4999;

/// Default port Alice listens on
pub const DEFAULT_ALICE_PORT: u16 = 5001;

/// Default port Bob listens on
pub const DEFAULT_BOB_PORT: u16 = 5003;

/// Fixed host/port pairs of the CA and the two well-known peers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub host: String,
    pub ca_port: u16,
    pub alice_port: u16,
    pub bob_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            ca_port: DEFAULT_CA_PORT,
            alice_port: DEFAULT_ALICE_PORT,
            bob_port: DEFAULT_BOB_PORT,
        }
    }
}

impl NetworkConfig {
    /// Address of the certificate authority
    pub fn ca_addr(&self) -> String {
        format!("{}:{}", self.host, self.ca_port)
    }

    /// Listening port of a well-known peer (case-insensitive)
    pub fn peer_port(&self, name: &str) -> Option<u16> {
        match name.to_ascii_lowercase().as_str() {
            "alice" => Some(self.alice_port),
            "bob" => Some(self.bob_port),
            _ => None,
        }
    }

    /// Listening address of a well-known peer
    pub fn peer_addr(&self, name: &str) -> Option<String> {
        self.peer_port(name)
            .map(|port| format!("{}:{}", self.host, port))
    }
}
