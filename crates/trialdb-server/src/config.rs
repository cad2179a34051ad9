use trialdb_transport::SecurityLayer;

/// Configuration for the dispatch server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address to listen on. Use port 0 to pick an ephemeral port and
    /// read it back from the started handle.
    pub bind_addr: String,
    /// Security layer required of every connection. The server does not
    /// negotiate per-connection: clients must match.
    pub security: SecurityLayer,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9618".to_string(),
            security: SecurityLayer::None,
        }
    }
}

impl ServerConfig {
    pub fn with_security(mut self, security: SecurityLayer) -> Self {
        self.security = security;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_plain_loopback() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:9618");
        assert_eq!(config.security, SecurityLayer::None);
    }
}
