use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_PORT, LOCALHOST_DOMAIN};

/// Where a live relay can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

impl Server {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn localhost() -> Self {
        Self::new(LOCALHOST_DOMAIN, DEFAULT_PORT)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/", self.address())
    }
}

impl From<std::net::SocketAddr> for Server {
    fn from(value: std::net::SocketAddr) -> Self {
        Self::new(value.ip().to_string(), value.port())
    }
}

impl Display for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls() {
        let server = Server::localhost();

        assert_eq!(server.address(), format!("{LOCALHOST_DOMAIN}:{DEFAULT_PORT}"));
        assert_eq!(
            server.ws_url(),
            format!("ws://{LOCALHOST_DOMAIN}:{DEFAULT_PORT}/")
        );
    }

    #[test]
    fn from_socket_addr() {
        let addr: std::net::SocketAddr = "127.0.0.1:4000".parse().expect("valid address");

        assert_eq!(Server::from(addr), Server::new("127.0.0.1", 4000));
        assert_eq!(Server::from(addr).to_string(), "127.0.0.1:4000");
    }
}
