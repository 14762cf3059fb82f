//! Agent HTTP listener configuration

use serde::{Deserialize, Serialize};

/// Where the agent listens for coordinator calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpServerConfig {
    /// `host:port` to bind (default: "0.0.0.0:8080")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl HttpServerConfig {
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_address: format!("0.0.0.0:{}", port),
        }
    }

    pub fn socket_addr(&self) -> String {
        self.bind_address.clone()
    }
}
