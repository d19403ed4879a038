//! Configuration management for maf.
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. CLI overrides (highest precedence, applied by the caller)
//! 2. Environment variables (`MAF_` prefix, `__` as the key separator)
//! 3. Config file (`~/.maf.yaml` by default, or an explicit path)
//! 4. Built-in defaults (lowest precedence)
//!
//! The merged tree is validated before any worker starts; see [`validate`].

use serde::{Deserialize, Serialize};

mod error;
mod loader;
pub mod validate;

pub use error::{ConfigError, ValidationError};
pub use loader::Loader;

/// Root of the configuration tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub agent: AgentConfig,
}

/// `server.*` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub http: HttpConfig,
    pub log: LogConfig,
    pub sentry: SentryConfig,
    pub raft: RaftConfig,
}

/// `agent.*` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub http: HttpConfig,
    pub log: LogConfig,
    pub sentry: SentryConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig {
                addr: "0.0.0.0:7070".to_string(),
                advertise: "http://127.0.0.1:7070".to_string(),
                ..HttpConfig::default()
            },
            log: LogConfig::default(),
            sentry: SentryConfig::default(),
        }
    }
}

/// HTTP listener settings, shared by server and agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Address to bind the HTTP listener to.
    pub addr: String,
    /// URL (with scheme) advertised to clients and peers.
    pub advertise: String,
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    /// CA used to verify client certificates; setting it enables mTLS.
    pub client_cert_file: Option<String>,
    /// Timeouts are integer seconds.
    pub read_timeout: u64,
    pub write_timeout: u64,
    pub idle_timeout: u64,
    pub graceful_shutdown_timeout: u64,
    pub clients: ClientsConfig,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:7080".to_string(),
            advertise: "http://127.0.0.1:7080".to_string(),
            cert_file: None,
            key_file: None,
            client_cert_file: None,
            read_timeout: 5,
            write_timeout: 5,
            idle_timeout: 60,
            graceful_shutdown_timeout: 5,
            clients: ClientsConfig::default(),
        }
    }
}

/// TLS material for outbound API clients (`*.http.clients.*`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientsConfig {
    pub server: ClientTlsConfig,
    pub agent: ClientTlsConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientTlsConfig {
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    pub server_cert_file: Option<String>,
}

impl ClientTlsConfig {
    pub fn is_empty(&self) -> bool {
        self.cert_file.is_none() && self.key_file.is_none() && self.server_cert_file.is_none()
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// One of: trace, debug, info, warn, error, fatal, panic.
    pub level: String,
    /// Human-readable output instead of compact.
    pub pretty: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            pretty: false,
        }
    }
}

/// Error-reporter settings. The key is accepted for compatibility; the
/// integration itself lives outside this codebase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SentryConfig {
    pub dsn: Option<String>,
}

/// `server.raft.*` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaftConfig {
    /// Raft transport address, distinct from the HTTP address.
    pub addr: String,
    /// Operator-chosen id, unique within the cluster.
    pub node_id: Option<String>,
    /// Durable state directory; required unless `devmode` is set.
    pub data_dir: Option<String>,
    /// In-memory stores, no on-disk state.
    pub devmode: bool,
    /// HTTP advertise URLs of peers to join on startup.
    pub peers: Vec<String>,
    /// Form a new single-node cluster instead of joining peers.
    pub bootstrap: bool,
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:7081".to_string(),
            node_id: None,
            data_dir: None,
            devmode: false,
            peers: Vec::new(),
            bootstrap: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_coherent() {
        let cfg = Config::default();
        assert_eq!(cfg.server.http.addr, "0.0.0.0:7080");
        assert_eq!(cfg.server.http.read_timeout, 5);
        assert_eq!(cfg.server.log.level, "info");
        assert!(!cfg.server.raft.bootstrap);
        assert!(cfg.agent.http.addr.ends_with(":7070"));
    }

    #[test]
    fn client_tls_emptiness() {
        let mut tls = ClientTlsConfig::default();
        assert!(tls.is_empty());
        tls.server_cert_file = Some("ca.pem".into());
        assert!(!tls.is_empty());
    }
}
