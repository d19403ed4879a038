//! Configuration error types.

use thiserror::Error;

/// A single failed pre-start check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("TLS misconfiguration in '{section}': both cert_file and key_file must be set")]
    Tls { section: String },

    #[error(
        "mTLS misconfiguration in '{section}': cert_file and key_file must accompany the peer certificate"
    )]
    MutualTls { section: String },

    #[error(
        "log level misconfiguration in '{section}': '{value}' is not one of trace, debug, info, warn, error, fatal, panic"
    )]
    LogLevel { section: String, value: String },

    #[error("raft misconfiguration: server.raft.peers and server.raft.node_id must be set")]
    RaftMissingMandatory,

    #[error("raft misconfiguration: server.raft.data_dir must be set unless devmode is enabled")]
    RaftStorage,
}

/// Errors produced while loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("config validation failed: {}", format_errors(.0))]
    Invalid(Vec<ValidationError>),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_joins_all_messages() {
        let err = ConfigError::Invalid(vec![
            ValidationError::RaftMissingMandatory,
            ValidationError::RaftStorage,
        ]);
        let msg = err.to_string();
        assert!(msg.contains("node_id"));
        assert!(msg.contains("data_dir"));
        assert!(msg.contains("; "));
    }
}
