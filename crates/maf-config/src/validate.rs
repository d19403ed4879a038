//! Pre-start configuration checks.
//!
//! Every check inspects the merged tree; all failures are collected and
//! reported together so an operator fixes the whole file in one pass.

use crate::{ClientTlsConfig, Config, ConfigError, HttpConfig, LogConfig, ValidationError};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "fatal", "panic"];

/// Run every validator; aggregate failures into [`ConfigError::Invalid`].
pub fn run(cfg: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    tls(cfg, &mut errors);
    mutual_tls(cfg, &mut errors);
    log_level(cfg, &mut errors);
    raft(cfg, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(errors))
    }
}

fn listener_sections(cfg: &Config) -> [(&'static str, &HttpConfig); 2] {
    [("agent.http", &cfg.agent.http), ("server.http", &cfg.server.http)]
}

fn client_sections(cfg: &Config) -> [(&'static str, &ClientTlsConfig); 2] {
    [
        ("server.http.clients.server", &cfg.server.http.clients.server),
        ("server.http.clients.agent", &cfg.server.http.clients.agent),
    ]
}

/// Either both `cert_file` and `key_file` are set or neither.
fn tls(cfg: &Config, errors: &mut Vec<ValidationError>) {
    for (section, http) in listener_sections(cfg) {
        if http.cert_file.is_some() != http.key_file.is_some() {
            errors.push(ValidationError::Tls {
                section: section.to_string(),
            });
        }
    }

    for (section, client) in client_sections(cfg) {
        if client.cert_file.is_some() != client.key_file.is_some() {
            errors.push(ValidationError::Tls {
                section: section.to_string(),
            });
        }
    }
}

/// A peer certificate without own key material is useless.
fn mutual_tls(cfg: &Config, errors: &mut Vec<ValidationError>) {
    for (section, http) in listener_sections(cfg) {
        if http.client_cert_file.is_some()
            && !(http.cert_file.is_some() && http.key_file.is_some())
        {
            errors.push(ValidationError::MutualTls {
                section: section.to_string(),
            });
        }
    }

    for (section, client) in client_sections(cfg) {
        if client.server_cert_file.is_some()
            && client.cert_file.is_some() != client.key_file.is_some()
        {
            errors.push(ValidationError::MutualTls {
                section: section.to_string(),
            });
        }
    }
}

fn log_level(cfg: &Config, errors: &mut Vec<ValidationError>) {
    let sections: [(&'static str, &LogConfig); 2] =
        [("agent.log", &cfg.agent.log), ("server.log", &cfg.server.log)];

    for (section, log) in sections {
        if !LOG_LEVELS.contains(&log.level.as_str()) {
            errors.push(ValidationError::LogLevel {
                section: section.to_string(),
                value: log.level.clone(),
            });
        }
    }
}

fn raft(cfg: &Config, errors: &mut Vec<ValidationError>) {
    let raft = &cfg.server.raft;

    if raft.peers.is_empty() || raft.node_id.as_deref().is_none_or(str::is_empty) {
        errors.push(ValidationError::RaftMissingMandatory);
    }

    if !raft.devmode && raft.data_dir.as_deref().is_none_or(str::is_empty) {
        errors.push(ValidationError::RaftStorage);
    }
}
