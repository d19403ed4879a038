//! HTTP worker error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
