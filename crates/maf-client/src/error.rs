//! Client error types.

use thiserror::Error;

/// Errors surfaced by the server API client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport or middleware failure on the server side.
    #[error("bad status code: {code}")]
    StatusCode { code: u16 },

    /// The server answered with `status = "error"`.
    #[error("server error: {details}")]
    Server { details: String },

    /// The response is not a recognizable envelope.
    #[error("unknown response format")]
    UnknownResponseFormat,

    /// Too many consecutive transport failures; cooling down.
    #[error("circuit breaker is open")]
    CircuitOpen,

    #[error("invalid host URL: {0}")]
    InvalidHost(#[from] url::ParseError),

    /// Certificate or key material could not be loaded.
    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}
