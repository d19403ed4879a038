//! Client TLS configuration.

use serde::{Deserialize, Serialize};

/// TLS material for an outbound API client, as configured under
/// `*.http.clients.*`. All fields optional; the effective [`TlsMode`] is
/// derived from which ones are set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsOptions {
    /// Client certificate (enables mTLS together with `key_file`).
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    /// CA used to verify the server certificate.
    pub server_cert_file: Option<String>,
}

/// How the client talks to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsMode {
    Plain,
    ServerOnly { ca: String },
    Mutual { cert: String, key: String, ca: String },
}

impl TlsMode {
    /// Pick a mode from whichever fields are present: nothing set is plain
    /// HTTP, a CA alone verifies the server, a full triple is mutual TLS.
    pub fn from_options(options: Option<&TlsOptions>) -> Self {
        let Some(options) = options else {
            return Self::Plain;
        };

        match (&options.cert_file, &options.key_file, &options.server_cert_file) {
            (Some(cert), Some(key), Some(ca)) => Self::Mutual {
                cert: cert.clone(),
                key: key.clone(),
                ca: ca.clone(),
            },
            (None, None, Some(ca)) => Self::ServerOnly { ca: ca.clone() },
            _ => Self::Plain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_options_is_plain() {
        assert_eq!(TlsMode::from_options(None), TlsMode::Plain);
        assert_eq!(
            TlsMode::from_options(Some(&TlsOptions::default())),
            TlsMode::Plain
        );
    }

    #[test]
    fn ca_only_verifies_server() {
        let options = TlsOptions {
            server_cert_file: Some("ca.pem".into()),
            ..Default::default()
        };
        assert_eq!(
            TlsMode::from_options(Some(&options)),
            TlsMode::ServerOnly { ca: "ca.pem".into() }
        );
    }

    #[test]
    fn full_triple_is_mutual() {
        let options = TlsOptions {
            cert_file: Some("client.pem".into()),
            key_file: Some("client.key".into()),
            server_cert_file: Some("ca.pem".into()),
        };
        assert!(matches!(
            TlsMode::from_options(Some(&options)),
            TlsMode::Mutual { .. }
        ));
    }
}
