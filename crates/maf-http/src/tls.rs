//! Listener-side TLS configuration using rustls.

use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::RootCertStore;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;

use crate::error::HttpError;

/// TLS material for an HTTP listener. With nothing set the listener is
/// plain HTTP; a cert/key pair enables TLS; adding `client_cert_file`
/// requires verified client certificates (mTLS).
#[derive(Debug, Clone, Default)]
pub struct TlsSettings {
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    pub client_cert_file: Option<String>,
}

impl TlsSettings {
    pub fn enabled(&self) -> bool {
        self.cert_file.is_some() && self.key_file.is_some()
    }

    pub fn mutual(&self) -> bool {
        self.client_cert_file.is_some()
    }

    /// Build the rustls server configuration from the configured files.
    pub fn server_config(&self) -> Result<rustls::ServerConfig, HttpError> {
        let (Some(cert_file), Some(key_file)) = (&self.cert_file, &self.key_file) else {
            return Err(HttpError::Tls(
                "cert_file and key_file are required for TLS".to_string(),
            ));
        };

        let certs = load_certs(Path::new(cert_file))?;
        let key = load_private_key(Path::new(key_file))?;

        let builder = rustls::ServerConfig::builder();

        let mut config = match &self.client_cert_file {
            Some(ca_file) => {
                let mut roots = RootCertStore::empty();
                for cert in load_certs(Path::new(ca_file))? {
                    roots
                        .add(cert)
                        .map_err(|e| HttpError::Tls(format!("bad client CA entry: {e}")))?;
                }
                let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
                    .build()
                    .map_err(|e| HttpError::Tls(format!("client verifier: {e}")))?;
                builder
                    .with_client_cert_verifier(verifier)
                    .with_single_cert(certs, key)
                    .map_err(|e| HttpError::Tls(e.to_string()))?
            }
            None => builder
                .with_no_client_auth()
                .with_single_cert(certs, key)
                .map_err(|e| HttpError::Tls(e.to_string()))?,
        };

        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
        Ok(config)
    }
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, HttpError> {
    let file = std::fs::File::open(path)
        .map_err(|e| HttpError::Tls(format!("failed to read {}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);

    let certs: Vec<_> = rustls_pemfile::certs(&mut reader)
        .collect::<Result<_, _>>()
        .map_err(|e| HttpError::Tls(format!("failed to parse {}: {e}", path.display())))?;

    if certs.is_empty() {
        return Err(HttpError::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }

    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, HttpError> {
    let file = std::fs::File::open(path)
        .map_err(|e| HttpError::Tls(format!("failed to read {}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| HttpError::Tls(format!("failed to parse {}: {e}", path.display())))?
        .ok_or_else(|| HttpError::Tls(format!("no private key found in {}", path.display())))
}
