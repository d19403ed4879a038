//! HTTP client for the maf server API.
//!
//! Used by the CLI and by the peer auto-join loop. Speaks the `v1alpha`
//! envelope protocol, negotiates TLS/mTLS from whichever certificate
//! material is configured, retries transient failures with backoff and
//! fails fast behind a small circuit breaker.

use std::time::Duration;

use maf_wire::{
    ClusterInfo, Envelope, ForgetRequest, JoinRequest, KvGetResponse, KvSetRequest, Status,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

mod breaker;
mod error;
mod tls;

pub use error::ClientError;
pub use tls::{TlsMode, TlsOptions};

use breaker::Breaker;

const AUTH_TOKEN: &str = "root";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_COUNT: u32 = 3;
const RETRY_WAIT: Duration = Duration::from_secs(1);
const RETRY_MAX_WAIT: Duration = Duration::from_secs(3);

/// Client for one maf server (or a peer during auto-join).
pub struct Client {
    host: String,
    base: Url,
    http: reqwest::Client,
    breaker: Breaker,
    logging: bool,
}

impl Client {
    /// Plain HTTP client.
    pub fn new(host: &str, logging: bool) -> Result<Self, ClientError> {
        Self::build(host, &TlsMode::Plain, logging)
    }

    /// TLS with an explicit CA for server verification.
    pub fn with_tls(host: &str, server_cert_file: &str, logging: bool) -> Result<Self, ClientError> {
        Self::build(
            host,
            &TlsMode::ServerOnly {
                ca: server_cert_file.to_string(),
            },
            logging,
        )
    }

    /// Mutual TLS.
    pub fn with_mutual_tls(
        host: &str,
        cert_file: &str,
        key_file: &str,
        server_cert_file: &str,
        logging: bool,
    ) -> Result<Self, ClientError> {
        Self::build(
            host,
            &TlsMode::Mutual {
                cert: cert_file.to_string(),
                key: key_file.to_string(),
                ca: server_cert_file.to_string(),
            },
            logging,
        )
    }

    /// Pick plain/TLS/mTLS from whichever options are set.
    pub fn with_auto_tls(
        host: &str,
        options: Option<&TlsOptions>,
        logging: bool,
    ) -> Result<Self, ClientError> {
        Self::build(host, &TlsMode::from_options(options), logging)
    }

    fn build(host: &str, mode: &TlsMode, logging: bool) -> Result<Self, ClientError> {
        let mut base = Url::parse(host)?;
        {
            let mut segments = base
                .path_segments_mut()
                .map_err(|()| ClientError::InvalidHost(url::ParseError::RelativeUrlWithoutBase))?;
            segments.pop_if_empty().extend(["api", "v1alpha"]);
        }

        let mut headers = HeaderMap::new();
        let auth_header = HeaderName::from_bytes(maf_wire::AUTH_HEADER.as_bytes())
            .expect("static header name is valid");
        headers.insert(auth_header, HeaderValue::from_static(AUTH_TOKEN));

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(format!("maf/{}", maf_wire::app_version()))
            .timeout(DEFAULT_TIMEOUT);

        match mode {
            TlsMode::Plain => {}
            TlsMode::ServerOnly { ca } => {
                builder = builder.use_rustls_tls().add_root_certificate(read_ca(ca)?);
            }
            TlsMode::Mutual { cert, key, ca } => {
                builder = builder
                    .use_rustls_tls()
                    .add_root_certificate(read_ca(ca)?)
                    .identity(read_identity(cert, key)?);
            }
        }

        Ok(Self {
            host: host.to_string(),
            base,
            http: builder.build()?,
            breaker: Breaker::default(),
            logging,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Path-safe URL composition under the API prefix.
    fn make_url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .expect("API base URL is always a valid base")
            .extend(segments);
        url
    }

    /// `POST /raft/join`
    pub async fn raft_join(&self, server_id: &str, addr: &str) -> Result<(), ClientError> {
        let url = self.make_url(&["raft", "join"]);
        let body = JoinRequest {
            server_id: server_id.to_string(),
            addr: addr.to_string(),
        };
        self.parse_envelope(self.send(|| self.http.post(url.clone()).json(&body)).await?)
            .await
            .map(|_| ())
    }

    /// `POST /raft/forget`
    pub async fn raft_forget(&self, server_id: &str) -> Result<(), ClientError> {
        let url = self.make_url(&["raft", "forget"]);
        let body = ForgetRequest {
            server_id: server_id.to_string(),
        };
        self.parse_envelope(self.send(|| self.http.post(url.clone()).json(&body)).await?)
            .await
            .map(|_| ())
    }

    /// `GET /raft/info`
    pub async fn raft_info(&self, include_stats: bool) -> Result<ClusterInfo, ClientError> {
        let mut url = self.make_url(&["raft", "info"]);
        if include_stats {
            url.query_pairs_mut().append_pair("include_stats", "true");
        }

        let data = self
            .parse_envelope(self.send(|| self.http.get(url.clone())).await?)
            .await?;
        serde_json::from_value(data).map_err(|_| ClientError::UnknownResponseFormat)
    }

    /// `GET /raft/kv/{key}` — returns `(value, exists)`.
    pub async fn raft_kv_get(&self, key: &str) -> Result<(String, bool), ClientError> {
        let url = self.make_url(&["raft", "kv", key]);

        let data = self
            .parse_envelope(self.send(|| self.http.get(url.clone())).await?)
            .await?;

        if !data.is_object() {
            return Err(ClientError::UnknownResponseFormat);
        }
        let payload: KvGetResponse =
            serde_json::from_value(data).map_err(|_| ClientError::UnknownResponseFormat)?;
        Ok((payload.value, payload.exist))
    }

    /// `POST /raft/kv`
    pub async fn raft_kv_set(&self, key: &str, value: &str) -> Result<(), ClientError> {
        let url = self.make_url(&["raft", "kv"]);
        let body = KvSetRequest {
            key: key.to_string(),
            value: value.to_string(),
        };
        self.parse_envelope(self.send(|| self.http.post(url.clone()).json(&body)).await?)
            .await
            .map(|_| ())
    }

    /// `DELETE /raft/kv/{key}`
    pub async fn raft_kv_delete(&self, key: &str) -> Result<(), ClientError> {
        let url = self.make_url(&["raft", "kv", key]);
        self.parse_envelope(self.send(|| self.http.delete(url.clone())).await?)
            .await
            .map(|_| ())
    }

    /// Issue a request with bounded retries behind the breaker.
    async fn send(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ClientError> {
        if !self.breaker.allow() {
            return Err(ClientError::CircuitOpen);
        }

        let mut attempt = 0;
        loop {
            let result = build().send().await;

            match result {
                Ok(response) => {
                    if self.logging {
                        tracing::debug!(
                            status = response.status().as_u16(),
                            url = %response.url(),
                            "server API request finished"
                        );
                    }
                    // Retry server-side hiccups; anything else is for the
                    // envelope parser to judge.
                    if response.status().is_server_error() && attempt < RETRY_COUNT {
                        attempt += 1;
                        tokio::time::sleep(backoff(attempt)).await;
                        continue;
                    }
                    self.breaker.record_success();
                    return Ok(response);
                }
                Err(err) => {
                    if self.logging {
                        tracing::warn!(%err, attempt, "server API request failed");
                    }
                    if attempt < RETRY_COUNT {
                        attempt += 1;
                        tokio::time::sleep(backoff(attempt)).await;
                        continue;
                    }
                    self.breaker.record_failure();
                    return Err(err.into());
                }
            }
        }
    }

    /// Unwrap the `{status, data, error}` envelope.
    async fn parse_envelope(
        &self,
        response: reqwest::Response,
    ) -> Result<serde_json::Value, ClientError> {
        let code = response.status();
        if code.as_u16() >= 400 {
            return Err(ClientError::StatusCode {
                code: code.as_u16(),
            });
        }

        let envelope: Envelope<serde_json::Value> = response
            .json()
            .await
            .map_err(|_| ClientError::UnknownResponseFormat)?;

        match envelope.status {
            Status::Success | Status::Warning => {
                Ok(envelope.data.unwrap_or(serde_json::Value::Null))
            }
            Status::Error => Err(ClientError::Server {
                details: envelope.error.unwrap_or_default(),
            }),
        }
    }
}

fn backoff(attempt: u32) -> Duration {
    RETRY_WAIT.saturating_mul(attempt).min(RETRY_MAX_WAIT)
}

fn read_ca(path: &str) -> Result<reqwest::Certificate, ClientError> {
    let pem = std::fs::read(path)
        .map_err(|e| ClientError::Tls(format!("failed to read {path}: {e}")))?;
    reqwest::Certificate::from_pem(&pem)
        .map_err(|e| ClientError::Tls(format!("invalid CA certificate {path}: {e}")))
}

fn read_identity(cert: &str, key: &str) -> Result<reqwest::Identity, ClientError> {
    let mut pem = std::fs::read(cert)
        .map_err(|e| ClientError::Tls(format!("failed to read {cert}: {e}")))?;
    let key_pem = std::fs::read(key)
        .map_err(|e| ClientError::Tls(format!("failed to read {key}: {e}")))?;
    pem.extend_from_slice(&key_pem);

    reqwest::Identity::from_pem(&pem)
        .map_err(|e| ClientError::Tls(format!("invalid client identity: {e}")))
}
