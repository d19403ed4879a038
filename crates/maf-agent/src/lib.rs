//! The maf agent process.
//!
//! Runs alongside a monitored MySQL instance and exposes local status over
//! HTTP: the `v1alpha` version endpoint plus liveness/readiness probes.
//! The agent takes no part in consensus; its surface mirrors the server's
//! middleware conventions so operators and the server client can treat
//! both uniformly.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::middleware::from_fn;
use axum::routing::get;
use maf_http::{Healthcheck, ServeConfig, TlsSettings, middleware, version_handler};
use tokio_util::sync::CancellationToken;

/// Agent worker configuration, mapped from `agent.http.*`.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub addr: String,
    pub tls: TlsSettings,
    pub graceful_shutdown_timeout: Duration,
}

impl AgentConfig {
    pub fn from_http_config(http: &maf_config::HttpConfig) -> Self {
        Self {
            addr: http.addr.clone(),
            tls: TlsSettings {
                cert_file: http.cert_file.clone(),
                key_file: http.key_file.clone(),
                client_cert_file: http.client_cert_file.clone(),
            },
            graceful_shutdown_timeout: Duration::from_secs(http.graceful_shutdown_timeout),
        }
    }
}

/// Process-local health: the agent is live and ready as soon as it serves.
struct ProcessHealth;

impl Healthcheck for ProcessHealth {
    fn is_live(&self) -> bool {
        true
    }

    fn is_ready(&self) -> bool {
        true
    }
}

pub struct Agent {
    config: AgentConfig,
    stopped: CancellationToken,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Self {
        tracing::trace!("configuring agent");
        Self {
            config,
            stopped: CancellationToken::new(),
        }
    }

    pub fn router() -> Router {
        let api = Router::new()
            .route("/version", get(version_handler))
            .route_layer(from_fn(middleware::auth))
            .route_layer(from_fn(middleware::api_version_header));

        let app = Router::new()
            .nest(maf_wire::API_PREFIX, api)
            .merge(maf_http::health_routes(Arc::new(ProcessHealth)));

        middleware::attach_generic(app, middleware::rate_limiter())
    }

    /// Serve until stopped or a termination signal arrives.
    pub async fn run(&self) -> anyhow::Result<()> {
        tracing::info!("running agent");

        let serve = maf_http::serve(
            Self::router(),
            ServeConfig {
                addr: self.config.addr.clone(),
                tls: self.config.tls.clone(),
                graceful_shutdown_timeout: self.config.graceful_shutdown_timeout,
            },
            self.stopped.clone(),
        );
        tokio::pin!(serve);

        tokio::select! {
            result = &mut serve => result?,
            () = wait_for_termination() => {
                tracing::info!("termination signal received");
                self.stopped.cancel();
                (&mut serve).await?;
            }
        }

        Ok(())
    }

    pub fn stop(&self) {
        tracing::info!("stopping agent");
        self.stopped.cancel();
    }
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{SignalKind, signal};

    let (Ok(mut sigint), Ok(mut sigterm)) = (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) else {
        tracing::error!("failed to install signal handlers");
        return std::future::pending().await;
    };

    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn agent_serves_version_and_health() {
        let router = Agent::router();

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1alpha/version")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let envelope: maf_wire::Envelope<maf_wire::Version> =
            serde_json::from_slice(&body).unwrap();
        assert!(envelope.is_success());

        for path in ["/livez", "/readyz"] {
            let response = router
                .clone()
                .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }
}
