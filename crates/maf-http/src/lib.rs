//! Shared HTTP plumbing for the server and agent workers.
//!
//! Both processes expose the same kind of surface: a versioned JSON API
//! behind the common middleware pipeline (request id, logging, compression,
//! rate limiting, bearer-token auth) plus unauthenticated health endpoints,
//! optionally terminated with TLS or mTLS.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use maf_wire::{Envelope, Version};
use serde::Serialize;

mod error;
mod listen;
pub mod middleware;
mod tls;

pub use error::HttpError;
pub use listen::{ServeConfig, serve};
pub use tls::TlsSettings;

/// Liveness/readiness probes backing `/livez` and `/readyz`.
pub trait Healthcheck: Send + Sync + 'static {
    fn is_live(&self) -> bool;
    fn is_ready(&self) -> bool;
}

/// 200 envelope with a payload.
pub fn envelope_success<T: Serialize>(data: T) -> Response {
    Json(Envelope::success(data)).into_response()
}

/// 200 envelope with `data: null`.
pub fn envelope_ok() -> Response {
    Json(Envelope::<()>::ok()).into_response()
}

/// Application errors answer 200 with the error carried in-band.
pub fn envelope_error(message: impl Into<String>) -> Response {
    Json(Envelope::<()>::error(message)).into_response()
}

/// `GET /version` — unauthenticated application version.
pub async fn version_handler() -> Response {
    envelope_success(Version {
        version: maf_wire::app_version().to_string(),
    })
}

/// Health endpoints outside the versioned API.
pub fn health_routes(check: Arc<dyn Healthcheck>) -> axum::Router {
    axum::Router::new()
        .route("/livez", get(livez))
        .route("/readyz", get(readyz))
        .with_state(check)
}

async fn livez(State(check): State<Arc<dyn Healthcheck>>) -> Response {
    if check.is_live() {
        (StatusCode::OK, "OK").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable").into_response()
    }
}

async fn readyz(State(check): State<Arc<dyn Healthcheck>>) -> Response {
    if check.is_ready() {
        (StatusCode::OK, "OK").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable").into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    struct Probe {
        live: bool,
        ready: bool,
    }

    impl Healthcheck for Probe {
        fn is_live(&self) -> bool {
            self.live
        }

        fn is_ready(&self) -> bool {
            self.ready
        }
    }

    async fn status_of(router: axum::Router, path: &str) -> StatusCode {
        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .uri(path)
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        response.status()
    }

    #[tokio::test]
    async fn health_routes_reflect_probe_state() {
        let healthy = health_routes(Arc::new(Probe {
            live: true,
            ready: true,
        }));
        assert_eq!(status_of(healthy.clone(), "/livez").await, StatusCode::OK);
        assert_eq!(status_of(healthy, "/readyz").await, StatusCode::OK);

        let unhealthy = health_routes(Arc::new(Probe {
            live: false,
            ready: false,
        }));
        assert_eq!(
            status_of(unhealthy.clone(), "/livez").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(unhealthy, "/readyz").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn version_handler_wraps_the_crate_version() {
        let response = version_handler().await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let envelope: Envelope<Version> = serde_json::from_slice(&body).unwrap();
        assert!(envelope.is_success());
        assert_eq!(envelope.data.unwrap().version, maf_wire::app_version());
    }
}
