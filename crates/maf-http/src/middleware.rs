//! The common middleware pipeline.
//!
//! Outermost to innermost: request-id assignment, request logging,
//! compression, request-id propagation, rate limiting. Auth is attached by
//! the caller to the versioned API group only, so health endpoints stay
//! unauthenticated; URLs ending in `/version` bypass auth as well. The
//! server identification header is likewise attached by the caller, around
//! its whole router.

use std::num::NonZeroU32;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{Next, from_fn, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tower_http::compression::CompressionLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::Instrument;

use crate::envelope_error;

/// The single static API key. The auth model is deliberately minimal.
const API_KEY: &str = "root";

/// 100 requests per 30 seconds.
const RATE_LIMIT_BURST: u32 = 100;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(30);

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Process-wide direct limiter for the configured window.
pub fn rate_limiter() -> Arc<DefaultDirectRateLimiter> {
    let burst = NonZeroU32::new(RATE_LIMIT_BURST).expect("burst is non-zero");
    let period = RATE_LIMIT_WINDOW / RATE_LIMIT_BURST;
    let quota = Quota::with_period(period)
        .expect("period is non-zero")
        .allow_burst(burst);
    Arc::new(RateLimiter::direct(quota))
}

/// Attach the generic middleware stack shared by every worker.
pub fn attach_generic(router: Router, limiter: Arc<DefaultDirectRateLimiter>) -> Router {
    router
        .layer(from_fn_with_state(limiter, rate_limit))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(CompressionLayer::new())
        .layer(from_fn(log_requests))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Static bearer-token auth with constant-time comparison.
///
/// Comparison runs over SHA-256 digests so the timing profile is
/// independent of the provided key length.
pub async fn auth(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_ascii_lowercase();
    if path.ends_with("/version") {
        tracing::trace!(%path, "URL is unprotected");
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get(maf_wire::AUTH_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let expected = Sha256::digest(API_KEY.as_bytes());
    let got = Sha256::digest(provided.as_bytes());

    if expected.ct_eq(&got).into() {
        next.run(request).await
    } else {
        tracing::warn!("API key is missing or malformed");
        envelope_error("missing or malformed API key")
    }
}

/// Adds the `X-API-Version` header to versioned API responses.
pub async fn api_version_header(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        "x-api-version",
        HeaderValue::from_static(maf_wire::API_VERSION),
    );
    response
}

/// Identifies the server on every response (`Server: maf-server/<ver>`),
/// mirroring the client's `User-Agent: maf/<ver>`.
pub async fn server_header(request: Request, next: Next) -> Response {
    static VALUE: OnceLock<HeaderValue> = OnceLock::new();
    let value = VALUE.get_or_init(|| {
        HeaderValue::from_str(&format!("maf-server/{}", maf_wire::app_version()))
            .expect("crate version is a valid header value")
    });

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(axum::http::header::SERVER, value.clone());
    response
}

async fn rate_limit(
    State(limiter): State<Arc<DefaultDirectRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    if limiter.check().is_err() {
        tracing::warn!("rate limit exceeded");
        return (StatusCode::TOO_MANY_REQUESTS, "Too Many Requests").into_response();
    }
    next.run(request).await
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let span = tracing::info_span!("request", %method, %path, %request_id);
    let started = Instant::now();

    let response = next.run(request).instrument(span).await;

    tracing::debug!(
        %method,
        %path,
        %request_id,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request finished"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use axum::routing::get;
    use tower::ServiceExt;

    fn protected_router() -> Router {
        Router::new()
            .route("/api/v1alpha/version", get(|| async { "ok" }))
            .route("/api/v1alpha/raft/info", get(|| async { "ok" }))
            .route_layer(from_fn(auth))
    }

    async fn send(router: Router, uri: &str, token: Option<&str>) -> Response {
        let mut builder = HttpRequest::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(maf_wire::AUTH_HEADER, token);
        }
        router
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn version_bypasses_auth() {
        let response = send(protected_router(), "/api/v1alpha/version", None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_token_is_rejected_in_band() {
        let response = send(protected_router(), "/api/v1alpha/raft/info", None).await;
        // Application-level failure: HTTP 200 with an error envelope.
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let envelope: maf_wire::Envelope<()> = serde_json::from_slice(&body).unwrap();
        assert_eq!(envelope.status, maf_wire::Status::Error);
    }

    #[tokio::test]
    async fn wrong_token_is_rejected_and_right_token_passes() {
        let rejected = send(protected_router(), "/api/v1alpha/raft/info", Some("nope")).await;
        let body = axum::body::to_bytes(rejected.into_body(), 1024).await.unwrap();
        let envelope: maf_wire::Envelope<()> = serde_json::from_slice(&body).unwrap();
        assert_eq!(envelope.status, maf_wire::Status::Error);

        let accepted = send(protected_router(), "/api/v1alpha/raft/info", Some("root")).await;
        let body = axum::body::to_bytes(accepted.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn rate_limiter_eventually_rejects() {
        let limiter = rate_limiter();
        let router = attach_generic(
            Router::new().route("/ping", get(|| async { "pong" })),
            limiter,
        );

        let mut limited = false;
        for _ in 0..=RATE_LIMIT_BURST {
            let response = send(router.clone(), "/ping", None).await;
            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                limited = true;
                break;
            }
        }
        assert!(limited, "burst exhaustion must trip the limiter");
    }

    #[tokio::test]
    async fn request_id_is_assigned_and_echoed() {
        let router = attach_generic(
            Router::new().route("/ping", get(|| async { "pong" })),
            rate_limiter(),
        );

        let response = send(router, "/ping", None).await;
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn server_header_identifies_the_server() {
        let router = Router::new()
            .route("/ping", get(|| async { "pong" }))
            .layer(from_fn(server_header));

        let response = send(router, "/ping", None).await;
        let value = response
            .headers()
            .get(axum::http::header::SERVER)
            .unwrap()
            .to_str()
            .unwrap();
        assert_eq!(value, format!("maf-server/{}", maf_wire::app_version()));
    }
}
