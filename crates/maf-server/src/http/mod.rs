//! HTTP API assembly.

use std::sync::Arc;

use axum::Router;
use axum::middleware::from_fn;
use maf_consensus::Consensus;
use maf_http::{Healthcheck, middleware};

mod v1alpha;

/// Request-scoped capabilities handed to handlers.
#[derive(Clone)]
pub struct AppState {
    pub consensus: Arc<dyn Consensus>,
}

/// The full server router: versioned API behind auth, health endpoints
/// outside it, common middleware around everything.
pub fn build_router(state: AppState, health: Arc<dyn Healthcheck>) -> Router {
    let api = v1alpha::routes(state)
        .route_layer(from_fn(middleware::auth))
        .route_layer(from_fn(middleware::api_version_header));

    let app = Router::new()
        .nest(maf_wire::API_PREFIX, api)
        .merge(maf_http::health_routes(health))
        .layer(from_fn(middleware::server_header));

    middleware::attach_generic(app, middleware::rate_limiter())
}
