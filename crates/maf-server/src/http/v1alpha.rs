//! `v1alpha` endpoint handlers.
//!
//! Every handler answers HTTP 200 with the `{status, data, error}`
//! envelope; consensus failures (including `not a leader`) travel in-band.

use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::{get, post};
use maf_http::{envelope_error, envelope_ok, envelope_success, version_handler};
use maf_wire::{ForgetRequest, JoinRequest, KvGetResponse, KvSetRequest};
use serde::Deserialize;

use super::AppState;

pub(crate) fn routes(state: AppState) -> Router {
    Router::new()
        .route("/version", get(version_handler))
        .route("/raft/join", post(raft_join))
        .route("/raft/forget", post(raft_forget))
        .route("/raft/info", get(raft_info))
        .route("/raft/kv", post(raft_kv_set))
        .route("/raft/kv/{key}", get(raft_kv_get).delete(raft_kv_delete))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct InfoQuery {
    #[serde(default)]
    include_stats: bool,
}

async fn raft_join(
    State(state): State<AppState>,
    body: Result<axum::Json<JoinRequest>, JsonRejection>,
) -> Response {
    let axum::Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return envelope_error(rejection.body_text()),
    };
    if let Err(err) = request.validate() {
        return envelope_error(err.to_string());
    }

    match state.consensus.join(&request.server_id, &request.addr).await {
        Ok(()) => envelope_ok(),
        Err(err) => envelope_error(err.to_string()),
    }
}

async fn raft_forget(
    State(state): State<AppState>,
    body: Result<axum::Json<ForgetRequest>, JsonRejection>,
) -> Response {
    let axum::Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return envelope_error(rejection.body_text()),
    };
    if let Err(err) = request.validate() {
        return envelope_error(err.to_string());
    }

    match state.consensus.forget(&request.server_id).await {
        Ok(()) => envelope_ok(),
        Err(err) => envelope_error(err.to_string()),
    }
}

async fn raft_info(State(state): State<AppState>, Query(query): Query<InfoQuery>) -> Response {
    match state.consensus.get_info(query.include_stats).await {
        Ok(info) => envelope_success(info),
        Err(err) => envelope_error(err.to_string()),
    }
}

async fn raft_kv_get(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    match state.consensus.get(&key) {
        Some(value) => envelope_success(KvGetResponse {
            key,
            value,
            exist: true,
        }),
        None => envelope_success(KvGetResponse {
            key,
            value: String::new(),
            exist: false,
        }),
    }
}

async fn raft_kv_set(
    State(state): State<AppState>,
    body: Result<axum::Json<KvSetRequest>, JsonRejection>,
) -> Response {
    let axum::Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return envelope_error(rejection.body_text()),
    };
    if let Err(err) = request.validate() {
        return envelope_error(err.to_string());
    }

    match state.consensus.set(&request.key, &request.value).await {
        Ok(()) => envelope_ok(),
        Err(err) => envelope_error(err.to_string()),
    }
}

async fn raft_kv_delete(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    match state.consensus.delete(&key).await {
        Ok(()) => envelope_ok(),
        Err(err) => envelope_error(err.to_string()),
    }
}
