//! Client behavior against a live test server.

use axum::Json;
use axum::extract::Path;
use axum::http::HeaderMap;
use axum::routing::{delete, get, post};
use maf_client::{Client, ClientError};
use maf_wire::{ClusterInfo, Envelope, JoinRequest, KvGetResponse, ServerEntry};

async fn spawn_server(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });

    format!("http://{addr}")
}

#[tokio::test]
async fn join_sends_auth_and_body() {
    let router = axum::Router::new().route(
        "/api/v1alpha/raft/join",
        post(|headers: HeaderMap, Json(body): Json<JoinRequest>| async move {
            assert_eq!(headers.get("X-Auth-Token").unwrap(), "root");
            assert!(
                headers
                    .get("User-Agent")
                    .unwrap()
                    .to_str()
                    .unwrap()
                    .starts_with("maf/")
            );
            assert_eq!(body.server_id, "server-1");
            assert_eq!(body.addr, "127.0.0.1:7081");
            Json(Envelope::<()>::ok())
        }),
    );
    let host = spawn_server(router).await;

    let client = Client::new(&host, false).unwrap();
    client.raft_join("server-1", "127.0.0.1:7081").await.unwrap();
}

#[tokio::test]
async fn in_band_error_surfaces_as_server_error() {
    let router = axum::Router::new().route(
        "/api/v1alpha/raft/join",
        post(|| async { Json(Envelope::<()>::error("internal error")) }),
    );
    let host = spawn_server(router).await;

    let client = Client::new(&host, false).unwrap();
    let err = client
        .raft_join("server-1", "127.0.0.1:7081")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Server { details } if details == "internal error"));
}

#[tokio::test]
async fn missing_route_maps_to_status_code_error() {
    let host = spawn_server(axum::Router::new()).await;

    let client = Client::new(&host, false).unwrap();
    let err = client.raft_forget("server-1").await.unwrap_err();
    assert!(matches!(err, ClientError::StatusCode { code: 404 }));
}

#[tokio::test]
async fn non_envelope_body_is_unknown_format() {
    let router = axum::Router::new().route(
        "/api/v1alpha/raft/forget",
        post(|| async { "not json at all" }),
    );
    let host = spawn_server(router).await;

    let client = Client::new(&host, false).unwrap();
    let err = client.raft_forget("server-1").await.unwrap_err();
    assert!(matches!(err, ClientError::UnknownResponseFormat));
}

#[tokio::test]
async fn kv_get_parses_payload() {
    let router = axum::Router::new().route(
        "/api/v1alpha/raft/kv/{key}",
        get(|Path(key): Path<String>| async move {
            Json(Envelope::success(KvGetResponse {
                key,
                value: "v".to_string(),
                exist: true,
            }))
        }),
    );
    let host = spawn_server(router).await;

    let client = Client::new(&host, false).unwrap();
    let (value, exist) = client.raft_kv_get("k").await.unwrap();
    assert_eq!(value, "v");
    assert!(exist);
}

#[tokio::test]
async fn kv_get_missing_key_reports_absence() {
    let router = axum::Router::new().route(
        "/api/v1alpha/raft/kv/{key}",
        get(|Path(key): Path<String>| async move {
            Json(Envelope::success(KvGetResponse {
                key,
                value: String::new(),
                exist: false,
            }))
        }),
    );
    let host = spawn_server(router).await;

    let client = Client::new(&host, false).unwrap();
    let (value, exist) = client.raft_kv_get("missing").await.unwrap();
    assert_eq!(value, "");
    assert!(!exist);
}

#[tokio::test]
async fn kv_get_rejects_non_object_data() {
    let router = axum::Router::new().route(
        "/api/v1alpha/raft/kv/{key}",
        get(|| async { Json(Envelope::success(vec!["not", "an", "object"])) }),
    );
    let host = spawn_server(router).await;

    let client = Client::new(&host, false).unwrap();
    let err = client.raft_kv_get("k").await.unwrap_err();
    assert!(matches!(err, ClientError::UnknownResponseFormat));
}

#[tokio::test]
async fn kv_set_and_delete_round_trip() {
    let router = axum::Router::new()
        .route(
            "/api/v1alpha/raft/kv",
            post(|Json(body): Json<maf_wire::KvSetRequest>| async move {
                assert_eq!(body.key, "k");
                assert_eq!(body.value, "v");
                Json(Envelope::<()>::ok())
            }),
        )
        .route(
            "/api/v1alpha/raft/kv/{key}",
            delete(|Path(key): Path<String>| async move {
                assert_eq!(key, "k");
                Json(Envelope::<()>::ok())
            }),
        );
    let host = spawn_server(router).await;

    let client = Client::new(&host, false).unwrap();
    client.raft_kv_set("k", "v").await.unwrap();
    client.raft_kv_delete("k").await.unwrap();
}

#[tokio::test]
async fn info_parses_cluster_payload() {
    let router = axum::Router::new().route(
        "/api/v1alpha/raft/info",
        get(
            |axum::extract::Query(params): axum::extract::Query<
                std::collections::HashMap<String, String>,
            >| async move {
                assert_eq!(params.get("include_stats").map(String::as_str), Some("true"));
                Json(Envelope::success(ClusterInfo {
                    state: "Leader".to_string(),
                    id: "a".to_string(),
                    addr: "127.0.0.1:7081".to_string(),
                    servers: vec![ServerEntry {
                        id: "a".to_string(),
                        address: "127.0.0.1:7081".to_string(),
                        suffrage: "Voter".to_string(),
                        leader: true,
                    }],
                    stats: Some(std::collections::BTreeMap::new()),
                }))
            },
        ),
    );
    let host = spawn_server(router).await;

    let client = Client::new(&host, false).unwrap();
    let info = client.raft_info(true).await.unwrap();
    assert_eq!(info.state, "Leader");
    assert_eq!(info.servers.len(), 1);
    assert!(info.servers[0].leader);
}
