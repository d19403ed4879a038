//! Wire types for the maf `v1alpha` HTTP API.
//!
//! Both the server and the client speak the same JSON surface: every
//! non-health response is wrapped in a [`Envelope`], request bodies are the
//! small structs defined here, and errors travel in-band as
//! `status = "error"` rather than through HTTP status codes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

mod validate;

pub use validate::{FieldError, is_tcp_addr};

/// Prefix of all versioned API routes.
pub const API_PREFIX: &str = "/api/v1alpha";

/// API version identifier, echoed in the `X-API-Version` response header.
pub const API_VERSION: &str = "v1alpha";

/// Header carrying the static bearer token.
pub const AUTH_HEADER: &str = "X-Auth-Token";

/// Reserved key under which the current leader publishes its HTTP
/// advertise URL.
pub const LEADER_API_ADDR_KEY: &str = "leaderAPIAddr";

/// Application version, taken from the workspace at build time.
pub fn app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Outcome class of an API response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
    Warning,
}

/// Uniform response wrapper.
///
/// Application errors are carried in-band: the HTTP status stays 200 and
/// `status`/`error` describe the failure. Status codes >= 400 are reserved
/// for transport and middleware failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub status: Status,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: Status::Success,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            data: None,
            error: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

impl Envelope<()> {
    /// A bare success with no payload (`data: null`).
    pub fn ok() -> Self {
        Self {
            status: Status::Success,
            data: None,
            error: None,
        }
    }
}

/// Application version payload of `GET /version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    pub version: String,
}

/// Body of `POST /raft/join`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    #[serde(rename = "serverId")]
    pub server_id: String,
    pub addr: String,
}

impl JoinRequest {
    pub fn validate(&self) -> Result<(), FieldError> {
        if self.server_id.is_empty() {
            return Err(FieldError::required("serverId"));
        }
        if self.addr.is_empty() {
            return Err(FieldError::required("addr"));
        }
        if !is_tcp_addr(&self.addr) {
            return Err(FieldError::new("addr", "tcp_addr"));
        }
        Ok(())
    }
}

/// Body of `POST /raft/forget`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgetRequest {
    #[serde(rename = "serverId")]
    pub server_id: String,
}

impl ForgetRequest {
    pub fn validate(&self) -> Result<(), FieldError> {
        if self.server_id.is_empty() {
            return Err(FieldError::required("serverId"));
        }
        Ok(())
    }
}

/// Body of `POST /raft/kv`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvSetRequest {
    pub key: String,
    /// Empty string is a valid value, distinct from absence.
    #[serde(default)]
    pub value: String,
}

impl KvSetRequest {
    pub fn validate(&self) -> Result<(), FieldError> {
        if self.key.is_empty() {
            return Err(FieldError::required("key"));
        }
        Ok(())
    }
}

/// Payload of `GET /raft/kv/{key}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvGetResponse {
    pub key: String,
    pub value: String,
    pub exist: bool,
}

/// One cluster member as reported by `GET /raft/info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub id: String,
    pub address: String,
    pub suffrage: String,
    pub leader: bool,
}

/// Payload of `GET /raft/info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterInfo {
    /// Local node's raft role.
    pub state: String,
    pub id: String,
    pub addr: String,
    pub servers: Vec<ServerEntry>,
    /// Opaque runtime telemetry, present only when the caller opted in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<BTreeMap<String, String>>,
}
