//! Request body validation helpers.

use std::fmt;

/// A single failed constraint on a request field.
///
/// Mirrors the `field 'x' failed on tag 'y'` shape that the API reports to
/// callers, so validation messages stay stable across server versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub tag: &'static str,
}

impl FieldError {
    pub fn new(field: &'static str, tag: &'static str) -> Self {
        Self { field, tag }
    }

    pub fn required(field: &'static str) -> Self {
        Self::new(field, "required")
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field '{}' failed on tag '{}'", self.field, self.tag)
    }
}

impl std::error::Error for FieldError {}

/// Loose `host:port` check for raft transport addresses.
///
/// Hostnames are accepted without resolution; only the shape is validated.
pub fn is_tcp_addr(addr: &str) -> bool {
    let Some((host, port)) = addr.rsplit_once(':') else {
        return false;
    };
    if host.is_empty() {
        return false;
    }
    port.parse::<u16>().is_ok()
}
