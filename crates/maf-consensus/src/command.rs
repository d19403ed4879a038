//! Commands applied to the replicated state machine, and their log encoding.
//!
//! Commands are serialized as JSON with an integer `op` tag (`set = 0`,
//! `delete = 1`); `key` and `value` are omitted when empty. An out-of-range
//! tag fails decoding with [`CommandError::InvalidOpType`] so corrupt
//! records never reach the state machine.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

const OP_SET: u8 = 0;
const OP_DELETE: u8 = 1;

#[derive(Debug, Error)]
pub enum CommandError {
    /// The `op` tag is outside the known set. Encountered during decode it
    /// means the replicated log is corrupt.
    #[error("invalid op type")]
    InvalidOpType,

    #[error("malformed command: {0}")]
    Malformed(#[source] serde_json::Error),
}

/// Operation tag of a [`Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Set,
    Delete,
}

impl Serialize for Op {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let tag = match self {
            Op::Set => OP_SET,
            Op::Delete => OP_DELETE,
        };
        serializer.serialize_u8(tag)
    }
}

impl<'de> Deserialize<'de> for Op {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match u8::deserialize(deserializer)? {
            OP_SET => Ok(Op::Set),
            OP_DELETE => Ok(Op::Delete),
            other => Err(D::Error::custom(format!("invalid op type {other}"))),
        }
    }
}

/// One record of the replicated log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub op: Op,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
}

impl Command {
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            op: Op::Set,
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            op: Op::Delete,
            key: key.into(),
            value: String::new(),
        }
    }
}

/// Serialize a command for the replicated log.
pub fn encode(cmd: &Command) -> Result<Vec<u8>, CommandError> {
    serde_json::to_vec(cmd).map_err(CommandError::Malformed)
}

/// Decode a command from a log record.
pub fn decode(data: &[u8]) -> Result<Command, CommandError> {
    serde_json::from_slice(data).map_err(|err| {
        if err.to_string().contains("invalid op type") {
            CommandError::InvalidOpType
        } else {
            CommandError::Malformed(err)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_set() {
        let cmd = Command::set("k", "v");
        let data = encode(&cmd).unwrap();
        assert_eq!(decode(&data).unwrap(), cmd);
    }

    #[test]
    fn round_trip_delete() {
        let cmd = Command::delete("k");
        let data = encode(&cmd).unwrap();
        assert_eq!(decode(&data).unwrap(), cmd);
    }

    #[test]
    fn wire_format_uses_integer_tags() {
        let json: serde_json::Value =
            serde_json::from_slice(&encode(&Command::set("k", "v")).unwrap()).unwrap();
        assert_eq!(json["op"], 0);
        assert_eq!(json["key"], "k");
        assert_eq!(json["value"], "v");

        let json: serde_json::Value =
            serde_json::from_slice(&encode(&Command::delete("k")).unwrap()).unwrap();
        assert_eq!(json["op"], 1);
        assert!(json.get("value").is_none());
    }

    #[test]
    fn decode_rejects_unknown_op_tag() {
        let err = decode(br#"{"op": 7, "key": "k"}"#).unwrap_err();
        assert!(matches!(err, CommandError::InvalidOpType));
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode(b"{not-json").unwrap_err();
        assert!(matches!(err, CommandError::Malformed(_)));
    }

    #[test]
    fn empty_key_round_trips_via_default() {
        let cmd = Command::set("", "");
        let data = encode(&cmd).unwrap();
        let decoded = decode(&data).unwrap();
        assert_eq!(decoded.key, "");
        assert_eq!(decoded.value, "");
    }
}
