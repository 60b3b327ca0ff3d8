//! Daemon protocol: request/response types, one JSON document per line.

use serde::{Deserialize, Serialize};

use crate::graph::Checkpoint;

/// Request from a client to the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum Request {
    /// Groups and grants of a user
    #[serde(rename = "user")]
    UserDetails {
        name: String,
        #[serde(default)]
        cutoff: Option<usize>,
    },

    /// Members, ancestors and grants of a group
    #[serde(rename = "group")]
    GroupDetails {
        name: String,
        #[serde(default)]
        cutoff: Option<usize>,
        #[serde(default)]
        show_permission: Option<String>,
        #[serde(default = "default_true")]
        expose_aliases: bool,
    },

    /// Every group and service account holding a permission
    #[serde(rename = "permission")]
    PermissionDetails { name: String },

    #[serde(rename = "groups")]
    Groups {
        #[serde(default)]
        audited: bool,
        #[serde(default)]
        directly_audited: bool,
    },

    #[serde(rename = "permissions")]
    Permissions {
        #[serde(default)]
        audited: bool,
    },

    #[serde(rename = "disabled-groups")]
    DisabledGroups,

    #[serde(rename = "users")]
    Users,

    /// Checkpoint of the snapshot currently served
    #[serde(rename = "checkpoint")]
    Checkpoint,

    /// Snapshot sizes and refresh gauges
    #[serde(rename = "stats")]
    Stats,

    /// Rebuild now, ignoring the checkpoint
    #[serde(rename = "rebuild")]
    Rebuild,

    #[serde(rename = "ping")]
    Ping,

    #[serde(rename = "shutdown")]
    Shutdown,
}

fn default_true() -> bool {
    true
}

/// Response from the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum Response {
    /// Query result, stamped with the checkpoint of the snapshot it came from
    #[serde(rename = "ok")]
    Ok {
        checkpoint: i64,
        checkpoint_time: i64,
        data: serde_json::Value,
    },

    #[serde(rename = "error")]
    Error {
        message: String,
        /// The queried user or group does not exist.
        #[serde(default)]
        not_found: bool,
    },

    #[serde(rename = "pong")]
    Pong,

    #[serde(rename = "goodbye")]
    Goodbye,
}

impl Response {
    pub fn ok<T: Serialize>(checkpoint: Checkpoint, data: T) -> Self {
        Response::Ok {
            checkpoint: checkpoint.counter,
            checkpoint_time: checkpoint.timestamp,
            data: serde_json::to_value(data).unwrap_or(serde_json::Value::Null),
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Response::Error {
            message: msg.into(),
            not_found: false,
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Response::Error {
            message: msg.into(),
            not_found: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let req: Request = serde_json::from_str(r#"{"command":"group","name":"team-sre"}"#).unwrap();
        assert_eq!(
            req,
            Request::GroupDetails {
                name: "team-sre".into(),
                cutoff: None,
                show_permission: None,
                expose_aliases: true,
            }
        );
        let req: Request = serde_json::from_str(r#"{"command":"groups","audited":true}"#).unwrap();
        assert_eq!(
            req,
            Request::Groups {
                audited: true,
                directly_audited: false
            }
        );
        let json = serde_json::to_string(&Request::DisabledGroups).unwrap();
        assert_eq!(json, r#"{"command":"disabled-groups"}"#);
    }

    #[test]
    fn test_ok_envelope_carries_checkpoint() {
        let resp = Response::ok(Checkpoint::new(7, 1_600_000_000), vec!["a"]);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["checkpoint"], 7);
        assert_eq!(json["checkpoint_time"], 1_600_000_000);
        assert_eq!(json["data"][0], "a");
    }

    #[test]
    fn test_error_response() {
        let json = serde_json::to_string(&Response::not_found("user not found: x")).unwrap();
        let back: Response = serde_json::from_str(&json).unwrap();
        assert_eq!(
            back,
            Response::Error {
                message: "user not found: x".into(),
                not_found: true
            }
        );
    }
}
