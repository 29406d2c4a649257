//! Wire types: host event envelopes and daemon command/response messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;

/// Status tag reported by the host for a session.
///
/// The host emits an open-ended set of tags. Only `idle` carries meaning
/// here; every other tag is kept verbatim as an active status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SessionStatus {
    /// Session stopped producing activity and awaits user input
    Idle,
    /// Any other host status (busy, retry, ...)
    Active(String),
}

impl SessionStatus {
    pub const IDLE_TAG: &'static str = "idle";

    pub fn from_tag(tag: &str) -> Self {
        if tag == Self::IDLE_TAG {
            SessionStatus::Idle
        } else {
            SessionStatus::Active(tag.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SessionStatus::Idle => Self::IDLE_TAG,
            SessionStatus::Active(tag) => tag,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, SessionStatus::Idle)
    }
}

impl From<String> for SessionStatus {
    fn from(tag: String) -> Self {
        if tag == Self::IDLE_TAG {
            SessionStatus::Idle
        } else {
            SessionStatus::Active(tag)
        }
    }
}

impl From<SessionStatus> for String {
    fn from(status: SessionStatus) -> Self {
        match status {
            SessionStatus::Idle => SessionStatus::IDLE_TAG.to_string(),
            SessionStatus::Active(tag) => tag,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A host event reduced to the two facts the tracker consumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub session_id: String,
    pub status: SessionStatus,
}

/// Result of normalizing a raw host event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// `session.status` or `session.idle`, routed to the tracker
    Update(StatusUpdate),
    /// Well-formed event of a type the bridge does not track
    Ignored { kind: String },
    /// Payload did not have the expected shape
    Malformed { reason: String },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    properties: Value,
}

#[derive(Debug, Deserialize)]
struct StatusProperties {
    #[serde(rename = "sessionID")]
    session_id: String,
    status: StatusBody,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct IdleProperties {
    #[serde(rename = "sessionID")]
    session_id: String,
}

pub const SESSION_STATUS_EVENT: &str = "session.status";
pub const SESSION_IDLE_EVENT: &str = "session.idle";

impl HostEvent {
    /// Normalize both accepted envelope shapes into a single status update.
    ///
    /// `session.status` carries the tag in `properties.status.type`;
    /// `session.idle` carries the idle condition in its own type tag.
    pub fn normalize(value: Value) -> Self {
        let envelope: Envelope = match serde_json::from_value(value) {
            Ok(envelope) => envelope,
            Err(e) => {
                return HostEvent::Malformed {
                    reason: format!("bad envelope: {}", e),
                }
            }
        };

        let Envelope { kind, properties } = envelope;
        let update = if kind == SESSION_STATUS_EVENT {
            serde_json::from_value::<StatusProperties>(properties).map(|p| StatusUpdate {
                session_id: p.session_id,
                status: SessionStatus::from_tag(&p.status.kind),
            })
        } else if kind == SESSION_IDLE_EVENT {
            serde_json::from_value::<IdleProperties>(properties).map(|p| StatusUpdate {
                session_id: p.session_id,
                status: SessionStatus::Idle,
            })
        } else {
            return HostEvent::Ignored { kind };
        };

        match update {
            Ok(update) if update.session_id.is_empty() => HostEvent::Malformed {
                reason: format!("{}: empty sessionID", kind),
            },
            Ok(update) => HostEvent::Update(update),
            Err(e) => HostEvent::Malformed {
                reason: format!("{}: {}", kind, e),
            },
        }
    }

    /// Parse a raw JSON line and normalize it
    pub fn parse(line: &str) -> Self {
        match serde_json::from_str::<Value>(line) {
            Ok(value) => Self::normalize(value),
            Err(e) => HostEvent::Malformed {
                reason: format!("invalid JSON: {}", e),
            },
        }
    }
}

/// Last observed status of one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub last_status: SessionStatus,
}

/// Commands sent to the daemon, one JSON object per line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DaemonCommand {
    /// Raw host event, normalized by the daemon
    Event(Value),
    /// List tracked sessions
    GetState,
    /// Request daemon status
    Status,
    /// Graceful shutdown
    Shutdown,
    /// Health check
    Ping,
}

/// Response from daemon, one per command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DaemonResponse {
    /// Command handled, nothing further to report
    Ok,
    /// The event was an idle transition and a notification was scheduled
    Notified { session_id: String },
    /// Tracked sessions, sorted by id
    State { sessions: Vec<SessionRecord> },
    Status {
        running: bool,
        session_count: usize,
        uptime_secs: u64,
    },
    Pong,
    Error { message: String },
}

/// Directory holding the socket, PID file and debug log
pub fn get_runtime_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("opencode-idle")
}

/// Socket path for daemon communication
pub fn get_socket_path() -> PathBuf {
    get_runtime_dir().join("daemon.sock")
}

/// PID file path for daemon
pub fn get_pid_file_path() -> PathBuf {
    get_runtime_dir().join("daemon.pid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    mod normalize {
        use super::*;

        #[test]
        fn test_session_status_nested_type() {
            let event = json!({
                "type": "session.status",
                "properties": { "sessionID": "ses_1", "status": { "type": "busy" } }
            });
            assert_eq!(
                HostEvent::normalize(event),
                HostEvent::Update(StatusUpdate {
                    session_id: "ses_1".to_string(),
                    status: SessionStatus::Active("busy".to_string()),
                })
            );
        }

        #[test]
        fn test_session_status_idle_maps_to_idle() {
            let event = json!({
                "type": "session.status",
                "properties": { "sessionID": "ses_1", "status": { "type": "idle" } }
            });
            match HostEvent::normalize(event) {
                HostEvent::Update(update) => assert!(update.status.is_idle()),
                other => panic!("unexpected: {:?}", other),
            }
        }

        #[test]
        fn test_session_idle_envelope() {
            let event = json!({ "type": "session.idle", "properties": { "sessionID": "ses_2" } });
            assert_eq!(
                HostEvent::normalize(event),
                HostEvent::Update(StatusUpdate {
                    session_id: "ses_2".to_string(),
                    status: SessionStatus::Idle,
                })
            );
        }

        #[test]
        fn test_extra_fields_are_tolerated() {
            let event = json!({
                "type": "session.status",
                "properties": {
                    "sessionID": "ses_1",
                    "status": { "type": "retry", "attempt": 2 },
                    "extra": true
                }
            });
            assert!(matches!(HostEvent::normalize(event), HostEvent::Update(_)));
        }

        #[test]
        fn test_unrelated_type_is_ignored() {
            let event = json!({ "type": "message.updated", "properties": {} });
            assert_eq!(
                HostEvent::normalize(event),
                HostEvent::Ignored {
                    kind: "message.updated".to_string()
                }
            );
        }

        #[test]
        fn test_missing_status_is_malformed() {
            let event = json!({ "type": "session.status", "properties": { "sessionID": "s" } });
            assert!(matches!(HostEvent::normalize(event), HostEvent::Malformed { .. }));
        }

        #[test]
        fn test_missing_session_id_is_malformed() {
            let event = json!({ "type": "session.idle", "properties": {} });
            assert!(matches!(HostEvent::normalize(event), HostEvent::Malformed { .. }));
        }

        #[test]
        fn test_empty_session_id_is_malformed() {
            let event = json!({ "type": "session.idle", "properties": { "sessionID": "" } });
            assert!(matches!(HostEvent::normalize(event), HostEvent::Malformed { .. }));
        }

        #[test]
        fn test_non_object_is_malformed() {
            assert!(matches!(
                HostEvent::normalize(json!([1, 2, 3])),
                HostEvent::Malformed { .. }
            ));
        }

        #[test]
        fn test_parse_invalid_json() {
            assert!(matches!(HostEvent::parse("{not json"), HostEvent::Malformed { .. }));
        }
    }

    mod wire {
        use super::*;

        #[test]
        fn test_status_serializes_as_plain_string() {
            let record = SessionRecord {
                session_id: "s".to_string(),
                last_status: SessionStatus::Idle,
            };
            let json = serde_json::to_value(&record).unwrap();
            assert_eq!(json, json!({ "session_id": "s", "last_status": "idle" }));
        }

        #[test]
        fn test_event_command_shape() {
            let line = r#"{"Event":{"type":"session.idle","properties":{"sessionID":"s"}}}"#;
            let command: DaemonCommand = serde_json::from_str(line).unwrap();
            assert!(matches!(command, DaemonCommand::Event(_)));
        }

        #[test]
        fn test_unit_command_shape() {
            let command: DaemonCommand = serde_json::from_str(r#""Ping""#).unwrap();
            assert!(matches!(command, DaemonCommand::Ping));
        }
    }
}
