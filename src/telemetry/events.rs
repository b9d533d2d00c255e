//! Audit event types.
//!
//! Every remote command that reaches the host leaves a trail in syslog, so
//! "who muted me" and "why did the meeting end" can be answered afterwards.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::automation::CommandOutcome;
use crate::control::protocol::CommandVerb;

/// Audit events written to syslog.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    /// The command server is listening.
    ServerStart {
        /// Socket path.
        socket_path: String,
        /// Process ID of the host.
        pid: u32,
    },

    /// The command server stopped.
    ServerStop {
        /// Socket path.
        socket_path: String,
    },

    /// A controller connected.
    ClientConnected {
        /// Connection identifier.
        connection: Uuid,
    },

    /// A controller connection ended.
    ClientDisconnected {
        /// Connection identifier.
        connection: Uuid,
        /// Why the connection ended.
        reason: String,
    },

    /// A command verb was received.
    CommandReceived {
        /// Connection identifier.
        connection: Uuid,
        /// The verb.
        verb: CommandVerb,
    },

    /// A command finished without error.
    CommandCompleted {
        /// Connection identifier.
        connection: Uuid,
        /// The verb.
        verb: CommandVerb,
        /// What the engine did.
        outcome: CommandOutcome,
        /// Execution time in milliseconds.
        duration_ms: u64,
    },

    /// A command failed.
    CommandFailed {
        /// Connection identifier.
        connection: Uuid,
        /// The verb.
        verb: CommandVerb,
        /// Error message.
        error: String,
    },

    /// A command named a verb that does not exist.
    UnknownCommand {
        /// Connection identifier.
        connection: Uuid,
        /// The value as received.
        value: String,
    },
}

/// Wrapper for serializing events with timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct TimestampedEvent<'a> {
    /// ISO8601 timestamp.
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,

    /// The event (flattened into this struct).
    #[serde(flatten)]
    pub event: &'a AuditEvent,
}

impl AuditEvent {
    /// Wrap this event with a timestamp for serialization.
    pub fn with_timestamp(&self) -> TimestampedEvent<'_> {
        TimestampedEvent {
            timestamp: Utc::now(),
            event: self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_start_serialization() {
        let event = AuditEvent::ServerStart {
            socket_path: "/tmp/rapidscontrol.sock".to_string(),
            pid: 12345,
        };

        let json = serde_json::to_string(&event.with_timestamp()).unwrap();

        assert!(json.contains("\"event\":\"server_start\""));
        assert!(json.contains("\"socket_path\":\"/tmp/rapidscontrol.sock\""));
        assert!(json.contains("\"pid\":12345"));
        assert!(json.contains("\"ts\""));
    }

    #[test]
    fn test_command_completed_serialization() {
        let event = AuditEvent::CommandCompleted {
            connection: Uuid::nil(),
            verb: CommandVerb::VideoOff,
            outcome: CommandOutcome::AlreadySatisfied,
            duration_ms: 3,
        };

        let json = serde_json::to_string(&event.with_timestamp()).unwrap();

        assert!(json.contains("\"event\":\"command_completed\""));
        assert!(json.contains("\"verb\":\"videoOff\""));
        assert!(json.contains("\"outcome\":\"already_satisfied\""));
        assert!(json.contains("\"connection\":\"00000000-0000-0000-0000-000000000000\""));
    }

    #[test]
    fn test_command_failed_serialization() {
        let event = AuditEvent::CommandFailed {
            connection: Uuid::new_v4(),
            verb: CommandVerb::EndForAll,
            error: "Target application is not running".to_string(),
        };

        let json = serde_json::to_string(&event.with_timestamp()).unwrap();

        assert!(json.contains("\"event\":\"command_failed\""));
        assert!(json.contains("\"verb\":\"endForAll\""));
        assert!(json.contains("not running"));
    }

    #[test]
    fn test_unknown_command_serialization() {
        let event = AuditEvent::UnknownCommand {
            connection: Uuid::new_v4(),
            value: "dance".to_string(),
        };

        let json = serde_json::to_string(&event.with_timestamp()).unwrap();

        assert!(json.contains("\"event\":\"unknown_command\""));
        assert!(json.contains("\"value\":\"dance\""));
    }
}
