//! Wire protocol between controller and host.
//!
//! One UTF-8 JSON object per `\n`-terminated line:
//!
//! ```text
//! controller -> host   {"type":"command","command":"mute"}
//!                      {"type":"getStatus"}
//! host -> controller   {"type":"status","audioStatus":"muted","videoStatus":"on","meetingActive":true}
//!                      unknown command: <value>
//! ```
//!
//! Verb and status values are closed sets. A value outside them is reported
//! as unknown (for verbs) or rejected (for status fields), never coerced.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Maximum accepted line length, excluding the terminator.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Commands the controller can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandVerb {
    /// Mute the microphone.
    Mute,
    /// Unmute the microphone.
    Unmute,
    /// Start the camera.
    VideoOn,
    /// Stop the camera.
    VideoOff,
    /// End the meeting for every participant.
    EndForAll,
}

impl CommandVerb {
    /// Every verb, in wire order.
    pub const ALL: [CommandVerb; 5] = [
        CommandVerb::Mute,
        CommandVerb::Unmute,
        CommandVerb::VideoOn,
        CommandVerb::VideoOff,
        CommandVerb::EndForAll,
    ];

    /// The wire name of the verb.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            CommandVerb::Mute => "mute",
            CommandVerb::Unmute => "unmute",
            CommandVerb::VideoOn => "videoOn",
            CommandVerb::VideoOff => "videoOff",
            CommandVerb::EndForAll => "endForAll",
        }
    }
}

impl std::fmt::Display for CommandVerb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CommandVerb {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandVerb::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownCommand(s.to_string()))
    }
}

/// Microphone state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioStatus {
    /// Microphone muted.
    Muted,
    /// Microphone live.
    Unmuted,
    /// No meeting, or controls not found.
    #[default]
    Unknown,
}

/// Camera state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    /// Camera on.
    On,
    /// Camera off.
    Off,
    /// No meeting, or controls not found.
    #[default]
    Unknown,
}

/// One sample of the application's state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    /// Microphone state.
    pub audio_status: AudioStatus,
    /// Camera state.
    pub video_status: VideoStatus,
    /// Whether a meeting is in progress.
    pub meeting_active: bool,
}

impl std::fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "audio={} video={} meeting={}",
            serde_variant(&self.audio_status),
            serde_variant(&self.video_status),
            if self.meeting_active { "active" } else { "none" }
        )
    }
}

fn serde_variant<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(Value::String(s)) => s,
        _ => "?".to_string(),
    }
}

/// Errors decoding a protocol line.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The line is not valid JSON, or a field has the wrong shape.
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The line is not valid UTF-8.
    #[error("Line is not valid UTF-8")]
    InvalidUtf8,

    /// The line is valid JSON but not an object.
    #[error("Expected a JSON object")]
    NotAnObject,

    /// A required field is absent.
    #[error("Missing field '{0}'")]
    MissingField(&'static str),

    /// The `type` field names no known message.
    #[error("Unknown message type: {0}")]
    UnknownType(String),

    /// The `command` field names no known verb.
    #[error("unknown command: {0}")]
    UnknownCommand(String),
}

/// A decoded controller-to-host line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Execute a verb.
    Command(CommandVerb),
    /// Reply with the current status.
    GetStatus,
    /// A well-formed command whose verb is not known.
    UnknownCommand(String),
}

/// Decode one controller-to-host line (terminator already stripped).
///
/// A trailing `\r` is tolerated. An unrecognised verb is not an error; it
/// decodes to [`Inbound::UnknownCommand`] so the host can answer it.
pub fn decode_request(line: &[u8]) -> Result<Inbound, ProtocolError> {
    let line = std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8)?;
    let value: Value = serde_json::from_str(line.trim_end_matches('\r'))?;
    let obj = value.as_object().ok_or(ProtocolError::NotAnObject)?;

    let kind = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingField("type"))?;

    match kind {
        "getStatus" => Ok(Inbound::GetStatus),
        "command" => match obj.get("command") {
            Some(Value::String(verb)) => Ok(verb
                .parse::<CommandVerb>()
                .map_or_else(|_| Inbound::UnknownCommand(verb.clone()), Inbound::Command)),
            Some(Value::Null) | None => Err(ProtocolError::MissingField("command")),
            Some(other) => Ok(Inbound::UnknownCommand(other.to_string())),
        },
        other => Err(ProtocolError::UnknownType(other.to_string())),
    }
}

#[derive(Serialize)]
struct Request<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    command: &'a str,
}

/// Encode a command request (without terminator).
pub fn encode_command(verb: CommandVerb) -> String {
    let req = Request {
        kind: "command",
        command: verb.as_str(),
    };
    // Serialising a struct of two string fields cannot fail.
    serde_json::to_string(&req).unwrap_or_default()
}

/// Encode a status request (without terminator).
///
/// Carries an empty `command` field, which hosts ignore for `getStatus`.
pub fn encode_get_status() -> String {
    let req = Request {
        kind: "getStatus",
        command: "",
    };
    serde_json::to_string(&req).unwrap_or_default()
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum Outbound<'a> {
    Status(&'a StatusSnapshot),
}

/// Encode a status message (without terminator).
pub fn encode_status(snapshot: &StatusSnapshot) -> String {
    serde_json::to_string(&Outbound::Status(snapshot)).unwrap_or_default()
}

/// Text reply for an unrecognised verb (without terminator).
pub fn unknown_command_reply(value: &str) -> String {
    format!("unknown command: {value}")
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStatus {
    audio_status: AudioStatus,
    video_status: VideoStatus,
    meeting_active: Option<bool>,
}

/// A decoded host-to-controller line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerLine {
    /// A status message.
    Status(StatusSnapshot),
    /// Any other line, passed through as text.
    Text(String),
}

/// Decode one host-to-controller line (terminator already stripped).
///
/// Lines that are not a status message are returned as text. A status
/// message with an out-of-range field value is an error. A missing
/// `meetingActive` is derived from the audio status.
pub fn decode_server_line(line: &[u8]) -> Result<ServerLine, ProtocolError> {
    let line = std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8)?;
    let line = line.trim_end_matches('\r');

    let Ok(value) = serde_json::from_str::<Value>(line) else {
        return Ok(ServerLine::Text(line.to_string()));
    };
    if value.get("type").and_then(Value::as_str) != Some("status") {
        return Ok(ServerLine::Text(line.to_string()));
    }

    let raw: RawStatus = serde_json::from_value(value)?;
    Ok(ServerLine::Status(StatusSnapshot {
        audio_status: raw.audio_status,
        video_status: raw.video_status,
        meeting_active: raw
            .meeting_active
            .unwrap_or(raw.audio_status != AudioStatus::Unknown),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verb_wire_names() {
        for verb in CommandVerb::ALL {
            let json = serde_json::to_string(&verb).unwrap();
            assert_eq!(json, format!("\"{}\"", verb));
            assert_eq!(verb.as_str().parse::<CommandVerb>().unwrap(), verb);
        }
        assert!("VideoOn".parse::<CommandVerb>().is_err());
    }

    #[test]
    fn test_decode_command() {
        assert_eq!(
            decode_request(br#"{"type":"command","command":"videoOff"}"#).unwrap(),
            Inbound::Command(CommandVerb::VideoOff)
        );
        assert_eq!(
            decode_request(b"{\"type\":\"command\",\"command\":\"mute\"}\r").unwrap(),
            Inbound::Command(CommandVerb::Mute)
        );
    }

    #[test]
    fn test_decode_get_status_ignores_command_field() {
        assert_eq!(
            decode_request(br#"{"type":"getStatus"}"#).unwrap(),
            Inbound::GetStatus
        );
        assert_eq!(
            decode_request(br#"{"type":"getStatus","command":""}"#).unwrap(),
            Inbound::GetStatus
        );
    }

    #[test]
    fn test_decode_unknown_verb() {
        assert_eq!(
            decode_request(br#"{"type":"command","command":"dance"}"#).unwrap(),
            Inbound::UnknownCommand("dance".to_string())
        );
        assert_eq!(
            decode_request(br#"{"type":"command","command":7}"#).unwrap(),
            Inbound::UnknownCommand("7".to_string())
        );
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            decode_request(b"not json"),
            Err(ProtocolError::InvalidJson(_))
        ));
        assert!(matches!(
            decode_request(b"[1,2]"),
            Err(ProtocolError::NotAnObject)
        ));
        assert!(matches!(
            decode_request(br#"{"command":"mute"}"#),
            Err(ProtocolError::MissingField("type"))
        ));
        assert!(matches!(
            decode_request(br#"{"type":"command"}"#),
            Err(ProtocolError::MissingField("command"))
        ));
        assert!(matches!(
            decode_request(br#"{"type":"reboot"}"#),
            Err(ProtocolError::UnknownType(t)) if t == "reboot"
        ));
        assert!(matches!(
            decode_request(&[0xff, 0xfe]),
            Err(ProtocolError::InvalidUtf8)
        ));
    }

    #[test]
    fn test_encode_requests() {
        assert_eq!(
            encode_command(CommandVerb::EndForAll),
            r#"{"type":"command","command":"endForAll"}"#
        );
        assert_eq!(encode_get_status(), r#"{"type":"getStatus","command":""}"#);
        assert_eq!(
            decode_request(encode_get_status().as_bytes()).unwrap(),
            Inbound::GetStatus
        );
    }

    #[test]
    fn test_encode_status() {
        let snapshot = StatusSnapshot {
            audio_status: AudioStatus::Muted,
            video_status: VideoStatus::On,
            meeting_active: true,
        };
        assert_eq!(
            encode_status(&snapshot),
            r#"{"type":"status","audioStatus":"muted","videoStatus":"on","meetingActive":true}"#
        );
        assert_eq!(
            decode_server_line(encode_status(&snapshot).as_bytes()).unwrap(),
            ServerLine::Status(snapshot)
        );
    }

    #[test]
    fn test_decode_status_derives_meeting_active() {
        let line = br#"{"type":"status","audioStatus":"unmuted","videoStatus":"off"}"#;
        let ServerLine::Status(s) = decode_server_line(line).unwrap() else {
            unreachable!("Expected status");
        };
        assert!(s.meeting_active);

        let line = br#"{"type":"status","audioStatus":"unknown","videoStatus":"unknown"}"#;
        let ServerLine::Status(s) = decode_server_line(line).unwrap() else {
            unreachable!("Expected status");
        };
        assert_eq!(s, StatusSnapshot::default());
    }

    #[test]
    fn test_decode_status_rejects_unknown_values() {
        let line = br#"{"type":"status","audioStatus":"loud","videoStatus":"on"}"#;
        assert!(decode_server_line(line).is_err());
    }

    #[test]
    fn test_decode_text_reply() {
        assert_eq!(
            decode_server_line(b"unknown command: dance").unwrap(),
            ServerLine::Text("unknown command: dance".to_string())
        );
        assert_eq!(
            decode_server_line(unknown_command_reply("x").as_bytes()).unwrap(),
            ServerLine::Text("unknown command: x".to_string())
        );
    }

    #[test]
    fn test_snapshot_display() {
        assert_eq!(
            StatusSnapshot::default().to_string(),
            "audio=unknown video=unknown meeting=none"
        );
    }
}
