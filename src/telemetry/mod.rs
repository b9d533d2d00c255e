//! Telemetry and audit logging.
//!
//! - **Audit logging** (syslog): command and connection events, tagged
//!   `RAPIDS_CONTROL`, one JSON object per entry.
//! - **Diagnostics** (tracing): everything else, to stderr.
//!
//! Audit logging is optional. Components call [`record`], which does nothing
//! until [`init_logger`] has succeeded, so tests and `exec` runs never need a
//! syslog daemon.
//!
//! # Event Format
//!
//! ```json
//! {"ts":"2026-01-07T14:32:01Z","event":"command_received","connection":"6f1c...","verb":"mute"}
//! ```

mod error;
mod events;
mod syslog;

pub use error::TelemetryError;
pub use events::{AuditEvent, TimestampedEvent};
pub use syslog::{init_logger, record, try_audit, AuditLogger, SYSLOG_TAG};
