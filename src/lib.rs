//! rapids-control: remote control for a conferencing app
//!
//! A long-running server drives the conferencing application's user interface
//! through an accessibility-style automation API and exposes a small command
//! set (mute, unmute, video on/off, end meeting for all) over a local Unix
//! socket. Connected clients receive a status line whenever the observed
//! audio, video or meeting state changes.
//!
//! # Architecture
//!
//! - **Automation**: Provider abstraction, bounded element search, command
//!   verbs and the end-meeting state machine
//! - **Control**: Newline-delimited JSON protocol, command server and a
//!   reconnecting socket client
//! - **Poller**: Periodic status sampling with change detection
//! - **Config**: Hierarchical TOML configuration
//! - **Telemetry**: Structured syslog logging for audit trails

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod automation;
pub mod cli;
pub mod cli_handler;
pub mod config;
pub mod control;
pub mod poller;
pub mod telemetry;
