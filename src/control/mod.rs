//! Local control channel.
//!
//! Newline-delimited JSON over a Unix domain socket:
//!
//! - [`CommandServer`]: host side. Accepts controllers, runs their commands
//!   on the automation engine and forwards status changes.
//! - [`SocketClient`]: controller side. Keeps a connection alive and turns
//!   lines into [`ClientEvent`]s.
//! - [`protocol`]: the message encoding shared by both.

mod client;
mod error;
mod framing;
pub mod protocol;
mod server;

pub use client::{
    Action, ClientEvent, ClientSettings, ConnectionMachine, ConnectionState, Input, SocketClient,
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_RECONNECT_INTERVAL, DEFAULT_STATUS_RETRY_INTERVAL,
};
pub use error::{ControlError, ControlResult};
pub use framing::{read_line, write_line};
pub use server::{CommandServer, DEFAULT_SOCKET_PATH};
