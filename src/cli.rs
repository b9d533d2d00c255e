//! Command-line interface definitions.
//!
//! Uses clap's derive API for type-safe argument parsing.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::control::protocol::CommandVerb;

/// Remote control for a conferencing app over a local socket.
///
/// `serve` runs on the machine with the conferencing app and drives its user
/// interface. `send` and `watch` are small controllers that talk to it.
#[derive(Parser, Debug)]
#[command(name = "rapids-control")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to additional config file.
    ///
    /// Merged on top of the system and user configs. Must exist.
    #[arg(short = 'c', long = "config", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Socket path (overrides `[server] socket_path`).
    #[arg(short = 's', long = "socket", value_name = "PATH", global = true)]
    pub socket: Option<PathBuf>,

    /// Increase log verbosity.
    ///
    /// Can be specified multiple times:
    /// -v    = info level
    /// -vv   = debug level
    /// -vvv  = trace level
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the command server and status poller until interrupted.
    Serve {
        /// Drive the built-in simulated application instead of a real one.
        #[arg(long)]
        simulate: bool,
    },

    /// Run one command directly against the application, bypassing the socket.
    Exec {
        /// What to do.
        target: Target,

        /// Drive the built-in simulated application instead of a real one.
        #[arg(long)]
        simulate: bool,
    },

    /// Connect to a running server, send one command and print the resulting status.
    Send {
        /// What to send.
        target: Target,
    },

    /// Connect to a running server and print every status change.
    Watch,

    /// Print the effective configuration as TOML.
    Config,
}

/// A command verb, or `status` to only query.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Mute the microphone.
    Mute,
    /// Unmute the microphone.
    Unmute,
    /// Start the camera.
    VideoOn,
    /// Stop the camera.
    VideoOff,
    /// End the meeting for everyone.
    EndForAll,
    /// Report status only.
    Status,
}

impl Target {
    /// The verb to execute, or `None` for a status query.
    pub fn verb(self) -> Option<CommandVerb> {
        match self {
            Target::Mute => Some(CommandVerb::Mute),
            Target::Unmute => Some(CommandVerb::Unmute),
            Target::VideoOn => Some(CommandVerb::VideoOn),
            Target::VideoOff => Some(CommandVerb::VideoOff),
            Target::EndForAll => Some(CommandVerb::EndForAll),
            Target::Status => None,
        }
    }
}
