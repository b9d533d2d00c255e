//! Configuration system.
//!
//! TOML configuration loaded from several files and merged in order:
//!
//! 1. Built-in defaults
//! 2. System config: `/etc/rapids-control/config.toml`
//! 3. User config: `~/.config/rapids-control/config.toml`
//! 4. Additional config file (via `--config` flag, must exist)
//! 5. CLI flags (highest priority)
//!
//! Missing system and user files are skipped. Every field is optional; a
//! zero or empty value means "not set" and leaves the earlier value alone.
//!
//! ```toml
//! [server]
//! socket_path = "/tmp/rapidscontrol.sock"
//!
//! [poller]
//! interval_ms = 250
//!
//! [automation]
//! activate_timeout_ms = 800
//! meeting_window_title = "Zoom Meeting"
//!
//! [automation.labels]
//! mute = "Mute audio"
//!
//! [client]
//! reconnect_interval_ms = 10000
//! ```

mod error;
mod loader;
mod schema;

pub use error::ConfigError;
pub use loader::{to_toml, ConfigLoader, SYSTEM_CONFIG_PATH};
pub use schema::{
    AutomationConfig, ClientConfig, Config, LabelsConfig, PollerConfig, ServerConfig,
};
