//! Configuration schema definitions.
//!
//! Every field defaults to zero or empty, meaning "not set". The accessor
//! methods on [`Config`] resolve unset fields to the built-in defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use crate::automation::{
    AutomationSettings, ControlLabels, DEFAULT_ACTIVATE_TIMEOUT, DEFAULT_CONFIRM_TIMEOUT,
    DEFAULT_MAX_SEARCH_DEPTH, DEFAULT_MEETING_WINDOW_TITLE, DEFAULT_POLL_INTERVAL,
    DEFAULT_WINDOW_TIMEOUT,
};
use crate::control::{
    ClientSettings, DEFAULT_CONNECT_TIMEOUT, DEFAULT_RECONNECT_INTERVAL,
    DEFAULT_SOCKET_PATH, DEFAULT_STATUS_RETRY_INTERVAL,
};
use crate::poller;

/// Longest socket path accepted by every supported platform.
const MAX_SOCKET_PATH_LEN: usize = 103;

/// Top-level configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Command server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Status poller settings.
    #[serde(default)]
    pub poller: PollerConfig,

    /// Automation engine settings.
    #[serde(default)]
    pub automation: AutomationConfig,

    /// Socket client settings.
    #[serde(default)]
    pub client: ClientConfig,
}

impl Config {
    /// Merge another config into this one. Set scalars in `other` win.
    pub fn merge(&mut self, other: Config) {
        self.server.merge(other.server);
        self.poller.merge(other.poller);
        self.automation.merge(other.automation);
        self.client.merge(other.client);
    }

    /// Fill every unset field with its built-in default.
    #[must_use]
    pub fn resolved(&self) -> Config {
        let mut config = Config::defaults();
        config.merge(self.clone());
        config
    }

    /// A config with every field at its built-in default.
    pub fn defaults() -> Config {
        let settings = AutomationSettings::default();
        let client = ClientSettings::default();
        Config {
            server: ServerConfig {
                socket_path: DEFAULT_SOCKET_PATH.to_string(),
            },
            poller: PollerConfig {
                interval_ms: millis(poller::DEFAULT_POLL_INTERVAL),
            },
            automation: AutomationConfig {
                poll_interval_ms: millis(settings.poll_interval),
                activate_timeout_ms: millis(settings.activate_timeout),
                window_timeout_ms: millis(settings.window_timeout),
                confirm_timeout_ms: millis(settings.confirm_timeout),
                max_search_depth: settings.max_search_depth,
                meeting_window_title: settings.meeting_window_title,
                labels: LabelsConfig::from(&settings.labels),
            },
            client: ClientConfig {
                reconnect_interval_ms: millis(client.reconnect_interval),
                status_retry_ms: millis(client.status_retry_interval),
                connect_timeout_ms: millis(client.connect_timeout),
            },
        }
    }

    /// Check values that are set but unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let socket_path = self.socket_path();
        if socket_path.as_os_str().len() > MAX_SOCKET_PATH_LEN {
            return Err(ConfigError::InvalidValue {
                field: "server.socket_path".to_string(),
                message: format!("longer than {} bytes", MAX_SOCKET_PATH_LEN),
            });
        }

        let settings = self.automation_settings();
        for (field, timeout) in [
            ("automation.activate_timeout_ms", settings.activate_timeout),
            ("automation.window_timeout_ms", settings.window_timeout),
            ("automation.confirm_timeout_ms", settings.confirm_timeout),
        ] {
            if timeout < settings.poll_interval {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!(
                        "{:?} is shorter than the poll interval {:?}",
                        timeout, settings.poll_interval
                    ),
                });
            }
        }

        Ok(())
    }

    /// Socket path of the command server.
    pub fn socket_path(&self) -> PathBuf {
        if self.server.socket_path.is_empty() {
            PathBuf::from(DEFAULT_SOCKET_PATH)
        } else {
            PathBuf::from(&self.server.socket_path)
        }
    }

    /// Status poller tick.
    pub fn poll_interval(&self) -> Duration {
        duration_or(self.poller.interval_ms, poller::DEFAULT_POLL_INTERVAL)
    }

    /// Automation engine settings.
    pub fn automation_settings(&self) -> AutomationSettings {
        let a = &self.automation;
        AutomationSettings {
            poll_interval: duration_or(a.poll_interval_ms, DEFAULT_POLL_INTERVAL),
            activate_timeout: duration_or(a.activate_timeout_ms, DEFAULT_ACTIVATE_TIMEOUT),
            window_timeout: duration_or(a.window_timeout_ms, DEFAULT_WINDOW_TIMEOUT),
            confirm_timeout: duration_or(a.confirm_timeout_ms, DEFAULT_CONFIRM_TIMEOUT),
            max_search_depth: if a.max_search_depth == 0 {
                DEFAULT_MAX_SEARCH_DEPTH
            } else {
                a.max_search_depth
            },
            meeting_window_title: string_or(&a.meeting_window_title, DEFAULT_MEETING_WINDOW_TITLE),
            labels: a.labels.resolve(),
        }
    }

    /// Socket client settings.
    pub fn client_settings(&self) -> ClientSettings {
        let c = &self.client;
        ClientSettings {
            socket_path: self.socket_path(),
            reconnect_interval: duration_or(c.reconnect_interval_ms, DEFAULT_RECONNECT_INTERVAL),
            status_retry_interval: duration_or(c.status_retry_ms, DEFAULT_STATUS_RETRY_INTERVAL),
            connect_timeout: duration_or(c.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn duration_or(ms: u64, default: Duration) -> Duration {
    if ms == 0 {
        default
    } else {
        Duration::from_millis(ms)
    }
}

fn string_or(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

fn merge_string(target: &mut String, other: String) {
    if !other.is_empty() {
        *target = other;
    }
}

fn merge_number<T: PartialEq + Default>(target: &mut T, other: T) {
    if other != T::default() {
        *target = other;
    }
}

/// `[server]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Unix socket path.
    #[serde(default)]
    pub socket_path: String,
}

impl ServerConfig {
    fn merge(&mut self, other: ServerConfig) {
        merge_string(&mut self.socket_path, other.socket_path);
    }
}

/// `[poller]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PollerConfig {
    /// Sampling tick in milliseconds.
    #[serde(default)]
    pub interval_ms: u64,
}

impl PollerConfig {
    fn merge(&mut self, other: PollerConfig) {
        merge_number(&mut self.interval_ms, other.interval_ms);
    }
}

/// `[automation]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AutomationConfig {
    /// Interval between predicate checks in milliseconds.
    #[serde(default)]
    pub poll_interval_ms: u64,

    /// Deadline for bringing the application to the front.
    #[serde(default)]
    pub activate_timeout_ms: u64,

    /// Deadline for focusing the meeting window.
    #[serde(default)]
    pub window_timeout_ms: u64,

    /// Deadline for confirming the end of the meeting.
    #[serde(default)]
    pub confirm_timeout_ms: u64,

    /// Maximum depth of element searches.
    #[serde(default)]
    pub max_search_depth: usize,

    /// Title (substring, case-insensitive) of the meeting window.
    #[serde(default)]
    pub meeting_window_title: String,

    /// Control titles, for localized installs.
    #[serde(default)]
    pub labels: LabelsConfig,
}

impl AutomationConfig {
    fn merge(&mut self, other: AutomationConfig) {
        merge_number(&mut self.poll_interval_ms, other.poll_interval_ms);
        merge_number(&mut self.activate_timeout_ms, other.activate_timeout_ms);
        merge_number(&mut self.window_timeout_ms, other.window_timeout_ms);
        merge_number(&mut self.confirm_timeout_ms, other.confirm_timeout_ms);
        merge_number(&mut self.max_search_depth, other.max_search_depth);
        merge_string(&mut self.meeting_window_title, other.meeting_window_title);
        self.labels.merge(other.labels);
    }
}

/// `[automation.labels]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct LabelsConfig {
    /// Menu item shown while unmuted.
    #[serde(default)]
    pub mute: String,
    /// Menu item shown while muted.
    #[serde(default)]
    pub unmute: String,
    /// Menu item shown while video is off.
    #[serde(default)]
    pub start_video: String,
    /// Menu item shown while video is on.
    #[serde(default)]
    pub stop_video: String,
    /// Menu item that closes the focused window.
    #[serde(default)]
    pub close: String,
    /// Confirmation button for ending the meeting.
    #[serde(default)]
    pub end_for_all: String,
}

impl LabelsConfig {
    fn merge(&mut self, other: LabelsConfig) {
        merge_string(&mut self.mute, other.mute);
        merge_string(&mut self.unmute, other.unmute);
        merge_string(&mut self.start_video, other.start_video);
        merge_string(&mut self.stop_video, other.stop_video);
        merge_string(&mut self.close, other.close);
        merge_string(&mut self.end_for_all, other.end_for_all);
    }

    fn resolve(&self) -> ControlLabels {
        let d = ControlLabels::default();
        ControlLabels {
            mute: string_or(&self.mute, &d.mute),
            unmute: string_or(&self.unmute, &d.unmute),
            start_video: string_or(&self.start_video, &d.start_video),
            stop_video: string_or(&self.stop_video, &d.stop_video),
            close: string_or(&self.close, &d.close),
            end_for_all: string_or(&self.end_for_all, &d.end_for_all),
        }
    }
}

impl From<&ControlLabels> for LabelsConfig {
    fn from(labels: &ControlLabels) -> Self {
        Self {
            mute: labels.mute.clone(),
            unmute: labels.unmute.clone(),
            start_video: labels.start_video.clone(),
            stop_video: labels.stop_video.clone(),
            close: labels.close.clone(),
            end_for_all: labels.end_for_all.clone(),
        }
    }
}

/// `[client]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Interval between reconnect attempts in milliseconds.
    #[serde(default)]
    pub reconnect_interval_ms: u64,

    /// Interval between `getStatus` retries in milliseconds.
    #[serde(default)]
    pub status_retry_ms: u64,

    /// Deadline for one connection attempt in milliseconds.
    #[serde(default)]
    pub connect_timeout_ms: u64,
}

impl ClientConfig {
    fn merge(&mut self, other: ClientConfig) {
        merge_number(&mut self.reconnect_interval_ms, other.reconnect_interval_ms);
        merge_number(&mut self.status_retry_ms, other.status_retry_ms);
        merge_number(&mut self.connect_timeout_ms, other.connect_timeout_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_empty() {
        let config = Config::default();

        assert_eq!(config.server.socket_path, "");
        assert_eq!(config.poller.interval_ms, 0);
        assert_eq!(config.automation.max_search_depth, 0);
        assert_eq!(config.automation.labels.mute, "");
        assert_eq!(config.client.reconnect_interval_ms, 0);
    }

    #[test]
    fn test_unset_fields_resolve_to_defaults() {
        let config = Config::default();

        assert_eq!(config.socket_path(), PathBuf::from("/tmp/rapidscontrol.sock"));
        assert_eq!(config.poll_interval(), Duration::from_millis(250));

        let settings = config.automation_settings();
        assert_eq!(settings.poll_interval, Duration::from_millis(50));
        assert_eq!(settings.activate_timeout, Duration::from_millis(500));
        assert_eq!(settings.window_timeout, Duration::from_millis(500));
        assert_eq!(settings.confirm_timeout, Duration::from_millis(300));
        assert_eq!(settings.max_search_depth, 55);
        assert_eq!(settings.meeting_window_title, "Zoom Meeting");
        assert_eq!(settings.labels, ControlLabels::default());

        let client = config.client_settings();
        assert_eq!(client.reconnect_interval, Duration::from_secs(10));
        assert_eq!(client.status_retry_interval, Duration::from_secs(1));
        assert_eq!(client.connect_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_merge_overrides_only_set_scalars() {
        let mut base: Config = toml::from_str(
            r#"
            [poller]
            interval_ms = 500

            [automation]
            confirm_timeout_ms = 900

            [automation.labels]
            mute = "Stummschalten"
            "#,
        )
        .unwrap();
        let overlay: Config = toml::from_str(
            r#"
            [automation]
            confirm_timeout_ms = 1200

            [automation.labels]
            unmute = "Stummschaltung aufheben"
            "#,
        )
        .unwrap();

        base.merge(overlay);

        assert_eq!(base.poller.interval_ms, 500);
        assert_eq!(base.automation.confirm_timeout_ms, 1200);
        let labels = base.automation_settings().labels;
        assert_eq!(labels.mute, "Stummschalten");
        assert_eq!(labels.unmute, "Stummschaltung aufheben");
        assert_eq!(labels.close, "Close");
    }

    #[test]
    fn test_resolved_matches_accessors() {
        let resolved = Config::default().resolved();
        assert_eq!(resolved, Config::defaults());
        assert_eq!(resolved.automation.activate_timeout_ms, 500);
        assert_eq!(resolved.client.status_retry_ms, 1000);
    }

    #[test]
    fn test_validate_rejects_timeout_below_poll_interval() {
        let config: Config = toml::from_str(
            r#"
            [automation]
            poll_interval_ms = 100
            confirm_timeout_ms = 40
            "#,
        )
        .unwrap();

        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref field, .. } if field == "automation.confirm_timeout_ms"
        ));
    }

    #[test]
    fn test_validate_rejects_long_socket_path() {
        let config = Config {
            server: ServerConfig {
                socket_path: format!("/tmp/{}.sock", "x".repeat(120)),
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(Config::default().validate().is_ok());
    }
}
