use std::time::Duration;

use cadence_channel::ReconnectPolicy;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CadenceSettings {
    pub channel: ChannelSettings,
    pub api: ApiSettings,
    pub session: SessionSettings,
    pub logging: LoggingSettings,
}

/// Event channel to the generation worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelSettings {
    pub url: String,
    pub reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub send_queue: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws".into(),
            reconnect_attempts: 5,
            reconnect_delay_ms: 1000,
            heartbeat_interval_ms: 30_000,
            send_queue: 64,
        }
    }
}

impl ChannelSettings {
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.reconnect_attempts,
            delay: Duration::from_millis(self.reconnect_delay_ms),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            send_queue: self.send_queue,
        }
    }
}

/// REST collaborator serving generated artifacts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiSettings {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".into(),
            timeout_ms: 30_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// How long to wait for a superseding completion after a fallback error.
    pub fallback_grace_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            fallback_grace_ms: 120_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_channel_policy() {
        let settings = CadenceSettings::default();
        assert_eq!(settings.channel.policy(), ReconnectPolicy::default());
        assert_eq!(settings.api.base_url, "http://localhost:8000/api");
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn serializes_camel_case() {
        let value = serde_json::to_value(CadenceSettings::default()).unwrap();
        assert_eq!(value["channel"]["reconnectAttempts"], 5);
        assert_eq!(value["channel"]["reconnectDelayMs"], 1000);
        assert_eq!(value["session"]["fallbackGraceMs"], 120_000);
    }
}
