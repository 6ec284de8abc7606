//! Client-side configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Conference manager settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConferenceConfig {
    /// How often participant audio levels are polled while active
    #[serde(rename = "audio_poll_interval_ms", with = "sipmesh_infra_common::config::duration_ms")]
    pub audio_poll_interval: Duration,

    /// Pause between reaching `Ended` and clearing the conference
    #[serde(rename = "settle_delay_ms", with = "sipmesh_infra_common::config::duration_ms")]
    pub settle_delay: Duration,

    /// Address of the local participant
    pub local_uri: String,

    pub local_display_name: Option<String>,
}

impl Default for ConferenceConfig {
    fn default() -> Self {
        Self {
            audio_poll_interval: Duration::from_millis(100),
            settle_delay: Duration::from_millis(100),
            local_uri: "sip:local@localhost".to_string(),
            local_display_name: None,
        }
    }
}

impl ConferenceConfig {
    pub fn new(local_uri: impl Into<String>) -> Self {
        Self {
            local_uri: local_uri.into(),
            ..Default::default()
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.local_display_name = Some(name.into());
        self
    }

    pub fn with_audio_poll_interval(mut self, interval: Duration) -> Self {
        self.audio_poll_interval = interval;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }
}

/// Call controller settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallSessionConfig {
    /// Period of the elapsed-time tick
    #[serde(rename = "duration_tick_ms", with = "sipmesh_infra_common::config::duration_ms")]
    pub duration_tick: Duration,
}

impl Default for CallSessionConfig {
    fn default() -> Self {
        Self {
            duration_tick: Duration::from_secs(1),
        }
    }
}

impl CallSessionConfig {
    pub fn with_duration_tick(mut self, tick: Duration) -> Self {
        self.duration_tick = tick;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DtmfConfig {
    /// Gap between tones of a sequence when the caller gives none
    #[serde(rename = "default_gap_ms", with = "sipmesh_infra_common::config::duration_ms")]
    pub default_gap: Duration,
}

impl Default for DtmfConfig {
    fn default() -> Self {
        Self {
            default_gap: Duration::from_millis(160),
        }
    }
}

impl DtmfConfig {
    pub fn with_default_gap(mut self, gap: Duration) -> Self {
        self.default_gap = gap;
        self
    }
}
