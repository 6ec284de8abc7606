//! Mock endpoint configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Behavior switches for [`MockSipServer`](super::MockSipServer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockServerConfig {
    /// Fire `Registered` after a successful `register()`
    pub auto_register: bool,

    /// Expiry reported in `Registered` events, in seconds
    pub registration_expires: u32,

    /// Outgoing calls ring and are answered without further input
    pub auto_accept_calls: bool,

    /// Delay applied to every simulated event
    #[serde(rename = "network_latency_ms", with = "sipmesh_infra_common::config::duration_ms")]
    pub network_latency: Duration,

    /// `connect()` fails with an injected error
    pub fail_connection: bool,

    /// `register()` fails with an injected error
    pub fail_registration: bool,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            auto_register: true,
            registration_expires: 600,
            auto_accept_calls: false,
            network_latency: Duration::from_millis(10),
            fail_connection: false,
            fail_registration: false,
        }
    }
}

impl MockServerConfig {
    pub fn with_network_latency(mut self, latency: Duration) -> Self {
        self.network_latency = latency;
        self
    }

    pub fn with_auto_accept_calls(mut self, enabled: bool) -> Self {
        self.auto_accept_calls = enabled;
        self
    }

    pub fn with_auto_register(mut self, enabled: bool) -> Self {
        self.auto_register = enabled;
        self
    }

    pub fn with_registration_expires(mut self, seconds: u32) -> Self {
        self.registration_expires = seconds;
        self
    }

    pub fn with_fail_connection(mut self, fail: bool) -> Self {
        self.fail_connection = fail;
        self
    }

    pub fn with_fail_registration(mut self, fail: bool) -> Self {
        self.fail_registration = fail;
        self
    }
}
