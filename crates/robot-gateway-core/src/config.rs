//! Gateway runtime configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing and threshold settings for a gateway instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Upper bound on the transport's connect.
    pub connect_timeout: Duration,
    /// Upper bound on one command round-trip.
    pub command_timeout: Duration,
    /// Upper bound on one status or frame fetch.
    pub fetch_timeout: Duration,
    /// Interval between heartbeat probes.
    pub heartbeat_interval: Duration,
    /// Consecutive heartbeat failures before the session is declared lost.
    /// Zero disables the heartbeat.
    pub heartbeat_failure_limit: u32,
    /// Consecutive failed relay ticks before subscribers are notified.
    /// Zero disables escalation.
    pub relay_failure_threshold: u32,
    /// Default telemetry cadence.
    pub telemetry_interval: Duration,
    /// Default video cadence.
    pub video_interval: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(1),
            heartbeat_failure_limit: 3,
            relay_failure_threshold: 5,
            telemetry_interval: Duration::from_millis(1000),
            video_interval: Duration::from_millis(100),
        }
    }
}
