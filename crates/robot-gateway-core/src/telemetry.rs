//! Telemetry and video data relayed from the robot.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Robot operating mode as reported in telemetry.
pub const DEFAULT_MODE: &str = "Manual";

/// One reading of the robot's scalar status values.
///
/// Values are passed through from the robot as-is; range checks are the
/// display's business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    /// Battery state of charge, percent.
    pub battery: f64,
    /// Temperature, degrees Celsius.
    pub temperature: f64,
    /// Relative humidity, percent.
    pub humidity: f64,
    /// CPU usage, percent.
    pub cpu_usage: f64,
    /// Power draw, watts.
    pub power_consumption: f64,
    /// Speed, metres per second.
    pub speed: f64,
    /// Operating mode.
    pub mode: String,
    /// Uptime in seconds.
    pub uptime: u64,
    /// Number of errors reported by the robot.
    #[serde(rename = "errors")]
    pub error_count: u32,
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        Self {
            battery: 0.0,
            temperature: 0.0,
            humidity: 0.0,
            cpu_usage: 0.0,
            power_consumption: 0.0,
            speed: 0.0,
            mode: DEFAULT_MODE.to_string(),
            uptime: 0,
            error_count: 0,
        }
    }
}

/// One encoded camera frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    /// Encoded image bytes (JPEG from the bundled transports).
    pub data: Bytes,
    /// Capture time, Unix epoch milliseconds.
    pub captured_at: i64,
}

impl VideoFrame {
    /// Create a frame from encoded bytes.
    #[must_use]
    pub fn new(data: impl Into<Bytes>, captured_at: i64) -> Self {
        Self {
            data: data.into(),
            captured_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_wire_names() {
        let snapshot = TelemetrySnapshot {
            cpu_usage: 12.5,
            error_count: 2,
            ..TelemetrySnapshot::default()
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["cpuUsage"], 12.5);
        assert_eq!(json["errors"], 2);
        assert_eq!(json["powerConsumption"], 0.0);
        assert_eq!(json["mode"], "Manual");
    }
}
