//! Raw robot low-state record.

use robot_gateway_core::{TelemetrySnapshot, telemetry::DEFAULT_MODE};
use serde::{Deserialize, Serialize};

/// Inertial measurement state.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImuState {
    /// Roll, pitch, yaw.
    #[serde(default)]
    pub rpy: [f64; 3],
}

/// Battery management state.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BmsState {
    /// State of charge, percent.
    #[serde(default)]
    pub soc: f64,
    /// Pack current, milliamps.
    #[serde(default)]
    pub current: f64,
}

/// Low-state record published by the robot.
///
/// Only the fields the gateway reads are modelled. A robot-side bridge may
/// add the optional fields for readings the low state itself lacks.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LowState {
    #[serde(default)]
    pub imu_state: ImuState,
    #[serde(default)]
    pub bms_state: BmsState,
    #[serde(default)]
    pub temperature_ntc1: f64,
    /// Supply voltage, volts.
    #[serde(default)]
    pub power_v: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_usage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl From<&LowState> for TelemetrySnapshot {
    fn from(state: &LowState) -> Self {
        Self {
            battery: state.bms_state.soc,
            temperature: state.temperature_ntc1,
            humidity: state.humidity.unwrap_or_default(),
            cpu_usage: state.cpu_usage.unwrap_or_default(),
            power_consumption: state.bms_state.current * state.power_v / 1000.0,
            // No odometry in the low state; yaw rate stands in for speed.
            speed: state.imu_state.rpy[2].abs() / 10.0,
            mode: state
                .mode
                .clone()
                .unwrap_or_else(|| DEFAULT_MODE.to_string()),
            uptime: state.uptime.unwrap_or_default(),
            error_count: state.error_count.unwrap_or_default(),
        }
    }
}
