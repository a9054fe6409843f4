//! Sport-mode request mapping.

use robot_gateway_core::CommandKind;
use serde::{Deserialize, Serialize};

/// Topic sport-mode requests are published on.
pub const SPORT_TOPIC: &str = "rt/api/sport/request";

/// Sport API identifiers.
pub mod api_id {
    pub const STOP_MOVE: u32 = 1003;
    pub const STAND_UP: u32 = 1004;
    pub const STAND_DOWN: u32 = 1005;
    pub const MOVE: u32 = 1008;
    pub const HELLO: u32 = 1016;
}

/// Linear speed used for the discrete move commands, m/s.
pub const STEP_SPEED: f64 = 0.5;

/// Velocity parameter of a move request.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MoveParameter {
    /// Forward velocity.
    pub x: f64,
    /// Lateral velocity, positive to the left.
    pub y: f64,
    /// Yaw rate.
    pub z: f64,
}

impl MoveParameter {
    /// Planar speed of this velocity.
    #[must_use]
    pub fn speed(&self) -> f64 {
        self.x.hypot(self.y)
    }
}

/// A sport-mode API request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SportRequest {
    pub api_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<MoveParameter>,
}

impl SportRequest {
    const fn bare(api_id: u32) -> Self {
        Self {
            api_id,
            parameter: None,
        }
    }

    const fn moving(x: f64, y: f64) -> Self {
        Self {
            api_id: api_id::MOVE,
            parameter: Some(MoveParameter { x, y, z: 0.0 }),
        }
    }
}

impl From<CommandKind> for SportRequest {
    fn from(command: CommandKind) -> Self {
        match command {
            CommandKind::Forward => Self::moving(STEP_SPEED, 0.0),
            CommandKind::Backward => Self::moving(-STEP_SPEED, 0.0),
            CommandKind::Left => Self::moving(0.0, STEP_SPEED),
            CommandKind::Right => Self::moving(0.0, -STEP_SPEED),
            CommandKind::Stop => Self::bare(api_id::STOP_MOVE),
            CommandKind::Standup => Self::bare(api_id::STAND_UP),
            CommandKind::Sitdown => Self::bare(api_id::STAND_DOWN),
            CommandKind::Hello => Self::bare(api_id::HELLO),
        }
    }
}
