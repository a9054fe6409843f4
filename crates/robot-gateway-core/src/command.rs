//! Robot command vocabulary.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

/// A discrete motion/action command.
///
/// The vocabulary is fixed; string forms are lower-case and matched exactly.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CommandKind {
    /// Stand up from a lying or sitting posture.
    Standup,
    /// Sit/lie down.
    Sitdown,
    /// Strafe left.
    Left,
    /// Strafe right.
    Right,
    /// Walk forward.
    Forward,
    /// Walk backward.
    Backward,
    /// Greeting gesture.
    Hello,
    /// Stop any motion in progress.
    Stop,
}

impl CommandKind {
    /// All commands in vocabulary order.
    pub fn all() -> impl Iterator<Item = Self> {
        Self::iter()
    }

    /// Operation log text recorded when this command is sent.
    #[must_use]
    pub fn log_text(self) -> String {
        format!("Sent command: {self}")
    }
}
