//! In-process simulated robot.

use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use robot_gateway_core::{
    CommandKind, RobotAddress, RobotTransport, TelemetrySnapshot, VideoFrame, now_millis,
    traits::TransportError,
};

use crate::{LowState, SportRequest};

/// Minimal JPEG (SOI + EOI) used as the test-pattern frame.
const TEST_PATTERN: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0xFF, 0xD9,
];

/// Fault injection switches.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Delay before a command is acknowledged.
    pub command_delay: Duration,
    /// Delay before a disconnect completes.
    pub disconnect_delay: Duration,
    /// Refuse connects.
    pub refuse_connect: bool,
    /// Reject every command.
    pub fail_commands: bool,
    /// Fail status fetches.
    pub fail_status: bool,
    /// Fail frame fetches.
    pub fail_frames: bool,
    /// Fail heartbeat probes.
    pub fail_heartbeat: bool,
}

#[derive(Debug, Default)]
struct SimState {
    address: Option<RobotAddress>,
    low_state: LowState,
    speed: f64,
    frame: Option<VideoFrame>,
    requests: Vec<(CommandKind, SportRequest)>,
    connects: u32,
    faults: Faults,
}

/// Simulated robot.
///
/// Keeps the last sport request's speed, a settable low-state record and an
/// optional buffered frame. Readings only change when a command or setter
/// changes them.
#[derive(Debug, Default)]
pub struct SimulatedRobot {
    state: Mutex<SimState>,
}

impl SimulatedRobot {
    /// Create a simulated robot with no frame buffered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a simulated robot with a test-pattern frame and plausible
    /// readings.
    #[must_use]
    pub fn with_test_pattern() -> Self {
        let robot = Self::new();
        robot.set_frame(Some(VideoFrame::new(TEST_PATTERN, now_millis())));
        robot.set_low_state(LowState {
            bms_state: crate::sensor::BmsState {
                soc: 100.0,
                current: 1500.0,
            },
            temperature_ntc1: 35.0,
            power_v: 25.2,
            humidity: Some(45.0),
            cpu_usage: Some(20.0),
            ..LowState::default()
        });
        robot
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the low-state record.
    pub fn set_low_state(&self, low_state: LowState) {
        self.lock().low_state = low_state;
    }

    /// Replace the buffered frame.
    pub fn set_frame(&self, frame: Option<VideoFrame>) {
        self.lock().frame = frame;
    }

    /// Replace the fault switches.
    pub fn set_faults(&self, faults: Faults) {
        self.lock().faults = faults;
    }

    /// Adjust the fault switches in place.
    pub fn update_faults(&self, f: impl FnOnce(&mut Faults)) {
        f(&mut self.lock().faults);
    }

    /// Commands acknowledged so far, in order.
    #[must_use]
    pub fn sent_commands(&self) -> Vec<CommandKind> {
        self.lock().requests.iter().map(|(c, _)| *c).collect()
    }

    /// Sport requests issued so far, in order.
    #[must_use]
    pub fn sport_requests(&self) -> Vec<SportRequest> {
        self.lock().requests.iter().map(|(_, r)| *r).collect()
    }

    /// Address of the open link, if any.
    #[must_use]
    pub fn connected_to(&self) -> Option<RobotAddress> {
        self.lock().address
    }

    /// Number of successful connects.
    #[must_use]
    pub fn connect_count(&self) -> u32 {
        self.lock().connects
    }

    fn ensure_open(state: &SimState) -> Result<(), TransportError> {
        if state.address.is_some() {
            Ok(())
        } else {
            Err(TransportError::NotOpen)
        }
    }
}

#[async_trait]
impl RobotTransport for SimulatedRobot {
    async fn connect(&self, address: RobotAddress) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.faults.refuse_connect {
            return Err(TransportError::ConnectFailed(format!(
                "{address} refused the connection"
            )));
        }
        state.address = Some(address);
        state.connects += 1;
        tracing::debug!(%address, "Simulated robot connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let delay = self.lock().faults.disconnect_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.lock();
        state.address = None;
        state.speed = 0.0;
        Ok(())
    }

    async fn send_command(&self, command: CommandKind) -> Result<(), TransportError> {
        let delay = {
            let state = self.lock();
            Self::ensure_open(&state)?;
            if state.faults.fail_commands {
                return Err(TransportError::Rejected(format!("{command} rejected")));
            }
            state.faults.command_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let request = SportRequest::from(command);
        let mut state = self.lock();
        Self::ensure_open(&state)?;
        let speed = match command {
            CommandKind::Stop | CommandKind::Sitdown => 0.0,
            _ => request.parameter.map_or(state.speed, |p| p.speed()),
        };
        state.speed = speed;
        state.requests.push((command, request));
        Ok(())
    }

    async fn fetch_status(&self) -> Result<TelemetrySnapshot, TransportError> {
        let state = self.lock();
        Self::ensure_open(&state)?;
        if state.faults.fail_status {
            return Err(TransportError::Io("status channel unavailable".into()));
        }
        let mut snapshot = TelemetrySnapshot::from(&state.low_state);
        snapshot.speed = state.speed;
        Ok(snapshot)
    }

    async fn fetch_frame(&self) -> Result<Option<VideoFrame>, TransportError> {
        let state = self.lock();
        Self::ensure_open(&state)?;
        if state.faults.fail_frames {
            return Err(TransportError::Io("video track unavailable".into()));
        }
        Ok(state.frame.clone())
    }

    async fn heartbeat(&self) -> Result<(), TransportError> {
        let state = self.lock();
        Self::ensure_open(&state)?;
        if state.faults.fail_heartbeat {
            return Err(TransportError::Io("heartbeat lost".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    fn addr() -> RobotAddress {
        RobotAddress::parse("192.168.1.100").unwrap()
    }

    #[tokio::test]
    async fn test_requires_open_link() {
        let robot = SimulatedRobot::new();
        assert_eq!(
            robot.send_command(CommandKind::Stop).await.unwrap_err(),
            TransportError::NotOpen
        );
        assert!(robot.fetch_status().await.is_err());
    }

    #[tokio::test]
    async fn test_commands_drive_speed() {
        let robot = SimulatedRobot::new();
        robot.connect(addr()).await.unwrap();

        robot.send_command(CommandKind::Forward).await.unwrap();
        assert!((robot.fetch_status().await.unwrap().speed - 0.5).abs() < 1e-9);

        robot.send_command(CommandKind::Stop).await.unwrap();
        assert!(robot.fetch_status().await.unwrap().speed.abs() < 1e-9);

        assert_eq!(
            robot.sent_commands(),
            [CommandKind::Forward, CommandKind::Stop]
        );
    }

    #[tokio::test]
    async fn test_faults() {
        let robot = SimulatedRobot::with_test_pattern();
        assert_ok!(robot.connect(addr()).await);
        assert!(assert_ok!(robot.fetch_frame().await).is_some());

        robot.update_faults(|f| {
            f.fail_frames = true;
            f.fail_heartbeat = true;
        });
        assert_err!(robot.fetch_frame().await);
        assert_err!(robot.heartbeat().await);

        robot.set_faults(Faults {
            refuse_connect: true,
            ..Faults::default()
        });
        robot.disconnect().await.unwrap();
        assert!(matches!(
            robot.connect(addr()).await,
            Err(TransportError::ConnectFailed(_))
        ));
    }
}
