//! Command dispatch over the active session.

use std::sync::Arc;

use robot_gateway_core::{CommandKind, GatewayError, OperationLogStore, RobotTransport, UserId};
use tokio::time::timeout;

use crate::{
    Gateway,
    manager::{Inner, run_detached},
};

impl<T, L> Gateway<T, L>
where
    T: RobotTransport + 'static,
    L: OperationLogStore + 'static,
{
    /// Parse `command` and forward it to the robot.
    ///
    /// Parsing is exact and lower-case. An acknowledged command is logged
    /// even if the caller stops waiting.
    ///
    /// # Errors
    /// Returns `NotConnected` without a session, `UnknownCommand` for text
    /// outside the vocabulary, `CommandTimeout` if the robot does not
    /// acknowledge in time, or `TransportFailure` if the link rejects it.
    pub async fn send(&self, command: &str, user: &UserId) -> Result<CommandKind, GatewayError> {
        let inner = Arc::clone(&self.inner);
        let (command, user) = (command.to_string(), user.clone());
        run_detached(async move { inner.send(&command, &user).await }).await
    }

    /// Forward an already-parsed command to the robot.
    ///
    /// # Errors
    /// Same as [`Gateway::send`], minus `UnknownCommand`.
    pub async fn send_kind(&self, kind: CommandKind, user: &UserId) -> Result<(), GatewayError> {
        let inner = Arc::clone(&self.inner);
        let user = user.clone();
        run_detached(async move { inner.send_kind(kind, &user).await }).await
    }
}

impl<T, L> Inner<T, L>
where
    T: RobotTransport + 'static,
    L: OperationLogStore + 'static,
{
    async fn send(&self, command: &str, user: &UserId) -> Result<CommandKind, GatewayError> {
        let session = self.session.read().await;
        if session.is_none() {
            return Err(GatewayError::NotConnected);
        }
        let kind: CommandKind = command
            .parse()
            .map_err(|_| GatewayError::UnknownCommand(command.to_string()))?;

        self.forward(kind, user).await?;
        drop(session);
        Ok(kind)
    }

    async fn send_kind(&self, kind: CommandKind, user: &UserId) -> Result<(), GatewayError> {
        let session = self.session.read().await;
        if session.is_none() {
            return Err(GatewayError::NotConnected);
        }
        self.forward(kind, user).await?;
        drop(session);
        Ok(())
    }

    /// Round-trip and log one command. Callers hold the session read lock.
    async fn forward(&self, kind: CommandKind, user: &UserId) -> Result<(), GatewayError> {
        let limit = self.config.command_timeout;
        match timeout(limit, self.transport.send_command(kind)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(command = %kind, user = %user, "Command failed: {e}");
                return Err(e.into());
            }
            Err(_) => {
                tracing::warn!(command = %kind, user = %user, "Command timed out");
                return Err(GatewayError::CommandTimeout {
                    command: kind,
                    timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                });
            }
        }

        tracing::debug!(command = %kind, user = %user, "Command acknowledged");
        self.log.record(kind.log_text(), user).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use robot_gateway_core::{ErrorKind, GatewayConfig};
    use robot_gateway_driver::SimulatedRobot;

    use super::*;
    use crate::storage::MemoryLogStore;

    fn gateway(config: GatewayConfig) -> (
        Gateway<Arc<SimulatedRobot>, Arc<MemoryLogStore>>,
        Arc<SimulatedRobot>,
        Arc<MemoryLogStore>,
    ) {
        let robot = Arc::new(SimulatedRobot::new());
        let store = Arc::new(MemoryLogStore::new());
        let gw = Gateway::with_config(Arc::clone(&robot), Arc::clone(&store), config);
        (gw, robot, store)
    }

    fn bob() -> UserId {
        UserId::new("bob")
    }

    #[tokio::test]
    async fn test_send_requires_session() {
        let (gw, robot, store) = gateway(GatewayConfig::default());
        let err = gw.send("forward", &bob()).await.unwrap_err();
        assert_eq!(err, GatewayError::NotConnected);
        assert!(robot.sent_commands().is_empty());
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_send_logs_attributed_entry() {
        let (gw, robot, store) = gateway(GatewayConfig::default());
        gw.connect("10.0.0.1", &bob()).await.unwrap();

        assert_eq!(gw.send("hello", &bob()).await.unwrap(), CommandKind::Hello);
        gw.send_kind(CommandKind::Left, &bob()).await.unwrap();

        assert_eq!(robot.sent_commands(), [CommandKind::Hello, CommandKind::Left]);
        let latest = &store.query(2).await.unwrap();
        assert_eq!(latest[0].operation, "Sent command: left");
        assert_eq!(latest[1].operation, "Sent command: hello");
        assert_eq!(latest[0].user_id, bob());
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let (gw, robot, store) = gateway(GatewayConfig::default());
        gw.connect("10.0.0.1", &bob()).await.unwrap();

        for text in ["jump", "Forward", "", " stop"] {
            let err = gw.send(text, &bob()).await.unwrap_err();
            assert_eq!(err, GatewayError::UnknownCommand(text.to_string()));
        }
        assert!(robot.sent_commands().is_empty());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_timeout_keeps_session() {
        let config = GatewayConfig {
            command_timeout: Duration::from_millis(20),
            ..GatewayConfig::default()
        };
        let (gw, robot, store) = gateway(config);
        gw.connect("10.0.0.1", &bob()).await.unwrap();
        robot.update_faults(|f| f.command_delay = Duration::from_millis(500));

        let err = gw.send("forward", &bob()).await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::CommandTimeout {
                command: CommandKind::Forward,
                timeout_ms: 20,
            }
        );
        assert!(gw.status().is_connected());
        assert_eq!(store.len().unwrap(), 1);

        robot.update_faults(|f| f.command_delay = Duration::ZERO);
        gw.send("stop", &bob()).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_command_is_not_logged() {
        let (gw, robot, store) = gateway(GatewayConfig::default());
        gw.connect("10.0.0.1", &bob()).await.unwrap();
        robot.update_faults(|f| f.fail_commands = true);

        let err = gw.send("standup", &bob()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransportFailure);
        assert!(gw.status().is_connected());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_terminate_waits_for_inflight_command() {
        let (gw, robot, store) = gateway(GatewayConfig::default());
        gw.connect("10.0.0.1", &bob()).await.unwrap();
        robot.update_faults(|f| f.command_delay = Duration::from_millis(100));

        let sender = gw.clone();
        let inflight = tokio::spawn(async move { sender.send("forward", &bob()).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        gw.terminate(&bob()).await.unwrap();

        inflight.await.unwrap().unwrap();
        let ops: Vec<String> = store
            .query(10)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.operation)
            .collect();
        assert_eq!(
            ops,
            [
                "Session terminated",
                "Sent command: forward",
                "Session established: 10.0.0.1"
            ]
        );
        assert_eq!(
            gw.send("stop", &bob()).await.unwrap_err(),
            GatewayError::NotConnected
        );
    }

    #[tokio::test]
    async fn test_abandoned_send_is_still_logged() {
        let (gw, robot, _) = gateway(GatewayConfig::default());
        gw.connect("10.0.0.1", &bob()).await.unwrap();
        robot.update_faults(|f| f.command_delay = Duration::from_millis(100));
        let mut entries = gw.log_feed().get_receiver();

        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), gw.send("forward", &bob())).await;
        assert!(abandoned.is_err());

        let entry = tokio::time::timeout(Duration::from_secs(5), entries.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.operation, "Sent command: forward");
        assert_eq!(entry.user_id, bob());
        assert_eq!(robot.sent_commands(), [CommandKind::Forward]);
    }

    #[tokio::test]
    async fn test_concurrent_sends_wait_for_their_own_round_trip() {
        let (gw, robot, store) = gateway(GatewayConfig::default());
        gw.connect("10.0.0.1", &bob()).await.unwrap();
        robot.update_faults(|f| f.command_delay = Duration::from_millis(100));

        let first = {
            let gw = gw.clone();
            tokio::spawn(async move { gw.send("forward", &bob()).await })
        };
        tokio::time::sleep(Duration::from_millis(40)).await;
        let second = {
            let gw = gw.clone();
            tokio::spawn(async move { gw.send("stop", &UserId::new("dave")).await })
        };

        assert_eq!(first.await.unwrap().unwrap(), CommandKind::Forward);
        // Not serialized behind the first call, but still in flight.
        assert!(!second.is_finished());
        assert_eq!(second.await.unwrap().unwrap(), CommandKind::Stop);

        assert_eq!(robot.sent_commands(), [CommandKind::Forward, CommandKind::Stop]);
        let latest = store.query(2).await.unwrap();
        assert_eq!(latest[0].operation, "Sent command: stop");
        assert_eq!(latest[0].user_id, UserId::new("dave"));
        assert_eq!(latest[1].operation, "Sent command: forward");
        assert_eq!(latest[1].user_id, bob());
    }
}
