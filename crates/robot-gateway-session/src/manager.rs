//! Connection manager owning the exclusive robot session.

use std::{
    future::Future,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use robot_gateway_core::{
    GatewayConfig, GatewayError, LogEntry, LogFeed, OperationLogStore, RobotAddress,
    RobotTransport, UserId, now_millis, traits::StorageError,
};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{RwLock, watch},
    time::{MissedTickBehavior, timeout},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    OperationLog,
    relay::{MAX_INTERVAL, MIN_INTERVAL},
};

/// An established robot session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Address of the connected robot.
    pub robot_address: RobotAddress,
    /// Unix epoch milliseconds.
    pub established_at: i64,
}

/// Observable session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    /// No robot connected.
    Disconnected,
    /// A robot session is active.
    Connected(Session),
}

impl SessionStatus {
    /// Whether a session is active.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }
}

/// Live state of the connected session.
pub(crate) struct ActiveSession {
    pub(crate) info: Session,
    /// Distinguishes this session from earlier and later ones.
    pub(crate) epoch: u64,
    /// Cancels every background task of this session.
    pub(crate) shutdown: CancellationToken,
    /// Relay loops and the heartbeat.
    pub(crate) tasks: TaskTracker,
}

pub(crate) struct Inner<T, L> {
    pub(crate) transport: T,
    pub(crate) log: OperationLog<L>,
    pub(crate) config: GatewayConfig,
    /// Single point of truth for Connected/Disconnected.
    pub(crate) session: RwLock<Option<ActiveSession>>,
    status_tx: watch::Sender<SessionStatus>,
    epochs: AtomicU64,
}

/// Gateway to a single robot.
///
/// At most one session is active at a time. Commands, fetches and
/// subscriptions hold the session read lock for their whole round-trip;
/// connect and terminate hold the write lock, so a terminate waits for
/// in-flight operations and later operations observe `NotConnected`.
///
/// Connect, terminate and commands run on their own tasks: a caller that
/// stops waiting never leaves a transition or a log entry half done.
pub struct Gateway<T, L> {
    pub(crate) inner: Arc<Inner<T, L>>,
}

impl<T, L> Clone for Gateway<T, L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, L> Gateway<T, L>
where
    T: RobotTransport + 'static,
    L: OperationLogStore + 'static,
{
    /// Create a gateway with default timings.
    #[must_use]
    pub fn new(transport: T, store: L) -> Self {
        Self::with_config(transport, store, GatewayConfig::default())
    }

    /// Create a gateway.
    #[must_use]
    pub fn with_config(transport: T, store: L, config: GatewayConfig) -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::Disconnected);
        Self {
            inner: Arc::new(Inner {
                transport,
                log: OperationLog::new(store),
                config,
                session: RwLock::new(None),
                status_tx,
                epochs: AtomicU64::new(0),
            }),
        }
    }

    /// Runtime configuration.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    /// Connect to the robot at `address`.
    ///
    /// # Errors
    /// Returns `InvalidAddress` for a malformed address, `AlreadyConnected`
    /// if a session is active, or `TransportFailure` if the robot cannot be
    /// reached within the connect timeout.
    pub async fn connect(&self, address: &str, user: &UserId) -> Result<Session, GatewayError> {
        let address = RobotAddress::parse(address)?;
        let inner = Arc::clone(&self.inner);
        let user = user.clone();
        run_detached(async move { inner.connect(address, &user).await }).await
    }

    /// Terminate the active session.
    ///
    /// Every relay loop and the heartbeat have stopped when this returns.
    ///
    /// # Errors
    /// Returns `NotConnected` if no session is active.
    pub async fn terminate(&self, user: &UserId) -> Result<(), GatewayError> {
        let inner = Arc::clone(&self.inner);
        let user = user.clone();
        run_detached(async move { inner.terminate(&user).await }).await
    }

    /// Current session state.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.inner.status_tx.borrow().clone()
    }

    /// Receiver notified on every session state change.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status_tx.subscribe()
    }

    /// The most recent `limit` operation log entries, newest first.
    ///
    /// # Errors
    /// Returns error if the log store cannot be read.
    pub async fn query_logs(&self, limit: usize) -> Result<Vec<LogEntry>, StorageError> {
        self.inner.log.query(limit).await
    }

    /// Live feed of operation log entries.
    #[must_use]
    pub fn log_feed(&self) -> Arc<LogFeed> {
        self.inner.log.feed()
    }

    /// Number of operation log writes that failed since start.
    #[must_use]
    pub fn log_write_failures(&self) -> u64 {
        self.inner.log.write_failures()
    }

    /// Terminate the session, if any, on behalf of the gateway itself.
    pub async fn shutdown(&self) {
        match self.terminate(&UserId::system()).await {
            Ok(()) | Err(GatewayError::NotConnected) => {}
            Err(e) => tracing::warn!("Shutdown terminate failed: {e}"),
        }
    }
}

impl<T, L> Inner<T, L>
where
    T: RobotTransport + 'static,
    L: OperationLogStore + 'static,
{
    async fn connect(
        self: &Arc<Self>,
        address: RobotAddress,
        user: &UserId,
    ) -> Result<Session, GatewayError> {
        let mut slot = self.session.write().await;
        if let Some(active) = slot.as_ref() {
            return Err(GatewayError::AlreadyConnected(active.info.robot_address));
        }

        let connect_timeout = self.config.connect_timeout;
        match timeout(connect_timeout, self.transport.connect(address)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(%address, "Robot connect failed: {e}");
                return Err(e.into());
            }
            Err(_) => {
                tracing::warn!(%address, "Robot connect timed out");
                // Do not leave a half-open link behind.
                if let Err(e) = self.transport.disconnect().await {
                    tracing::debug!("Disconnect after connect timeout failed: {e}");
                }
                return Err(GatewayError::TransportFailure(format!(
                    "connect to {address} timed out after {} ms",
                    connect_timeout.as_millis()
                )));
            }
        }

        let epoch = self.epochs.fetch_add(1, Ordering::Relaxed) + 1;
        let info = Session {
            robot_address: address,
            established_at: now_millis(),
        };
        let active = ActiveSession {
            info: info.clone(),
            epoch,
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        };
        if self.config.heartbeat_failure_limit > 0 {
            active.tasks.spawn(heartbeat_loop(
                Arc::downgrade(self),
                epoch,
                active.shutdown.child_token(),
            ));
        }
        *slot = Some(active);
        self.status_tx
            .send_replace(SessionStatus::Connected(info.clone()));

        tracing::info!(%address, epoch, user = %user, "Robot session established");
        self.log
            .record(format!("Session established: {address}"), user)
            .await;

        Ok(info)
    }

    async fn terminate(&self, user: &UserId) -> Result<(), GatewayError> {
        let mut slot = self.session.write().await;
        let active = slot.take().ok_or(GatewayError::NotConnected)?;
        let address = active.info.robot_address;

        self.teardown(active).await;

        tracing::info!(%address, user = %user, "Robot session terminated");
        self.log.record("Session terminated", user).await;
        Ok(())
    }

    /// Stop every task of `active`, close the link and publish Disconnected.
    ///
    /// Callers hold the session write lock.
    async fn teardown(&self, active: ActiveSession) {
        active.shutdown.cancel();
        active.tasks.close();
        active.tasks.wait().await;

        match timeout(self.config.connect_timeout, self.transport.disconnect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Robot disconnect failed: {e}"),
            Err(_) => tracing::warn!("Robot disconnect timed out"),
        }

        self.status_tx.send_replace(SessionStatus::Disconnected);
    }

    /// Tear down session `epoch` after a fatal link failure.
    ///
    /// No-op if that session has already ended.
    async fn lose_session(&self, epoch: u64, reason: String) {
        let mut slot = self.session.write().await;
        if slot.as_ref().is_none_or(|active| active.epoch != epoch) {
            return;
        }
        let Some(active) = slot.take() else {
            return;
        };
        let address = active.info.robot_address;

        self.teardown(active).await;

        tracing::error!(%address, epoch, "Robot session lost: {reason}");
        self.log
            .record(format!("Session lost: {reason}"), &UserId::system())
            .await;
    }
}

/// Run `work` on its own task so it completes even if the caller stops
/// polling. Session transitions and command logging are never left half done.
pub(crate) async fn run_detached<F, R>(work: F) -> Result<R, GatewayError>
where
    F: Future<Output = Result<R, GatewayError>> + Send + 'static,
    R: Send + 'static,
{
    match tokio::spawn(work).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(GatewayError::TransportFailure(format!(
            "gateway task cancelled: {e}"
        ))),
    }
}

/// Probe the link until cancelled; declare the session lost after too many
/// consecutive failures.
async fn heartbeat_loop<T, L>(inner: Weak<Inner<T, L>>, epoch: u64, cancel: CancellationToken)
where
    T: RobotTransport + 'static,
    L: OperationLogStore + 'static,
{
    let Some(config) = inner.upgrade().map(|i| i.config.clone()) else {
        return;
    };
    let period = config.heartbeat_interval.clamp(MIN_INTERVAL, MAX_INTERVAL);
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut failures = 0u32;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let Some(strong) = inner.upgrade() else {
            return;
        };

        let probe = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            probe = timeout(config.fetch_timeout, strong.transport.heartbeat()) => probe,
        };
        let error = match probe {
            Ok(Ok(())) => {
                failures = 0;
                continue;
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => "heartbeat timed out".to_string(),
        };

        failures += 1;
        tracing::warn!(epoch, failures, "Robot heartbeat failed: {error}");
        if failures >= config.heartbeat_failure_limit {
            // Teardown waits for this task, so it must run elsewhere.
            let reason = format!("{failures} consecutive heartbeat failures ({error})");
            tokio::spawn(async move { strong.lose_session(epoch, reason).await });
            return;
        }
    }
}
