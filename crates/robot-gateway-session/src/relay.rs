//! Telemetry and video relay.
//!
//! One-shot fetches plus periodic subscriptions. Each subscription is a task
//! on the session's tracker, so terminating the session stops it.

use std::{
    fmt,
    sync::{Arc, Weak},
    time::Duration,
};

use futures::future::BoxFuture;
use robot_gateway_core::{
    GatewayError, OperationLogStore, RobotTransport, TelemetrySnapshot, VideoFrame,
};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{MissedTickBehavior, timeout},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{Gateway, manager::Inner};

/// Shortest accepted relay cadence.
pub(crate) const MIN_INTERVAL: Duration = Duration::from_millis(1);
/// Longest accepted cadence; keeps timer deadlines far from overflow.
pub(crate) const MAX_INTERVAL: Duration = Duration::from_secs(3600);

/// Relayed stream kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayStream {
    Telemetry,
    Video,
}

impl fmt::Display for RelayStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Telemetry => "telemetry",
            Self::Video => "video",
        })
    }
}

/// Latest relayed value; `None` until the first tick delivers.
pub type Latest<V> = watch::Receiver<Option<Result<V, GatewayError>>>;

type Callback<V> = Arc<dyn Fn(Result<V, GatewayError>) + Send + Sync>;
type Fetch<T, L, V> = fn(&Inner<T, L>) -> BoxFuture<'_, Result<V, GatewayError>>;

/// Handle to a running relay subscription.
///
/// Dropping the handle cancels the loop without waiting for it.
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: Uuid,
    stream: RelayStream,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    /// Subscription id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Stream this subscription relays.
    #[must_use]
    pub const fn stream(&self) -> RelayStream {
        self.stream
    }

    /// Whether the loop is still running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Cancel the loop and wait for it to exit.
    ///
    /// No callback fires after this returns.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(id = %self.id, stream = %self.stream, "Relay task failed: {e}");
            }
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<T, L> Inner<T, L>
where
    T: RobotTransport + 'static,
    L: OperationLogStore + 'static,
{
    async fn fetch_snapshot(&self) -> Result<TelemetrySnapshot, GatewayError> {
        timeout(self.config.fetch_timeout, self.transport.fetch_status())
            .await
            .map_err(|_| fetch_timed_out("status", self.config.fetch_timeout))?
            .map_err(Into::into)
    }

    async fn fetch_frame(&self) -> Result<VideoFrame, GatewayError> {
        timeout(self.config.fetch_timeout, self.transport.fetch_frame())
            .await
            .map_err(|_| fetch_timed_out("frame", self.config.fetch_timeout))??
            .ok_or(GatewayError::NoFrameAvailable)
    }
}

fn fetch_timed_out(what: &str, limit: Duration) -> GatewayError {
    GatewayError::TransportFailure(format!(
        "{what} fetch timed out after {} ms",
        limit.as_millis()
    ))
}

fn snapshot_fetch<T, L>(inner: &Inner<T, L>) -> BoxFuture<'_, Result<TelemetrySnapshot, GatewayError>>
where
    T: RobotTransport + 'static,
    L: OperationLogStore + 'static,
{
    Box::pin(inner.fetch_snapshot())
}

fn frame_fetch<T, L>(inner: &Inner<T, L>) -> BoxFuture<'_, Result<VideoFrame, GatewayError>>
where
    T: RobotTransport + 'static,
    L: OperationLogStore + 'static,
{
    Box::pin(inner.fetch_frame())
}

impl<T, L> Gateway<T, L>
where
    T: RobotTransport + 'static,
    L: OperationLogStore + 'static,
{
    /// Fetch one telemetry reading.
    ///
    /// # Errors
    /// Returns `NotConnected` without a session or `TransportFailure` if the
    /// fetch fails or times out.
    pub async fn get_snapshot(&self) -> Result<TelemetrySnapshot, GatewayError> {
        let session = self.inner.session.read().await;
        if session.is_none() {
            return Err(GatewayError::NotConnected);
        }
        let snapshot = self.inner.fetch_snapshot().await;
        drop(session);
        snapshot
    }

    /// Fetch the latest camera frame.
    ///
    /// # Errors
    /// Returns `NotConnected` without a session, `NoFrameAvailable` if the
    /// robot has none buffered, or `TransportFailure`.
    pub async fn get_frame(&self) -> Result<VideoFrame, GatewayError> {
        let session = self.inner.session.read().await;
        if session.is_none() {
            return Err(GatewayError::NotConnected);
        }
        let frame = self.inner.fetch_frame().await;
        drop(session);
        frame
    }

    /// Relay telemetry to `callback` every `interval`.
    ///
    /// # Errors
    /// Returns `NotConnected` without a session.
    pub async fn subscribe_telemetry<F>(
        &self,
        callback: F,
        interval: Duration,
    ) -> Result<SubscriptionHandle, GatewayError>
    where
        F: Fn(Result<TelemetrySnapshot, GatewayError>) + Send + Sync + 'static,
    {
        self.subscribe(
            RelayStream::Telemetry,
            snapshot_fetch::<T, L>,
            Arc::new(callback),
            interval,
        )
        .await
    }

    /// Relay camera frames to `callback` every `interval`.
    ///
    /// Ticks on which the robot has no frame buffered deliver nothing.
    ///
    /// # Errors
    /// Returns `NotConnected` without a session.
    pub async fn subscribe_frames<F>(
        &self,
        callback: F,
        interval: Duration,
    ) -> Result<SubscriptionHandle, GatewayError>
    where
        F: Fn(Result<VideoFrame, GatewayError>) + Send + Sync + 'static,
    {
        self.subscribe(
            RelayStream::Video,
            frame_fetch::<T, L>,
            Arc::new(callback),
            interval,
        )
        .await
    }

    /// Relay telemetry into a latest-value channel.
    ///
    /// # Errors
    /// Returns `NotConnected` without a session.
    pub async fn watch_telemetry(
        &self,
        interval: Duration,
    ) -> Result<(SubscriptionHandle, Latest<TelemetrySnapshot>), GatewayError> {
        let (tx, rx) = watch::channel(None);
        let handle = self
            .subscribe_telemetry(move |r| {
                tx.send_replace(Some(r));
            }, interval)
            .await?;
        Ok((handle, rx))
    }

    /// Relay camera frames into a latest-value channel.
    ///
    /// # Errors
    /// Returns `NotConnected` without a session.
    pub async fn watch_frames(
        &self,
        interval: Duration,
    ) -> Result<(SubscriptionHandle, Latest<VideoFrame>), GatewayError> {
        let (tx, rx) = watch::channel(None);
        let handle = self
            .subscribe_frames(move |r| {
                tx.send_replace(Some(r));
            }, interval)
            .await?;
        Ok((handle, rx))
    }

    async fn subscribe<V: Send + 'static>(
        &self,
        stream: RelayStream,
        fetch: Fetch<T, L, V>,
        callback: Callback<V>,
        interval: Duration,
    ) -> Result<SubscriptionHandle, GatewayError> {
        let session = self.inner.session.read().await;
        let active = session.as_ref().ok_or(GatewayError::NotConnected)?;

        let id = Uuid::new_v4();
        let cancel = active.shutdown.child_token();
        let task = active.tasks.spawn(relay_loop(RelayTask {
            inner: Arc::downgrade(&self.inner),
            epoch: active.epoch,
            id,
            stream,
            interval: interval.clamp(MIN_INTERVAL, MAX_INTERVAL),
            threshold: self.inner.config.relay_failure_threshold,
            cancel: cancel.clone(),
            fetch,
            callback,
        }));
        tracing::debug!(%id, %stream, ?interval, "Relay subscribed");

        Ok(SubscriptionHandle {
            id,
            stream,
            cancel,
            task: Some(task),
        })
    }
}

struct RelayTask<T, L, V> {
    inner: Weak<Inner<T, L>>,
    epoch: u64,
    id: Uuid,
    stream: RelayStream,
    interval: Duration,
    threshold: u32,
    cancel: CancellationToken,
    fetch: Fetch<T, L, V>,
    callback: Callback<V>,
}

async fn relay_loop<T, L, V>(task: RelayTask<T, L, V>)
where
    T: RobotTransport + 'static,
    L: OperationLogStore + 'static,
    V: Send + 'static,
{
    let RelayTask {
        inner,
        epoch,
        id,
        stream,
        interval,
        threshold,
        cancel,
        fetch,
        callback,
    } = task;

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut failures = 0u32;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let Some(strong) = inner.upgrade() else {
            break;
        };

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            outcome = async {
                let session = strong.session.read().await;
                if session.as_ref().is_none_or(|active| active.epoch != epoch) {
                    return None;
                }
                Some(fetch(&strong).await)
            } => outcome,
        };
        drop(strong);

        match outcome {
            None => break,
            Some(Ok(value)) => {
                failures = 0;
                callback(Ok(value));
            }
            Some(Err(GatewayError::NoFrameAvailable)) => {
                tracing::trace!(%id, "No frame buffered");
            }
            Some(Err(e)) => {
                failures += 1;
                tracing::warn!(%id, %stream, failures, "Relay tick failed: {e}");
                if threshold > 0 && failures >= threshold {
                    failures = 0;
                    callback(Err(GatewayError::TransportFailure(format!(
                        "{stream} relay failed {threshold} consecutive times: {e}"
                    ))));
                }
            }
        }
    }

    tracing::debug!(%id, %stream, "Relay stopped");
}
