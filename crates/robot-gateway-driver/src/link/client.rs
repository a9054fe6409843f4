//! TCP client for the robot bridge.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex as StdMutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use robot_gateway_core::{
    CommandKind, RobotAddress, RobotTransport, TelemetrySnapshot, VideoFrame,
    traits::TransportError,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::{Mutex, RwLock, oneshot},
    task::JoinHandle,
};

use super::protocol::{LinkReply, LinkRequest, ReplyBody, RequestBody};
use crate::SportRequest;

/// Requests awaiting a reply.
#[derive(Default)]
struct PendingTable {
    closed: bool,
    waiters: HashMap<u64, oneshot::Sender<ReplyBody>>,
}

type Pending = Arc<StdMutex<PendingTable>>;

fn lock_pending(pending: &Pending) -> std::sync::MutexGuard<'_, PendingTable> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mark the table closed and fail every waiter.
fn close_pending(pending: &Pending) {
    let mut table = lock_pending(pending);
    table.closed = true;
    table.waiters.clear();
}

/// One open connection to the bridge.
struct Link {
    writer: Mutex<BufWriter<OwnedWriteHalf>>,
    pending: Pending,
    reader: JoinHandle<()>,
}

/// Removes a pending request slot when the caller gives up waiting.
struct PendingSlot<'a> {
    pending: &'a Pending,
    id: u64,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        lock_pending(self.pending).waiters.remove(&self.id);
    }
}

/// Robot transport speaking JSON lines to a robot-side bridge over TCP.
///
/// Requests are correlated by id, so concurrent callers can share the link.
pub struct TcpRobotLink {
    port: u16,
    next_id: AtomicU64,
    link: RwLock<Option<Arc<Link>>>,
}

impl TcpRobotLink {
    /// Create a link that will dial the bridge on `port`.
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            port,
            next_id: AtomicU64::new(1),
            link: RwLock::new(None),
        }
    }

    /// Send one request and wait for its reply.
    async fn request(&self, body: RequestBody) -> Result<ReplyBody, TransportError> {
        let link = self
            .link
            .read()
            .await
            .clone()
            .ok_or(TransportError::NotOpen)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut table = lock_pending(&link.pending);
            if table.closed {
                return Err(TransportError::Io("bridge closed the link".into()));
            }
            table.waiters.insert(id, tx);
        }
        let _slot = PendingSlot {
            pending: &link.pending,
            id,
        };

        let line = serde_json::to_string(&LinkRequest { id, body })
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        {
            let mut writer = link.writer.lock().await;
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }

        match rx.await {
            Ok(ReplyBody::Error { message }) => Err(TransportError::Rejected(message)),
            Ok(reply) => Ok(reply),
            Err(_) => Err(TransportError::Io("bridge closed the link".into())),
        }
    }

    async fn read_loop(read_half: OwnedReadHalf, pending: Pending) {
        let mut lines = BufReader::new(read_half).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<LinkReply>(line) {
                        Ok(reply) => {
                            let waiter = lock_pending(&pending).waiters.remove(&reply.id);
                            match waiter {
                                Some(tx) => {
                                    let _ = tx.send(reply.body);
                                }
                                None => tracing::debug!(id = reply.id, "Reply for abandoned request"),
                            }
                        }
                        Err(e) => tracing::warn!("Invalid bridge reply: {e}"),
                    }
                }
                Ok(None) => {
                    tracing::info!("Robot bridge closed the link");
                    break;
                }
                Err(e) => {
                    tracing::error!("Error reading from robot bridge: {e}");
                    break;
                }
            }
        }

        // Dropping the senders fails every in-flight request.
        close_pending(&pending);
    }
}

#[async_trait]
impl RobotTransport for TcpRobotLink {
    async fn connect(&self, address: RobotAddress) -> Result<(), TransportError> {
        let mut slot = self.link.write().await;
        if slot.is_some() {
            return Err(TransportError::ConnectFailed("link already open".into()));
        }

        let stream = TcpStream::connect((address.ip(), self.port))
            .await
            .map_err(|e| TransportError::ConnectFailed(format!("{address}:{}: {e}", self.port)))?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        let pending: Pending = Arc::default();
        let reader = tokio::spawn(Self::read_loop(read_half, Arc::clone(&pending)));

        *slot = Some(Arc::new(Link {
            writer: Mutex::new(BufWriter::new(write_half)),
            pending,
            reader,
        }));
        drop(slot);

        tracing::info!(%address, port = self.port, "Robot link open");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let Some(link) = self.link.write().await.take() else {
            return Ok(());
        };
        link.reader.abort();
        close_pending(&link.pending);
        let result = link.writer.lock().await.shutdown().await;
        tracing::info!("Robot link closed");
        result.map_err(Into::into)
    }

    async fn send_command(&self, command: CommandKind) -> Result<(), TransportError> {
        match self
            .request(RequestBody::sport(SportRequest::from(command)))
            .await?
        {
            ReplyBody::Ack => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    async fn fetch_status(&self) -> Result<TelemetrySnapshot, TransportError> {
        match self.request(RequestBody::GetLowState).await? {
            ReplyBody::LowState { state } => Ok(TelemetrySnapshot::from(&state)),
            other => Err(unexpected(&other)),
        }
    }

    async fn fetch_frame(&self) -> Result<Option<VideoFrame>, TransportError> {
        match self.request(RequestBody::GetFrame).await? {
            ReplyBody::NoFrame => Ok(None),
            reply @ ReplyBody::Frame { .. } => reply
                .decode_frame()
                .map(Some)
                .ok_or_else(|| TransportError::Protocol("undecodable frame".into())),
            other => Err(unexpected(&other)),
        }
    }

    async fn heartbeat(&self) -> Result<(), TransportError> {
        match self.request(RequestBody::Ping).await? {
            ReplyBody::Pong => Ok(()),
            other => Err(unexpected(&other)),
        }
    }
}

fn unexpected(reply: &ReplyBody) -> TransportError {
    TransportError::Protocol(format!("unexpected reply: {reply:?}"))
}
