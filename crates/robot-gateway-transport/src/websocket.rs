//! WebSocket live channel.
//!
//! One connection per browser tab. Commands are acknowledged inline;
//! telemetry and video go through one latest-value slot per stream, so a
//! slow socket only ever sees the newest reading.

use std::{collections::HashMap, time::Duration};

use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use robot_gateway_core::{GatewayError, User, identity::IdentityError};
use robot_gateway_session::{RelayStream, SubscriptionHandle, relay::Latest};
use serde::Deserialize;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

use crate::{
    AppState,
    error::ApiError,
    protocol::{ClientMessage, ServerMessage},
};

/// Query parameters of the upgrade request.
#[derive(Debug, Deserialize)]
pub struct WsParams {
    #[serde(default)]
    token: Option<String>,
}

/// WebSocket upgrade handler.
///
/// The socket authenticates with the `token` query parameter since browsers
/// cannot set headers on upgrade requests.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let token = params.token.ok_or(IdentityError::MissingCredentials)?;
    let user = state.identity.authenticate(&token).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user)))
}

/// Replies queued before the reader stops taking client messages.
const REPLY_CAPACITY: usize = 32;

/// Longest client-requested relay cadence.
const MAX_INTERVAL_MS: u64 = 60_000;

async fn handle_socket(socket: WebSocket, state: AppState, user: User) {
    let (mut sender, mut receiver) = socket.split();
    tracing::info!(user = %user.id, "WebSocket connected");

    let (outbox, mut inbox) = outbox();

    let send_task = tokio::spawn(async move {
        while let Some(msg) = inbox.next().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!("Failed to serialize message: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut conn = Connection::new(state, user, outbox);
    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!("WebSocket error: {e}");
                break;
            }
        };

        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(msg) => conn.handle(msg).await,
            Err(e) => {
                tracing::debug!("Invalid client message: {e}");
                conn.reply(ServerMessage::Error {
                    kind: None,
                    message: format!("Invalid message: {e}"),
                })
                .await;
            }
        }
    }

    let user = conn.user.id.clone();
    conn.close().await;
    send_task.abort();
    tracing::info!(user = %user, "WebSocket disconnected");
}

type Slot = watch::Sender<Option<ServerMessage>>;

/// Producer side of a socket's outgoing traffic.
///
/// Replies queue in order. Relayed values overwrite their stream's slot.
#[derive(Clone)]
struct Outbox {
    replies: mpsc::Sender<ServerMessage>,
    telemetry: Slot,
    video: Slot,
}

/// Writer side of an [`Outbox`].
struct Inbox {
    replies: mpsc::Receiver<ServerMessage>,
    telemetry: watch::Receiver<Option<ServerMessage>>,
    video: watch::Receiver<Option<ServerMessage>>,
}

fn outbox() -> (Outbox, Inbox) {
    let (replies_tx, replies) = mpsc::channel(REPLY_CAPACITY);
    let (telemetry_tx, telemetry) = watch::channel(None);
    let (video_tx, video) = watch::channel(None);
    (
        Outbox {
            replies: replies_tx,
            telemetry: telemetry_tx,
            video: video_tx,
        },
        Inbox {
            replies,
            telemetry,
            video,
        },
    )
}

impl Outbox {
    const fn slot(&self, stream: RelayStream) -> &Slot {
        match stream {
            RelayStream::Telemetry => &self.telemetry,
            RelayStream::Video => &self.video,
        }
    }
}

impl Inbox {
    /// Next message to write, replies first. `None` once the connection is
    /// gone.
    async fn next(&mut self) -> Option<ServerMessage> {
        loop {
            let changed = tokio::select! {
                biased;
                reply = self.replies.recv() => return reply,
                changed = self.telemetry.changed() => changed.map(|()| RelayStream::Telemetry),
                changed = self.video.changed() => changed.map(|()| RelayStream::Video),
            };
            let slot = match changed.ok()? {
                RelayStream::Telemetry => &mut self.telemetry,
                RelayStream::Video => &mut self.video,
            };
            // A cleared slot means the stream was unsubscribed.
            if let Some(msg) = slot.borrow_and_update().clone() {
                return Some(msg);
            }
        }
    }
}

struct Subscription {
    handle: SubscriptionHandle,
    forwarder: JoinHandle<()>,
}

/// Per-socket state: the caller and its relay subscriptions.
struct Connection {
    state: AppState,
    user: User,
    outbox: Outbox,
    subscriptions: HashMap<RelayStream, Subscription>,
}

impl Connection {
    fn new(state: AppState, user: User, outbox: Outbox) -> Self {
        Self {
            state,
            user,
            outbox,
            subscriptions: HashMap::new(),
        }
    }

    async fn reply(&self, msg: ServerMessage) {
        let _ = self.outbox.replies.send(msg).await;
    }

    async fn handle(&mut self, msg: ClientMessage) {
        match msg {
            ClientMessage::Ping => self.reply(ServerMessage::Pong).await,
            ClientMessage::Command { command } => {
                let reply = match self.state.gateway.send(&command, &self.user.id).await {
                    Ok(command) => ServerMessage::CommandAck { command },
                    Err(e) => ServerMessage::error(&e),
                };
                self.reply(reply).await;
            }
            ClientMessage::Subscribe {
                stream,
                interval_ms,
            } => self.subscribe(stream, interval_ms).await,
            ClientMessage::Unsubscribe { stream } => self.unsubscribe(stream).await,
        }
    }

    async fn subscribe(&mut self, stream: RelayStream, interval_ms: Option<u64>) {
        self.unsubscribe(stream).await;

        let gateway = &self.state.gateway;
        let config = gateway.config();
        let requested = interval_ms.map(|ms| Duration::from_millis(ms.min(MAX_INTERVAL_MS)));
        let outbox = self.outbox.clone();
        let result = match stream {
            RelayStream::Telemetry => {
                let interval = requested.unwrap_or(config.telemetry_interval);
                gateway.watch_telemetry(interval).await.map(|(handle, latest)| {
                    (handle, forward(latest, outbox, stream, ServerMessage::Telemetry))
                })
            }
            RelayStream::Video => {
                let interval = requested.unwrap_or(config.video_interval);
                gateway.watch_frames(interval).await.map(|(handle, latest)| {
                    (handle, forward(latest, outbox, stream, |f| ServerMessage::frame(&f)))
                })
            }
        };

        match result {
            Ok((handle, forwarder)) => {
                tracing::debug!(user = %self.user.id, %stream, "Socket subscribed");
                self.subscriptions
                    .insert(stream, Subscription { handle, forwarder });
            }
            Err(e) => self.reply(ServerMessage::error(&e)).await,
        }
    }

    async fn unsubscribe(&mut self, stream: RelayStream) {
        if let Some(sub) = self.subscriptions.remove(&stream) {
            sub.forwarder.abort();
            sub.handle.stop().await;
            // Drop a value the writer has not picked up yet.
            self.outbox.slot(stream).send_replace(None);
        }
    }

    async fn close(mut self) {
        let streams: Vec<RelayStream> = self.subscriptions.keys().copied().collect();
        for stream in streams {
            self.unsubscribe(stream).await;
        }
    }
}

/// Publish every new relayed value into the stream's slot until the relay
/// ends.
fn forward<V, F>(
    mut latest: Latest<V>,
    outbox: Outbox,
    stream: RelayStream,
    to_message: F,
) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
    F: Fn(V) -> ServerMessage + Send + 'static,
{
    tokio::spawn(async move {
        while latest.changed().await.is_ok() {
            let value = latest.borrow_and_update().clone();
            let msg = match value {
                Some(Ok(v)) => to_message(v),
                Some(Err(e)) => ServerMessage::RelayFailure {
                    stream,
                    message: e.to_string(),
                },
                None => continue,
            };
            outbox.slot(stream).send_replace(Some(msg));
        }
        // Relay ended with the session.
        let _ = outbox
            .replies
            .send(ServerMessage::error(&GatewayError::NotConnected))
            .await;
    })
}
