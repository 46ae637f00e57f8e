//! WebSocket connections.
//!
//! Each socket registers with the broadcaster on connect and forwards every
//! update queued for it. Clients join and leave polls with frames; text
//! messages carry JSON, binary messages carry length-prefixed MessagePack, and
//! server frames follow whichever encoding the client used last.

use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use bytes::BytesMut;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use quickpoll_core::{BroadcastError, PollError};
use quickpoll_protocol::{codec, codes, Encoding, Frame, ProtocolError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::metrics::{self, ConnectionMetricsGuard};
use crate::state::AppState;

type WsSink = SplitSink<WebSocket, Message>;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let max_message_size = state.config.limits.max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let connection_id = format!(
        "conn_{}",
        NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
    );
    let broadcaster = state.service.broadcaster();
    let mut updates = broadcaster.connect(&connection_id);

    debug!(connection = %connection_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();
    let mut encoding = Encoding::Json;

    if let Err(e) = send_frame(&mut sender, &Frame::connected(&connection_id), encoding).await {
        error!(connection = %connection_id, error = %e, "Failed to send Connected frame");
        broadcaster.disconnect(&connection_id);
        return;
    }

    // Read buffer for partial binary frames
    let mut read_buffer = BytesMut::with_capacity(4096);

    loop {
        tokio::select! {
            biased;

            Some(update) = updates.recv() => {
                let frame = Frame::poll_update(update.poll.clone());
                let message = match encode_frame(&frame, encoding) {
                    Ok(message) => message,
                    Err(e) => {
                        // Skip this update, the connection itself is fine
                        error!(connection = %connection_id, poll = update.poll_id, error = %e, "Failed to encode update");
                        metrics::record_error("encode");
                        continue;
                    }
                };
                metrics::record_message("outbound");
                if let Err(e) = sender.send(message).await {
                    debug!(connection = %connection_id, error = %e, "Failed to deliver update");
                    break;
                }
                metrics::record_update_delivered();
            }

            msg = receiver.next() => {
                let result = match msg {
                    Some(Ok(Message::Text(text))) => {
                        metrics::record_message("inbound");
                        encoding = Encoding::Json;
                        match codec::decode_json(&text) {
                            Ok(frame) => handle_frame(frame, &connection_id, &state, &mut sender, encoding).await,
                            Err(e) => reject(&mut sender, &connection_id, &e.to_string(), encoding).await,
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        metrics::record_message("inbound");
                        encoding = Encoding::MessagePack;
                        read_buffer.extend_from_slice(&data);
                        drain_binary(&mut read_buffer, &connection_id, &state, &mut sender).await
                    }
                    Some(Ok(Message::Ping(data))) => sender.send(Message::Pong(data)).await.map_err(Into::into),
                    Some(Ok(Message::Pong(_))) => Ok(()),
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                };

                if let Err(e) = result {
                    debug!(connection = %connection_id, error = %e, "Failed to write to socket");
                    break;
                }
            }
        }
    }

    broadcaster.disconnect(&connection_id);
    metrics::set_polls_watched(broadcaster.stats().topic_count);

    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Handle every complete MessagePack frame in the buffer.
async fn drain_binary(
    read_buffer: &mut BytesMut,
    connection_id: &str,
    state: &Arc<AppState>,
    sender: &mut WsSink,
) -> Result<()> {
    loop {
        match codec::decode_from(read_buffer) {
            Ok(Some(frame)) => {
                handle_frame(frame, connection_id, state, sender, Encoding::MessagePack).await?;
            }
            Ok(None) => return Ok(()),
            Err(e) => {
                read_buffer.clear();
                return reject(sender, connection_id, &e.to_string(), Encoding::MessagePack).await;
            }
        }
    }
}

/// Handle a decoded frame.
async fn handle_frame(
    frame: Frame,
    connection_id: &str,
    state: &Arc<AppState>,
    sender: &mut WsSink,
    encoding: Encoding,
) -> Result<()> {
    if !frame.is_client_frame() {
        warn!(connection = %connection_id, frame_type = %frame.frame_type(), "Unexpected frame type");
        let message = format!("{} frames are sent by the server", frame.frame_type());
        return send_frame(sender, &Frame::error(0, codes::BAD_FRAME, message), encoding).await;
    }

    match frame {
        Frame::Join { id, poll_id } => {
            debug!(connection = %connection_id, poll = poll_id, "Join request");

            let response = match state.service.join(connection_id, poll_id).await {
                Ok(joined) => {
                    if joined {
                        metrics::record_subscription();
                    }
                    metrics::set_polls_watched(state.service.broadcaster().stats().topic_count);
                    Frame::ack(id)
                }
                Err(e) => {
                    warn!(connection = %connection_id, poll = poll_id, error = %e, "Join failed");
                    Frame::error(id, error_code(&e), e.to_string())
                }
            };

            send_frame(sender, &response, encoding).await
        }

        Frame::Leave { id, poll_id } => {
            debug!(connection = %connection_id, poll = poll_id, "Leave request");

            let response = match state.service.leave(connection_id, poll_id) {
                Ok(()) => {
                    metrics::set_polls_watched(state.service.broadcaster().stats().topic_count);
                    Frame::ack(id)
                }
                Err(e) => Frame::error(id, error_code(&e), e.to_string()),
            };

            send_frame(sender, &response, encoding).await
        }

        Frame::Ping { timestamp } => send_frame(sender, &Frame::pong(timestamp), encoding).await,

        // Keepalive replies need no answer
        _ => Ok(()),
    }
}

/// Frame error code for a failed join or leave.
fn error_code(err: &PollError) -> u16 {
    match err {
        PollError::NotFound(_) => codes::POLL_NOT_FOUND,
        PollError::Subscription(BroadcastError::MaxSubscriptionsReached) => {
            codes::SUBSCRIPTION_LIMIT
        }
        PollError::Subscription(BroadcastError::NotSubscribed { .. }) => codes::NOT_SUBSCRIBED,
        _ => codes::INTERNAL,
    }
}

/// Answer an undecodable message.
async fn reject(
    sender: &mut WsSink,
    connection_id: &str,
    reason: &str,
    encoding: Encoding,
) -> Result<()> {
    warn!(connection = %connection_id, error = %reason, "Bad frame");
    metrics::record_error("bad_frame");
    send_frame(sender, &Frame::error(0, codes::BAD_FRAME, reason), encoding).await
}

/// Encode a frame as a WebSocket message.
fn encode_frame(frame: &Frame, encoding: Encoding) -> Result<Message, ProtocolError> {
    Ok(match encoding {
        Encoding::Json => Message::Text(codec::encode_json(frame)?),
        Encoding::MessagePack => Message::Binary(codec::encode(frame)?.to_vec()),
    })
}

/// Send a frame to the WebSocket.
async fn send_frame(sender: &mut WsSink, frame: &Frame, encoding: Encoding) -> Result<()> {
    let message = encode_frame(frame, encoding)?;
    metrics::record_message("outbound");
    sender.send(message).await?;
    Ok(())
}
