//! WebSocket gateway.
//!
//! Translates client frames into session actor calls and forwards session
//! notifications to each socket, filtered by audience. The gateway holds no
//! session state of its own beyond "this connection has joined".
//!
//! # Connection Lifecycle
//!
//! 1. Upgrade on `GET /ws`; a fresh `ParticipantId` is assigned.
//! 2. `attach()`: snapshot and subscription taken together by the actor,
//!    then catch-up events (current round with time left, its final result
//!    if finished, presence). Nothing is missed or sent twice.
//! 3. Pump frames and notifications until the socket closes or the session
//!    shuts down.
//! 4. If the connection joined, issue `leave`.

pub mod frames;

use crate::actors::{Attached, Notification, SessionActorHandle};
use crate::errors::PollError;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use common::types::ParticipantId;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

pub use frames::{GatewayReply, InboundFrame};

/// Build the gateway router.
pub fn gateway_router(session: SessionActorHandle) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(session)
        .layer(TraceLayer::new_for_http())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(session): State<SessionActorHandle>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, session))
}

/// Per-connection state.
#[derive(Debug)]
pub(crate) struct Connection {
    participant_id: ParticipantId,
    joined: bool,
}

impl Connection {
    pub(crate) fn new() -> Self {
        Self {
            participant_id: ParticipantId::new(),
            joined: false,
        }
    }

    /// Apply one text frame and return the reply for this connection, if any.
    ///
    /// Malformed frames and silently-dropped votes produce no reply.
    pub(crate) async fn handle_frame(
        &mut self,
        session: &SessionActorHandle,
        text: &str,
    ) -> Option<GatewayReply> {
        let frame: InboundFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(
                    target: "poll.gateway",
                    participant_id = %self.participant_id,
                    error = %e,
                    "Ignoring malformed frame"
                );
                return None;
            }
        };

        let kind = frame.kind();
        let result = match frame {
            InboundFrame::StartRound(spec) => {
                session
                    .start_round(spec)
                    .await
                    .map(|receipt| GatewayReply::RoundAccepted {
                        round_id: receipt.round_id,
                        correct_option: receipt.correct_option,
                    })
            }
            InboundFrame::Join { name } => {
                session
                    .join(self.participant_id, name)
                    .await
                    .map(|joined| {
                        self.joined = true;
                        GatewayReply::Joined { name: joined.name }
                    })
            }
            InboundFrame::CastVote { option } => {
                match session.cast_vote(self.participant_id, option).await {
                    // The voter's view arrives as a partial_result notification
                    Ok(_) => return None,
                    Err(e) => Err(e),
                }
            }
        };

        match result {
            Ok(reply) => Some(reply),
            Err(e) if e.is_silent() => None,
            Err(e) => {
                log_failure(self.participant_id, kind, &e);
                Some(GatewayReply::from(&e))
            }
        }
    }
}

fn log_failure(participant_id: ParticipantId, kind: &'static str, err: &PollError) {
    match err {
        PollError::InvalidRoundSpec(_) => debug!(
            target: "poll.gateway",
            participant_id = %participant_id,
            frame = kind,
            error = %err,
            "Round refused"
        ),
        _ => warn!(
            target: "poll.gateway",
            participant_id = %participant_id,
            frame = kind,
            error = %err,
            "Request failed"
        ),
    }
}

async fn handle_socket(socket: WebSocket, session: SessionActorHandle) {
    let mut connection = Connection::new();
    let participant_id = connection.participant_id;
    let shutdown = session.child_token();

    let (mut ws_tx, mut ws_rx) = socket.split();

    info!(
        target: "poll.gateway",
        participant_id = %participant_id,
        "WebSocket client connected"
    );

    let Attached {
        snapshot,
        mut notifications,
    } = match session.attach().await {
        Ok(attached) => attached,
        Err(e) => {
            warn!(
                target: "poll.gateway",
                participant_id = %participant_id,
                error = %e,
                "Could not load session state for new connection"
            );
            let _ = send_json(&mut ws_tx, &GatewayReply::from(&e)).await;
            return;
        }
    };

    for event in snapshot.catch_up_events(Utc::now()) {
        if send_json(&mut ws_tx, &event).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }

            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = connection.handle_frame(&session, &text).await {
                            if send_json(&mut ws_tx, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    // Ping/pong is answered by axum; binary frames are not part of the protocol
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(
                            target: "poll.gateway",
                            participant_id = %participant_id,
                            error = %e,
                            "WebSocket read failed"
                        );
                        break;
                    }
                }
            }

            notification = notifications.recv() => {
                match notification {
                    Ok(Notification { audience, event }) => {
                        if audience.includes(participant_id)
                            && send_json(&mut ws_tx, &event).await.is_err()
                        {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(
                            target: "poll.gateway",
                            participant_id = %participant_id,
                            skipped,
                            "Client fell behind, notifications skipped"
                        );
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    if connection.joined {
        if let Err(e) = session.leave(participant_id).await {
            debug!(
                target: "poll.gateway",
                participant_id = %participant_id,
                error = %e,
                "Leave on disconnect failed"
            );
        }
    }

    info!(
        target: "poll.gateway",
        participant_id = %participant_id,
        "WebSocket client disconnected"
    );
}

async fn send_json<T: Serialize>(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    value: &T,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(value) {
        Ok(text) => text,
        Err(e) => {
            warn!(target: "poll.gateway", error = %e, "Failed to encode frame");
            return Ok(());
        }
    };
    ws_tx.send(Message::Text(text)).await
}
