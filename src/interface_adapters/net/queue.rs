// Matchmaking socket: players queue here and learn which match to join.

use crate::domain::GameType;
use crate::interface_adapters::http::ErrorResponse;
use crate::interface_adapters::net::client::spawn_session_serializer;
use crate::interface_adapters::protocol::{QueueClientMessage, QueueServerMessage, parse_game_type};
use crate::interface_adapters::state::AppState;
use crate::interface_adapters::utils::rng::rand_id;
use crate::use_cases::{JoinOutcome, MatchNotice};
use crate::use_cases::matchmaking::Ticket;

use axum::{
    Json,
    extract::{
        Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures::SinkExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, info_span, warn};

const MAX_USERNAME_LEN: usize = 64;

#[derive(Debug, serde::Deserialize)]
pub struct QueueQuery {
    #[serde(default)]
    username: Option<String>,
}

pub async fn matchmaking_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<QueueQuery>,
) -> impl IntoResponse {
    let username = query
        .username
        .map(|value| value.trim().to_string())
        .unwrap_or_default();
    if username.is_empty() || username.len() > MAX_USERNAME_LEN {
        // Keep validation failures consistent with the JSON error schema.
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "username is required".to_string(),
            }),
        )
            .into_response();
    }

    ws.on_upgrade(move |socket| handle_queue_socket(socket, state, username))
        .into_response()
}

async fn handle_queue_socket(mut socket: WebSocket, state: Arc<AppState>, username: String) {
    let conn_id = rand_id();
    let span = info_span!("queue", conn_id, username = %username);
    let _enter = span.enter();
    info!("queue client connected");

    // Acknowledge the connection before any queueing happens.
    let searching = QueueServerMessage::Searching {
        username: username.clone(),
    };
    if send_queue_message(&mut socket, &searching).await.is_err() {
        info!("queue client disconnected");
        return;
    }

    // Capacity of one: a queued player can have at most one pending notice.
    let (notice_tx, mut notice_rx) = mpsc::channel::<MatchNotice>(1);

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match serde_json::from_str::<QueueClientMessage>(&text) {
                            Ok(QueueClientMessage::FindMatch { game_type }) => {
                                match parse_game_type(&game_type) {
                                    Some(game_type) => {
                                        enqueue_for_match(&state, &username, game_type, notice_tx.clone())
                                            .await
                                    }
                                    None => Some(QueueServerMessage::Error {
                                        message: format!("unknown game type: {game_type}"),
                                    }),
                                }
                            }
                            Err(_) => Some(QueueServerMessage::Error {
                                message: "invalid message".to_string(),
                            }),
                        };
                        if let Some(reply) = reply {
                            if send_queue_message(&mut socket, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "queue websocket recv error");
                        break;
                    }
                }
            }

            notice = notice_rx.recv() => {
                // Our own sender half stays alive, so this is always Some.
                if let Some(notice) = notice {
                    let matched = QueueServerMessage::Matched {
                        game_id: notice.game_id,
                        username: username.clone(),
                        opponent: notice.opponent,
                        player1: notice.player1,
                        game_type: notice.game_type.as_wire().to_string(),
                    };
                    let _ = send_queue_message(&mut socket, &matched).await;
                    let _ = socket
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::NORMAL,
                            reason: "matched".into(),
                        })))
                        .await;
                    let _ = socket.close().await;
                    break;
                }
            }
        }
    }

    // Harmless for matched players; they already left the queue.
    state.matchmaker.lock().await.leave(&username);
    info!("queue client disconnected");
}

/// Enqueues the player and, on a pairing, creates the match while still
/// holding the queue lock so the same player cannot be paired twice.
async fn enqueue_for_match(
    state: &Arc<AppState>,
    username: &str,
    game_type: GameType,
    notify: mpsc::Sender<MatchNotice>,
) -> Option<QueueServerMessage> {
    let mut matchmaker = state.matchmaker.lock().await;
    let ticket = Ticket::new(username.to_string(), notify);

    match matchmaker.enqueue(game_type, ticket, state.registry.active_players()) {
        // The connect-time searching reply already went out.
        Ok(JoinOutcome::Waiting) => None,
        Ok(JoinOutcome::Paired { first, second }) => {
            let game_id = rand_id();
            match state
                .registry
                .create_match(
                    game_id,
                    game_type,
                    first.username.clone(),
                    second.username.clone(),
                )
                .await
            {
                Ok(handle) => {
                    spawn_session_serializer(&handle);
                    info!(
                        game_id,
                        game_type = game_type.as_wire(),
                        player1 = %first.username,
                        player2 = %second.username,
                        "match created"
                    );
                    let _ = first
                        .notify
                        .send(MatchNotice {
                            game_id,
                            opponent: second.username.clone(),
                            player1: first.username.clone(),
                            game_type,
                        })
                        .await;
                    let _ = second
                        .notify
                        .send(MatchNotice {
                            game_id,
                            opponent: first.username.clone(),
                            player1: first.username.clone(),
                            game_type,
                        })
                        .await;
                    // The matched reply flows back through the notice channel.
                    None
                }
                Err(e) => {
                    error!(game_id, error = %e, "failed to create match");
                    Some(QueueServerMessage::Error {
                        message: "failed to create match".to_string(),
                    })
                }
            }
        }
        Err(e) => Some(QueueServerMessage::Error {
            message: e.to_string(),
        }),
    }
}

async fn send_queue_message(
    socket: &mut WebSocket,
    msg: &QueueServerMessage,
) -> Result<(), axum::Error> {
    let txt = match serde_json::to_string(msg) {
        Ok(txt) => txt,
        Err(e) => {
            error!(error = ?e, "failed to serialize queue message");
            return Ok(());
        }
    };
    socket.send(Message::Text(txt.into())).await
}
