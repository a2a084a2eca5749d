use crate::domain::{GameSnapshot, PlayerSlot};
use crate::interface_adapters::http::ErrorResponse;
use crate::interface_adapters::protocol::{ClientMessage, GameStateDto, InitPayload, ServerMessage};
use crate::interface_adapters::state::AppState;
use crate::interface_adapters::utils::rng::rand_id;
use crate::use_cases::{
    AttachGrant, RegistryError, SessionCommand, SessionEvent, SessionHandle, SessionPhase,
    SessionRegistry,
};

use axum::{
    Error, Json,
    extract::{
        Path, State,
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures::SinkExt;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, error, info, info_span, warn};

#[derive(Debug)]
enum NetError {
    // Categorizes connection lifecycle failures so callers can decide policy.
    #[allow(dead_code)]
    Ws(axum::Error),
    #[allow(dead_code)]
    Serialization(serde_json::Error),
    CommandsClosed,
    InitRequired,
    InitTimeout,
    ClosedBeforeInit,
    #[allow(dead_code)]
    Rejected(RegistryError),
}

impl From<axum::Error> for NetError {
    fn from(e: axum::Error) -> Self {
        NetError::Ws(e)
    }
}

const LOG_THROTTLE: Duration = Duration::from_secs(2);
const MAX_INVALID_JSON: u32 = 10;
const MAX_USERNAME_LEN: usize = 64;
const INIT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn session_event_serializer(
    mut event_rx: broadcast::Receiver<SessionEvent>,
    bytes_tx: broadcast::Sender<Utf8Bytes>,
    latest_tx: watch::Sender<Utf8Bytes>,
) {
    // Serialize each event once and broadcast the shared bytes.
    loop {
        match event_rx.recv().await {
            Ok(event) => {
                let is_snapshot = matches!(
                    event,
                    SessionEvent::Snapshot(_) | SessionEvent::Ended { .. }
                );
                let ended = matches!(event, SessionEvent::Ended { .. });
                let msg = server_message_for(event);
                let txt = match serde_json::to_string(&msg) {
                    Ok(txt) => txt,
                    Err(e) => {
                        error!(error = ?e, "failed to serialize session event");
                        continue;
                    }
                };

                // Convert once and broadcast shared UTF-8 bytes to all clients.
                let bytes = Utf8Bytes::from(txt);
                if is_snapshot {
                    // Store the latest state for lag recovery and reconnects.
                    let _ = latest_tx.send(bytes.clone());
                }
                let _ = bytes_tx.send(bytes);

                if ended {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(missed = n, "event serializer lagged; skipping to latest");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn server_message_for(event: SessionEvent) -> ServerMessage {
    match event {
        SessionEvent::Snapshot(snapshot) => ServerMessage::GameState {
            state: GameStateDto::from(&snapshot),
        },
        SessionEvent::PlayerDisconnected { username } => {
            ServerMessage::PlayerDisconnected { username }
        }
        SessionEvent::PlayerReconnected { username } => {
            ServerMessage::PlayerReconnected { username }
        }
        SessionEvent::ConnectionWarning { username } => {
            ServerMessage::ConnectionWarning { username }
        }
        SessionEvent::Ended { snapshot, forfeit } => {
            let winner = match &snapshot {
                GameSnapshot::Pong(snap) => snap.winner.clone(),
                GameSnapshot::Rivalry(snap) => snap.winner.clone(),
            };
            let state = GameStateDto::from(&snapshot);
            if forfeit {
                ServerMessage::GameEndedByForfeit { state, winner }
            } else {
                ServerMessage::GameEnded { state }
            }
        }
    }
}

pub fn spawn_session_serializer(handle: &SessionHandle) {
    // Spawn a task that serializes session events for this match.
    tokio::spawn(session_event_serializer(
        handle.event_tx.subscribe(),
        handle.bytes_tx.clone(),
        handle.latest_tx.clone(),
    ));
}

pub async fn game_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<u64>,
) -> impl IntoResponse {
    if state.registry.record(game_id).await.is_none() {
        // Keep not-found responses consistent with the JSON error schema.
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "match not found".to_string(),
            }),
        )
            .into_response();
    }

    let registry = state.registry.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, game_id, registry))
        .into_response()
}

async fn handle_socket(mut socket: WebSocket, game_id: u64, registry: Arc<SessionRegistry>) {
    // Separate connection id for correlating logs before/after a username exists.
    let conn_id = rand_id();
    let span = info_span!("conn", conn_id, game_id, username = tracing::field::Empty);
    let _enter = span.enter();

    let mut ctx = match bootstrap_connection(&mut socket, game_id, registry).await {
        Ok(ctx) => ctx,
        Err(NetError::ClosedBeforeInit) => {
            info!("client disconnected before init handshake");
            return;
        }
        Err(e) => {
            warn!(error = ?e, "failed to bootstrap connection");
            let _ = socket.close().await;
            return;
        }
    };

    span.record("username", ctx.username.as_str());
    info!(opponent = %ctx.opponent, "client attached");

    // Main Client Loop
    if let Err(e) = run_client_loop(&mut socket, &mut ctx).await {
        warn!(error = ?e, "client loop exited with error");
    }
}

async fn send_message(socket: &mut WebSocket, msg: &ServerMessage) -> Result<usize, NetError> {
    let txt = serde_json::to_string(msg).map_err(NetError::Serialization)?;
    let bytes = txt.len();
    socket
        .send(Message::Text(txt.into()))
        .await
        .map_err(NetError::Ws)?;
    Ok(bytes)
}

async fn send_close_with_reason(
    socket: &mut WebSocket,
    code: u16,
    reason: &'static str,
) -> Result<(), NetError> {
    socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await
        .map_err(NetError::Ws)?;
    socket.close().await.map_err(NetError::Ws)
}

struct ConnCtx {
    game_id: u64,
    username: String,
    opponent: String,
    slot: PlayerSlot,
    // Registry access for slot cleanup on disconnect.
    registry: Arc<SessionRegistry>,
    cmd_tx: mpsc::Sender<SessionCommand>,
    bytes_rx: broadcast::Receiver<Utf8Bytes>,
    latest_rx: watch::Receiver<Utf8Bytes>,
    phase_rx: watch::Receiver<SessionPhase>,
    // Count lag recovery snapshots sent to this client.
    lag_recovery_count: u64,

    msgs_in: u64,
    msgs_out: u64,
    bytes_in: u64,
    bytes_out: u64,

    invalid_json: u32,

    last_cmd_full_log: Instant,
    last_invalid_input_log: Instant,
    last_lag_log: Instant,

    close_frame: Option<CloseFrame>,
}

fn attach_reject_reason(err: &RegistryError) -> &'static str {
    match err {
        RegistryError::AlreadyExists => "match unavailable",
        RegistryError::MatchNotFound => "match not found",
        RegistryError::MatchCompleted => "match already completed",
        RegistryError::NotAParticipant => "not a participant",
        RegistryError::SlotTaken => "player already connected",
    }
}

async fn bootstrap_connection(
    socket: &mut WebSocket,
    game_id: u64,
    registry: Arc<SessionRegistry>,
) -> Result<ConnCtx, NetError> {
    // The first meaningful client message must identify the player.
    let init = match timeout(INIT_HANDSHAKE_TIMEOUT, read_init_handshake(socket)).await {
        Ok(result) => result?,
        Err(_) => {
            let _ = send_close_with_reason(socket, close_code::POLICY, "init timeout").await;
            return Err(NetError::InitTimeout);
        }
    };

    let username = init.username.trim().to_string();
    if username.is_empty() || username.len() > MAX_USERNAME_LEN {
        let _ = send_close_with_reason(socket, close_code::POLICY, "invalid username").await;
        return Err(NetError::InitRequired);
    }

    // Slot assignment comes from the match record, never from the client's
    // own isPlayer1 claim.
    let AttachGrant {
        slot,
        record,
        handle,
    } = match registry.attach(game_id, &username).await {
        Ok(grant) => grant,
        Err(err) => {
            let _ = send_close_with_reason(socket, close_code::POLICY, attach_reject_reason(&err))
                .await;
            return Err(NetError::Rejected(err));
        }
    };

    // Subscribe to broadcasts *before* announcing the attach to not miss packets.
    let bytes_rx = handle.bytes_tx.subscribe();
    let latest_rx = handle.latest_tx.subscribe();
    let phase_rx = handle.phase_rx.clone();

    if handle
        .cmd_tx
        .send(SessionCommand::Attach { slot })
        .await
        .is_err()
    {
        // Free the reserved slot if the session died under us.
        registry.detach(game_id, slot).await;
        let _ = send_close_with_reason(socket, close_code::ERROR, "session unavailable").await;
        return Err(NetError::CommandsClosed);
    }

    // Resync a reconnecting client with the last known snapshot.
    let latest = latest_rx.borrow().clone();
    if !latest.is_empty() {
        if let Err(e) = socket.send(Message::Text(latest)).await.map_err(NetError::Ws) {
            registry.detach(game_id, slot).await;
            return Err(e);
        }
    }

    let opponent = record.player_name(slot.other()).to_string();
    let now = Instant::now() - LOG_THROTTLE;
    Ok(ConnCtx {
        game_id,
        username,
        opponent,
        slot,
        registry,
        cmd_tx: handle.cmd_tx.clone(),
        bytes_rx,
        latest_rx,
        phase_rx,
        lag_recovery_count: 0,

        msgs_in: 1,
        msgs_out: 0,
        bytes_in: 0,
        bytes_out: 0,

        invalid_json: 0,

        last_cmd_full_log: now,
        last_invalid_input_log: now,
        last_lag_log: now,

        close_frame: None,
    })
}

async fn read_init_handshake(socket: &mut WebSocket) -> Result<InitPayload, NetError> {
    loop {
        let Some(incoming) = socket.recv().await else {
            return Err(NetError::ClosedBeforeInit);
        };

        let message = incoming.map_err(NetError::Ws)?;
        match message {
            Message::Text(text) => {
                return match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Init(payload)) => Ok(payload),
                    Ok(_) => {
                        let _ = send_close_with_reason(socket, close_code::POLICY, "init required")
                            .await;
                        Err(NetError::InitRequired)
                    }
                    Err(_) => {
                        let _ = send_close_with_reason(
                            socket,
                            close_code::POLICY,
                            "invalid init payload",
                        )
                        .await;
                        Err(NetError::InitRequired)
                    }
                };
            }
            Message::Binary(_) => {
                let _ = send_close_with_reason(
                    socket,
                    close_code::UNSUPPORTED,
                    "binary messages not supported",
                )
                .await;
                return Err(NetError::InitRequired);
            }
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => return Err(NetError::ClosedBeforeInit),
        }
    }
}

enum LoopControl {
    Continue,
    Disconnect,
}

fn should_log(last: &mut Instant) -> bool {
    if last.elapsed() >= LOG_THROTTLE {
        *last = Instant::now();
        true
    } else {
        false
    }
}

fn forward_command(
    cmd: SessionCommand,
    cmd_tx: &mpsc::Sender<SessionCommand>,
    username: &str,
    last_cmd_full_log: &mut Instant,
) -> Result<LoopControl, NetError> {
    match cmd_tx.try_send(cmd) {
        Ok(()) => Ok(LoopControl::Continue),
        Err(mpsc::error::TrySendError::Full(_)) => {
            if should_log(last_cmd_full_log) {
                warn!(username, "command channel full; dropping input");
            }
            Ok(LoopControl::Continue)
        }
        Err(mpsc::error::TrySendError::Closed(_)) => Err(NetError::CommandsClosed),
    }
}

async fn run_client_loop(socket: &mut WebSocket, ctx: &mut ConnCtx) -> Result<(), NetError> {
    let game_id = ctx.game_id;
    let slot = ctx.slot;

    // Split borrows so `tokio::select!` can hold them concurrently.
    let ConnCtx {
        username,
        registry,
        cmd_tx,
        bytes_rx,
        latest_rx,
        phase_rx,
        lag_recovery_count,
        msgs_in,
        msgs_out,
        bytes_in,
        bytes_out,
        invalid_json,
        last_cmd_full_log,
        last_invalid_input_log,
        last_lag_log,
        close_frame,
        ..
    } = ctx;

    let mut fatal: Option<NetError> = None;
    // Set once the session reaches a terminal phase; from then on shutdown is
    // driven by the broadcast channel closing, which happens only after every
    // buffered message (the terminal one included) has been delivered.
    let mut phase_done = false;

    loop {
        // disconnect becomes true on error
        let disconnect: bool = tokio::select! {
            // Incoming Message from Client
            incoming = socket.recv() => {
                match handle_incoming_ws(
                    socket,
                    incoming,
                    username,
                    slot,
                    cmd_tx,
                    msgs_in,
                    bytes_in,
                    msgs_out,
                    bytes_out,
                    invalid_json,
                    last_cmd_full_log,
                    last_invalid_input_log,
                    close_frame,
                ).await {
                    Ok(LoopControl::Continue) => false,
                    Ok(LoopControl::Disconnect) => true,
                    Err(e) => {
                        fatal = Some(e);
                        true
                    }
                }
            }

            // Outgoing Session Broadcast
            broadcast_msg = bytes_rx.recv() => {
                match broadcast_msg {
                    Ok(bytes) => match forward_bytes(bytes, socket, msgs_out, bytes_out).await {
                        LoopControl::Continue => false,
                        LoopControl::Disconnect => true,
                    },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        if should_log(last_lag_log) {
                            warn!(missed = n, "session broadcasts lagged; sending snapshot");
                        }

                        // Resync strategy: send the latest snapshot.
                        let latest = latest_rx.borrow().clone();
                        if latest.is_empty() {
                            false
                        } else {
                            *lag_recovery_count += 1;
                            match forward_bytes(latest, socket, msgs_out, bytes_out).await {
                                LoopControl::Continue => false,
                                LoopControl::Disconnect => true,
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        // Senders drop only after the terminal broadcast went
                        // out, and buffered messages are delivered before
                        // `Closed`, so the final state has reached the client.
                        *close_frame = Some(CloseFrame {
                            code: close_code::NORMAL,
                            reason: "match ended".into(),
                        });
                        true
                    }
                }
            }

            // Session lifecycle changes. Never closes the socket directly;
            // the terminal broadcast must reach the client first.
            changed_phase = phase_rx.changed(), if !phase_done => {
                match changed_phase {
                    Ok(()) => {
                        if phase_rx.borrow_and_update().is_terminal() {
                            phase_done = true;
                        }
                    }
                    Err(_) => {
                        // Session task exited; the broadcast close follows.
                        phase_done = true;
                    }
                }
                false
            }
        };

        if disconnect {
            if let Some(frame) = close_frame.take() {
                let _ = socket.send(Message::Close(Some(frame))).await;
            }
            if let Err(err) = socket.close().await.map_err(NetError::Ws) {
                debug!(error = ?err, "socket close error");
            }
            break;
        }
    }

    // Free the slot and tell the session the player is gone.
    registry.detach(game_id, slot).await;

    debug!(
        username = username.as_str(),
        msgs_in = *msgs_in,
        msgs_out = *msgs_out,
        bytes_in = *bytes_in,
        bytes_out = *bytes_out,
        invalid_json = *invalid_json,
        lag_recovery_count = *lag_recovery_count,
        "connection stats"
    );
    info!(username = username.as_str(), "client disconnected");

    if let Some(err) = fatal { Err(err) } else { Ok(()) }
}

#[allow(clippy::too_many_arguments)]
async fn handle_incoming_ws(
    socket: &mut WebSocket,
    incoming: Option<Result<Message, Error>>,
    username: &str,
    slot: PlayerSlot,
    cmd_tx: &mpsc::Sender<SessionCommand>,
    msgs_in: &mut u64,
    bytes_in: &mut u64,
    msgs_out: &mut u64,
    bytes_out: &mut u64,
    invalid_json: &mut u32,
    last_cmd_full_log: &mut Instant,
    last_invalid_input_log: &mut Instant,
    close_frame: &mut Option<CloseFrame>,
) -> Result<LoopControl, NetError> {
    match incoming {
        Some(Ok(msg)) => match msg {
            Message::Text(text) => {
                *msgs_in += 1;
                *bytes_in += text.len() as u64;

                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Init(_)) => {
                        // Ignore repeated init packets after bootstrap.
                        if should_log(last_invalid_input_log) {
                            warn!(username, "duplicate init ignored");
                        }
                        Ok(LoopControl::Continue)
                    }
                    Ok(ClientMessage::PlayerInput { input }) => forward_command(
                        SessionCommand::Input {
                            slot,
                            input: input.into(),
                        },
                        cmd_tx,
                        username,
                        last_cmd_full_log,
                    ),
                    Ok(ClientMessage::MouseMove { mouse_position }) => {
                        if !mouse_position.x.is_finite() || !mouse_position.y.is_finite() {
                            if should_log(last_invalid_input_log) {
                                warn!(username, "invalid mouse values (NaN/inf); dropping");
                            }
                            return Ok(LoopControl::Continue);
                        }
                        forward_command(
                            SessionCommand::Input {
                                slot,
                                input: mouse_position.into(),
                            },
                            cmd_tx,
                            username,
                            last_cmd_full_log,
                        )
                    }
                    Ok(
                        ClientMessage::ScoreUpdate
                        | ClientMessage::GameWon
                        | ClientMessage::MatchComplete,
                    ) => {
                        // Score claims carry no authority; the simulation decides.
                        Ok(LoopControl::Continue)
                    }
                    Ok(ClientMessage::Ping { timestamp }) => {
                        let sent =
                            send_message(socket, &ServerMessage::Pong { timestamp }).await?;
                        *msgs_out += 1;
                        *bytes_out += sent as u64;
                        Ok(LoopControl::Continue)
                    }
                    Err(parse_err) => {
                        *invalid_json += 1;
                        if should_log(last_invalid_input_log) {
                            warn!(
                                username,
                                bytes = text.len(),
                                error = %parse_err,
                                "failed to parse client message"
                            );
                        }

                        if *invalid_json > MAX_INVALID_JSON {
                            *close_frame = Some(CloseFrame {
                                code: close_code::POLICY,
                                reason: "too many invalid messages".into(),
                            });
                            return Ok(LoopControl::Disconnect);
                        }

                        Ok(LoopControl::Continue)
                    }
                }
            }
            Message::Binary(_) => {
                *close_frame = Some(CloseFrame {
                    code: close_code::UNSUPPORTED,
                    reason: "binary messages not supported".into(),
                });
                Ok(LoopControl::Disconnect)
            }
            Message::Ping(_) | Message::Pong(_) => Ok(LoopControl::Continue),
            Message::Close(_) => Ok(LoopControl::Disconnect),
        },
        Some(Err(e)) => {
            warn!(username, error = %e, "websocket recv error");
            Ok(LoopControl::Disconnect)
        }
        None => {
            info!(username, "websocket closed");
            Ok(LoopControl::Disconnect)
        }
    }
}

async fn forward_bytes(
    bytes: Utf8Bytes,
    socket: &mut WebSocket,
    msgs_out: &mut u64,
    bytes_out: &mut u64,
) -> LoopControl {
    let bytes_len = bytes.len();
    match socket.send(Message::Text(bytes)).await.map_err(NetError::Ws) {
        Ok(()) => {
            *msgs_out += 1;
            *bytes_out += bytes_len as u64;
            LoopControl::Continue
        }
        Err(err) => {
            // Log unexpected send failures; disconnect will follow immediately.
            warn!(error = ?err, "failed to send session broadcast");
            LoopControl::Disconnect
        }
    }
}
