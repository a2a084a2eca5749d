// Wire protocol DTOs and conversions for public session server messages.
// Internal service-to-service DTOs should live outside this module.

use crate::domain::{
    GameSnapshot, GameType, InputCommand, PongSnapshot, RivalrySnapshot,
    rivalry::{EnemyShotView, HazardKind, HazardView, ShipView, ShotView},
};
use serde::{Deserialize, Serialize};

/// Messages the server sends over the game WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    // Authoritative snapshot for the current tick.
    GameState { state: GameStateDto },
    // Reply to a client ping, echoing its timestamp.
    Pong { timestamp: Option<f64> },
    PlayerDisconnected { username: String },
    PlayerReconnected { username: String },
    // The named player's link looks unstable.
    ConnectionWarning { username: String },
    // Terminal snapshot after a regular win.
    GameEnded { state: GameStateDto },
    // Terminal snapshot after a forfeit resolution.
    GameEndedByForfeit { state: GameStateDto, winner: Option<String> },
    Error { message: String },
}

/// Messages the client sends over the game WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    // First message on the socket; identifies the player.
    Init(InitPayload),
    PlayerInput { input: PlayerInputDto },
    MouseMove { mouse_position: MousePositionDto },
    // Score claims from clients are ignored; the simulation is the
    // authority. They are accepted so older clients do not get dropped.
    ScoreUpdate,
    GameWon,
    MatchComplete,
    Ping { timestamp: Option<f64> },
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitPayload {
    pub username: String,
    #[serde(default)]
    pub opponent: Option<String>,
    #[serde(rename = "isPlayer1", default)]
    pub is_player1: Option<bool>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerInputDto {
    Up,
    Down,
    Left,
    Right,
    Shoot,
}

impl From<PlayerInputDto> for InputCommand {
    fn from(input: PlayerInputDto) -> Self {
        match input {
            PlayerInputDto::Up => InputCommand::Up,
            PlayerInputDto::Down => InputCommand::Down,
            PlayerInputDto::Left => InputCommand::Left,
            PlayerInputDto::Right => InputCommand::Right,
            PlayerInputDto::Shoot => InputCommand::Shoot,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MousePositionDto {
    pub x: f32,
    pub y: f32,
}

impl From<MousePositionDto> for InputCommand {
    fn from(position: MousePositionDto) -> Self {
        InputCommand::MouseMove {
            x: position.x,
            y: position.y,
        }
    }
}

/// Mode-specific snapshot payload; the shape tells the client which game it is.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum GameStateDto {
    Pong(PongStateDto),
    Rivalry(RivalryStateDto),
}

impl From<&GameSnapshot> for GameStateDto {
    fn from(snapshot: &GameSnapshot) -> Self {
        match snapshot {
            GameSnapshot::Pong(snap) => GameStateDto::Pong(PongStateDto::from(snap)),
            GameSnapshot::Rivalry(snap) => GameStateDto::Rivalry(RivalryStateDto::from(snap)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PongStateDto {
    pub game_started: bool,
    pub game_over: bool,
    pub player1: String,
    pub player2: String,
    #[serde(rename = "paddle1Y")]
    pub paddle1_y: f32,
    #[serde(rename = "paddle2Y")]
    pub paddle2_y: f32,
    pub ball_x: f32,
    pub ball_y: f32,
    pub score1: u32,
    pub score2: u32,
    pub rounds1: u32,
    pub rounds2: u32,
    pub winner: Option<String>,
}

impl From<&PongSnapshot> for PongStateDto {
    fn from(snap: &PongSnapshot) -> Self {
        Self {
            game_started: snap.game_started,
            game_over: snap.game_over,
            player1: snap.player1.clone(),
            player2: snap.player2.clone(),
            paddle1_y: snap.paddle1_y,
            paddle2_y: snap.paddle2_y,
            ball_x: snap.ball_x,
            ball_y: snap.ball_y,
            score1: snap.score1,
            score2: snap.score2,
            rounds1: snap.rounds1,
            rounds2: snap.rounds2,
            winner: snap.winner.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RivalryStateDto {
    pub game_started: bool,
    pub game_over: bool,
    pub player1: String,
    pub player2: String,
    pub ship1: ShipDto,
    pub ship2: ShipDto,
    pub shots: Vec<ShotDto>,
    pub enemy_shots: Vec<EnemyShotDto>,
    pub hazards: Vec<HazardDto>,
    pub winner: Option<String>,
}

impl From<&RivalrySnapshot> for RivalryStateDto {
    fn from(snap: &RivalrySnapshot) -> Self {
        Self {
            game_started: snap.game_started,
            game_over: snap.game_over,
            player1: snap.player1.clone(),
            player2: snap.player2.clone(),
            ship1: ShipDto::from(&snap.ship1),
            ship2: ShipDto::from(&snap.ship2),
            shots: snap.shots.iter().map(ShotDto::from).collect(),
            enemy_shots: snap.enemy_shots.iter().map(EnemyShotDto::from).collect(),
            hazards: snap.hazards.iter().map(HazardDto::from).collect(),
            winner: snap.winner.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipDto {
    pub x: f32,
    pub health: u32,
    pub score: u32,
    pub combo: u32,
    pub shield: bool,
    pub rapid_fire: bool,
}

impl From<&ShipView> for ShipDto {
    fn from(ship: &ShipView) -> Self {
        Self {
            x: ship.x,
            health: ship.health,
            score: ship.score,
            combo: ship.combo,
            shield: ship.shield,
            rapid_fire: ship.rapid_fire,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ShotDto {
    pub x: f32,
    pub y: f32,
    pub player1: bool,
}

impl From<&ShotView> for ShotDto {
    fn from(shot: &ShotView) -> Self {
        Self {
            x: shot.x,
            y: shot.y,
            player1: shot.player1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnemyShotDto {
    pub x: f32,
    pub y: f32,
}

impl From<&EnemyShotView> for EnemyShotDto {
    fn from(shot: &EnemyShotView) -> Self {
        Self { x: shot.x, y: shot.y }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HazardDto {
    pub x: f32,
    pub y: f32,
    pub kind: &'static str,
}

impl From<&HazardView> for HazardDto {
    fn from(hazard: &HazardView) -> Self {
        Self {
            x: hazard.x,
            y: hazard.y,
            kind: match hazard.kind {
                HazardKind::Scout => "scout",
                HazardKind::Cruiser => "cruiser",
                HazardKind::Fragment => "fragment",
            },
        }
    }
}

/// Messages the matchmaking socket sends to queued clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueueServerMessage {
    Searching {
        username: String,
    },
    Matched {
        game_id: u64,
        username: String,
        opponent: String,
        /// Username occupying slot one; both clients orient from this.
        player1: String,
        game_type: String,
    },
    Error {
        message: String,
    },
}

/// Messages a client sends on the matchmaking socket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueClientMessage {
    FindMatch { game_type: String },
}

/// Parses and validates the game type field of a queue request.
pub fn parse_game_type(raw: &str) -> Option<GameType> {
    GameType::from_wire(raw)
}
