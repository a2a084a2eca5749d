// Domain layer: match records and the authoritative simulation rules.

pub mod pong;
pub mod rivalry;
pub mod rng;

pub use pong::{PongSnapshot, PongState};
pub use rivalry::{RivalrySnapshot, RivalryState};
pub use rng::SeededRng;

/// The two supported competitive game modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameType {
    Pong,
    SpaceRivalry,
}

impl GameType {
    /// Parses the wire-level game type string used by matchmaking clients.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "pong" => Some(GameType::Pong),
            "space-rivalry" => Some(GameType::SpaceRivalry),
            _ => None,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            GameType::Pong => "pong",
            GameType::SpaceRivalry => "space-rivalry",
        }
    }
}

/// Player slot within a match; slot one is whoever matchmaking listed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerSlot {
    One,
    Two,
}

impl PlayerSlot {
    pub fn other(&self) -> Self {
        match self {
            PlayerSlot::One => PlayerSlot::Two,
            PlayerSlot::Two => PlayerSlot::One,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            PlayerSlot::One => 0,
            PlayerSlot::Two => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    Ongoing,
    Completed,
}

/// Match record mirrored in memory while the session lives; the durable copy
/// written through the store is the system of record once completed.
#[derive(Debug, Clone)]
pub struct MatchRecord {
    pub game_id: u64,
    pub game_type: GameType,
    pub player1: String,
    pub player2: String,
    pub status: MatchStatus,
    pub score: (u32, u32),
    pub winner: Option<String>,
    pub forfeit: bool,
}

impl MatchRecord {
    pub fn ongoing(game_id: u64, game_type: GameType, player1: String, player2: String) -> Self {
        Self {
            game_id,
            game_type,
            player1,
            player2,
            status: MatchStatus::Ongoing,
            score: (0, 0),
            winner: None,
            forfeit: false,
        }
    }

    pub fn player_slot(&self, username: &str) -> Option<PlayerSlot> {
        if self.player1 == username {
            Some(PlayerSlot::One)
        } else if self.player2 == username {
            Some(PlayerSlot::Two)
        } else {
            None
        }
    }

    pub fn player_name(&self, slot: PlayerSlot) -> &str {
        match slot {
            PlayerSlot::One => &self.player1,
            PlayerSlot::Two => &self.player2,
        }
    }
}

/// Terminal result produced by a simulation: who won and the final score pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOutcome {
    pub winner: PlayerSlot,
    pub score: (u32, u32),
}

/// Movement/fire intent communicated from a connection into the simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputCommand {
    Up,
    Down,
    Left,
    Right,
    Shoot,
    /// Absolute pointer position, in field coordinates.
    MouseMove { x: f32, y: f32 },
}

/// Whole-state snapshot handed to the broadcast layer each tick.
#[derive(Debug, Clone, PartialEq)]
pub enum GameSnapshot {
    Pong(PongSnapshot),
    Rivalry(RivalrySnapshot),
}

/// Mode dispatch for the per-match simulation owned by the session task.
pub enum GameSim {
    Pong(PongState),
    Rivalry(RivalryState),
}

impl GameSim {
    pub fn new(game_type: GameType, seed: u64) -> Self {
        match game_type {
            GameType::Pong => GameSim::Pong(PongState::new(seed)),
            GameType::SpaceRivalry => GameSim::Rivalry(RivalryState::new(seed)),
        }
    }

    /// Marks the match as started once both slots are attached.
    pub fn start(&mut self) {
        match self {
            GameSim::Pong(state) => state.start(),
            GameSim::Rivalry(state) => state.start(),
        }
    }

    pub fn apply_input(&mut self, slot: PlayerSlot, input: InputCommand) {
        match self {
            GameSim::Pong(state) => state.apply_input(slot, input),
            GameSim::Rivalry(state) => state.apply_input(slot, input),
        }
    }

    /// Advances one fixed tick; returns the outcome when a win condition lands.
    pub fn tick(&mut self) -> Option<MatchOutcome> {
        match self {
            GameSim::Pong(state) => state.tick(),
            GameSim::Rivalry(state) => state.tick(),
        }
    }

    /// Outcome already reached through normal play, if any.
    pub fn outcome(&self) -> Option<MatchOutcome> {
        match self {
            GameSim::Pong(state) => state.outcome(),
            GameSim::Rivalry(state) => state.outcome(),
        }
    }

    /// Forces a winner during forfeit resolution with the mode's placeholder score.
    pub fn force_winner(&mut self, winner: PlayerSlot) -> MatchOutcome {
        match self {
            GameSim::Pong(state) => state.force_winner(winner),
            GameSim::Rivalry(state) => state.force_winner(winner),
        }
    }

    pub fn snapshot(&self, players: &[String; 2]) -> GameSnapshot {
        match self {
            GameSim::Pong(state) => GameSnapshot::Pong(state.snapshot(players)),
            GameSim::Rivalry(state) => GameSnapshot::Rivalry(state.snapshot(players)),
        }
    }
}
