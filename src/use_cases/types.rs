// Use-case level inputs/outputs for the session loop.

use crate::domain::{GameSnapshot, InputCommand, PlayerSlot};
use std::time::Duration;

/// Commands flowing from connection handlers into a session task.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    Attach { slot: PlayerSlot },
    Detach { slot: PlayerSlot },
    Input { slot: PlayerSlot, input: InputCommand },
}

/// Events a session task fans out to every subscribed connection.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Authoritative whole-state snapshot for the current tick.
    Snapshot(GameSnapshot),
    PlayerDisconnected { username: String },
    PlayerReconnected { username: String },
    /// The named player's link dropped almost immediately after attaching.
    ConnectionWarning { username: String },
    /// Terminal broadcast carrying the final state.
    Ended { snapshot: GameSnapshot, forfeit: bool },
}

/// High-level session lifecycle published on the watch channel.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionPhase {
    Waiting,
    Playing,
    Finished { winner: String, score: (u32, u32) },
    Forfeited { winner: String, score: (u32, u32) },
    Cancelled,
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionPhase::Finished { .. } | SessionPhase::Forfeited { .. } | SessionPhase::Cancelled
        )
    }
}

/// Shared configuration for spawning session tasks.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Capacity for inbound session commands.
    pub command_channel_capacity: usize,
    /// Capacity for broadcast session events.
    pub event_broadcast_capacity: usize,
    /// Fixed tick interval for the simulation loop.
    pub tick_interval: Duration,
    /// How long an absent player may stay away before forfeiting.
    pub grace_period: Duration,
    /// Connections shorter than this are reported as link instability.
    pub unstable_link_threshold: Duration,
    /// How long a session waits for both players before cancelling.
    pub waiting_timeout: Duration,
}
