// Session registry: owns the set of live match tasks and their channels.

use crate::domain::{GameType, MatchRecord, MatchStatus, PlayerSlot};
use crate::use_cases::matchmaking::ActivePlayers;
use crate::use_cases::session::{SessionContext, session_task};
use crate::use_cases::store::MatchStore;
use crate::use_cases::types::{SessionCommand, SessionEvent, SessionPhase, SessionSettings};
use axum::extract::ws::Utf8Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{RwLock, broadcast, mpsc, watch};
use tracing::{info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("match already exists")]
    AlreadyExists,
    #[error("match not found")]
    MatchNotFound,
    #[error("match already completed")]
    MatchCompleted,
    #[error("not a participant of this match")]
    NotAParticipant,
    #[error("player slot already connected")]
    SlotTaken,
}

/// Per-session channels handed to connection handlers.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    pub game_id: u64,
    /// Sender for commands into the session task.
    pub cmd_tx: mpsc::Sender<SessionCommand>,
    /// Broadcast sender for raw session events.
    pub event_tx: broadcast::Sender<SessionEvent>,
    /// Broadcast sender for serialized session events.
    pub bytes_tx: broadcast::Sender<Utf8Bytes>,
    /// Watch sender holding the latest serialized snapshot.
    pub latest_tx: watch::Sender<Utf8Bytes>,
    /// Watch receiver for session lifecycle changes.
    pub phase_rx: watch::Receiver<SessionPhase>,
}

/// Everything a connection needs after a successful attach.
pub struct AttachGrant {
    pub slot: PlayerSlot,
    pub record: MatchRecord,
    pub handle: SessionHandle,
}

struct MatchEntry {
    record: MatchRecord,
    /// Which slots currently have a live socket.
    occupied: [bool; 2],
    /// Present while the session task is running.
    session: Option<SessionHandle>,
}

/// Thread-safe registry for active match sessions.
pub struct SessionRegistry {
    settings: SessionSettings,
    store: Arc<dyn MatchStore>,
    active: ActivePlayers,
    matches: RwLock<HashMap<u64, MatchEntry>>,
}

impl SessionRegistry {
    pub fn new(settings: SessionSettings, store: Arc<dyn MatchStore>, active: ActivePlayers) -> Self {
        Self {
            settings,
            store,
            active,
            matches: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a match, spawns its session task, and claims both players.
    pub async fn create_match(
        self: &Arc<Self>,
        game_id: u64,
        game_type: GameType,
        player1: String,
        player2: String,
    ) -> Result<SessionHandle, RegistryError> {
        let mut matches = self.matches.write().await;
        if matches.contains_key(&game_id) {
            return Err(RegistryError::AlreadyExists);
        }

        // Channel wiring for the session loop.
        let (cmd_tx, cmd_rx) =
            mpsc::channel::<SessionCommand>(self.settings.command_channel_capacity);
        let (event_tx, _event_rx) =
            broadcast::channel::<SessionEvent>(self.settings.event_broadcast_capacity);
        let (bytes_tx, _bytes_rx) =
            broadcast::channel::<Utf8Bytes>(self.settings.event_broadcast_capacity);
        let (latest_tx, _latest_rx) = watch::channel::<Utf8Bytes>(Utf8Bytes::from(""));
        let (phase_tx, phase_rx) = watch::channel::<SessionPhase>(SessionPhase::Waiting);

        let record = MatchRecord::ongoing(game_id, game_type, player1.clone(), player2.clone());
        self.active.claim(&player1);
        self.active.claim(&player2);

        // Spawn the authoritative loop for this match.
        tokio::spawn(session_task(
            SessionContext {
                game_id,
                game_type,
                players: [player1, player2],
            },
            cmd_rx,
            event_tx.clone(),
            phase_tx,
            self.store.clone(),
            self.settings.clone(),
        ));

        let handle = SessionHandle {
            game_id,
            cmd_tx,
            event_tx,
            bytes_tx,
            latest_tx,
            phase_rx: phase_rx.clone(),
        };

        matches.insert(
            game_id,
            MatchEntry {
                record,
                occupied: [false, false],
                session: Some(handle.clone()),
            },
        );
        drop(matches);

        self.clone().spawn_phase_watcher(game_id, phase_rx);
        Ok(handle)
    }

    /// Watches a session's phase channel and tears the entry down once the
    /// session reaches a terminal state.
    fn spawn_phase_watcher(self: Arc<Self>, game_id: u64, mut phase_rx: watch::Receiver<SessionPhase>) {
        tokio::spawn(async move {
            let terminal = loop {
                if phase_rx.changed().await.is_err() {
                    // Task gone without a terminal phase; treat as cancelled.
                    break SessionPhase::Cancelled;
                }
                let phase = phase_rx.borrow_and_update().clone();
                if phase.is_terminal() {
                    break phase;
                }
            };
            self.finalize_match(game_id, terminal).await;
        });
    }

    async fn finalize_match(&self, game_id: u64, phase: SessionPhase) {
        let mut matches = self.matches.write().await;
        let Some(entry) = matches.get_mut(&game_id) else {
            return;
        };

        self.active.release(&entry.record.player1);
        self.active.release(&entry.record.player2);
        entry.session = None;

        let drop_entry = match phase {
            SessionPhase::Finished { winner, score } => {
                entry.record.status = MatchStatus::Completed;
                entry.record.score = score;
                entry.record.winner = Some(winner);
                entry.record.forfeit = false;
                info!(game_id, "match finalized");
                entry.occupied.iter().all(|o| !o)
            }
            SessionPhase::Forfeited { winner, score } => {
                entry.record.status = MatchStatus::Completed;
                entry.record.score = score;
                entry.record.winner = Some(winner);
                entry.record.forfeit = true;
                info!(game_id, forfeit = true, "match finalized");
                entry.occupied.iter().all(|o| !o)
            }
            SessionPhase::Cancelled => {
                info!(game_id, "match removed after cancellation");
                true
            }
            SessionPhase::Waiting | SessionPhase::Playing => {
                warn!(game_id, "phase watcher finalized on non-terminal phase");
                false
            }
        };
        // A completed entry lingers only while a socket is still attached;
        // the durable copy is the system of record from here on.
        if drop_entry {
            matches.remove(&game_id);
        }
    }

    /// Validates a connection against the match record and reserves its slot.
    pub async fn attach(&self, game_id: u64, username: &str) -> Result<AttachGrant, RegistryError> {
        let mut matches = self.matches.write().await;
        let entry = matches.get_mut(&game_id).ok_or(RegistryError::MatchNotFound)?;

        if entry.record.status == MatchStatus::Completed {
            return Err(RegistryError::MatchCompleted);
        }
        let slot = entry
            .record
            .player_slot(username)
            .ok_or(RegistryError::NotAParticipant)?;
        if entry.occupied[slot.index()] {
            return Err(RegistryError::SlotTaken);
        }
        let handle = entry
            .session
            .as_ref()
            .cloned()
            .ok_or(RegistryError::MatchCompleted)?;

        entry.occupied[slot.index()] = true;
        Ok(AttachGrant {
            slot,
            record: entry.record.clone(),
            handle,
        })
    }

    /// Frees a slot and tells the session the player is gone. Idempotent once
    /// the match has been finalized.
    pub async fn detach(&self, game_id: u64, slot: PlayerSlot) {
        let handle = {
            let mut matches = self.matches.write().await;
            let Some(entry) = matches.get_mut(&game_id) else {
                return;
            };
            entry.occupied[slot.index()] = false;
            let drained = entry.session.is_none() && entry.occupied.iter().all(|o| !o);
            let handle = entry.session.as_ref().cloned();
            if drained {
                // Last socket left a finalized match; drop the entry.
                matches.remove(&game_id);
                return;
            }
            handle
        };
        if let Some(handle) = handle {
            let _ = handle.cmd_tx.send(SessionCommand::Detach { slot }).await;
        }
    }

    /// Shared active-player set consulted by matchmaking.
    pub fn active_players(&self) -> &ActivePlayers {
        &self.active
    }

    /// Number of matches whose session task is still running.
    pub async fn session_count(&self) -> usize {
        let matches = self.matches.read().await;
        matches.values().filter(|entry| entry.session.is_some()).count()
    }

    /// Current record for a match, if it is still known to the registry.
    pub async fn record(&self, game_id: u64) -> Option<MatchRecord> {
        let matches = self.matches.read().await;
        matches.get(&game_id).map(|entry| entry.record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::use_cases::store::NoopStore;
    use std::time::Duration;

    fn test_settings() -> SessionSettings {
        SessionSettings {
            command_channel_capacity: 64,
            event_broadcast_capacity: 128,
            tick_interval: Duration::from_millis(5),
            grace_period: Duration::from_millis(100),
            unstable_link_threshold: Duration::ZERO,
            waiting_timeout: Duration::from_secs(10),
        }
    }

    fn registry() -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(
            test_settings(),
            Arc::new(NoopStore),
            ActivePlayers::new(),
        ))
    }

    async fn create(registry: &Arc<SessionRegistry>, game_id: u64) -> SessionHandle {
        registry
            .create_match(
                game_id,
                GameType::Pong,
                "alice".to_string(),
                "bob".to_string(),
            )
            .await
            .expect("create should succeed")
    }

    #[tokio::test]
    async fn create_claims_both_players() {
        let registry = registry();
        create(&registry, 1).await;
        assert!(registry.active.contains("alice"));
        assert!(registry.active.contains("bob"));
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let registry = registry();
        create(&registry, 1).await;
        let err = registry
            .create_match(1, GameType::Pong, "carol".to_string(), "dave".to_string())
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::AlreadyExists);
    }

    #[tokio::test]
    async fn attach_validates_the_caller() {
        let registry = registry();
        create(&registry, 1).await;

        assert_eq!(
            registry.attach(99, "alice").await.err(),
            Some(RegistryError::MatchNotFound)
        );
        assert_eq!(
            registry.attach(1, "mallory").await.err(),
            Some(RegistryError::NotAParticipant)
        );

        let grant = registry.attach(1, "alice").await.expect("attach");
        assert_eq!(grant.slot, PlayerSlot::One);
        assert_eq!(grant.record.player2, "bob");

        assert_eq!(
            registry.attach(1, "alice").await.err(),
            Some(RegistryError::SlotTaken)
        );
    }

    #[tokio::test]
    async fn detach_frees_the_slot_for_reattach() {
        let registry = registry();
        create(&registry, 1).await;

        let grant = registry.attach(1, "bob").await.expect("attach");
        registry.detach(1, grant.slot).await;
        let again = registry.attach(1, "bob").await.expect("reattach");
        assert_eq!(again.slot, PlayerSlot::Two);
    }

    #[tokio::test]
    async fn forfeit_resolves_once_and_entries_drain_after_detach() {
        let registry = registry();
        let handle = create(&registry, 1).await;

        let alice = registry.attach(1, "alice").await.expect("attach alice");
        let _ = handle
            .cmd_tx
            .send(SessionCommand::Attach { slot: alice.slot })
            .await;
        let bob = registry.attach(1, "bob").await.expect("attach bob");
        let _ = handle
            .cmd_tx
            .send(SessionCommand::Attach { slot: bob.slot })
            .await;

        let mut phase_rx = handle.phase_rx.clone();
        tokio::time::timeout(
            Duration::from_secs(2),
            phase_rx.wait_for(|p| *p == SessionPhase::Playing),
        )
        .await
        .expect("playing timeout")
        .expect("phase channel closed");

        registry.detach(1, bob.slot).await;
        let terminal = tokio::time::timeout(
            Duration::from_secs(2),
            phase_rx.wait_for(|p| p.is_terminal()),
        )
        .await
        .expect("terminal timeout")
        .expect("phase channel closed")
        .clone();
        assert!(
            matches!(terminal, SessionPhase::Forfeited { ref winner, .. } if winner == "alice"),
            "unexpected terminal phase: {terminal:?}"
        );
        // Give the phase watcher a moment to finalize the entry.
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The record survives while the winner's socket is still attached,
        // and a finished match cannot be rejoined.
        assert_eq!(
            registry.attach(1, "bob").await.err(),
            Some(RegistryError::MatchCompleted)
        );

        // A second grace expiry cannot re-resolve the match.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(*handle.phase_rx.borrow(), terminal);

        registry.detach(1, alice.slot).await;
        assert!(registry.record(1).await.is_none());
        assert_eq!(
            registry.attach(1, "alice").await.err(),
            Some(RegistryError::MatchNotFound)
        );
    }

    #[tokio::test]
    async fn cancelled_sessions_are_removed_and_players_released() {
        let mut settings = test_settings();
        settings.waiting_timeout = Duration::from_millis(40);
        let registry = Arc::new(SessionRegistry::new(
            settings,
            Arc::new(NoopStore),
            ActivePlayers::new(),
        ));
        let handle = create(&registry, 1).await;

        let mut phase_rx = handle.phase_rx.clone();
        tokio::time::timeout(Duration::from_secs(2), phase_rx.wait_for(|p| p.is_terminal()))
            .await
            .expect("phase timeout")
            .expect("phase channel closed");
        // Give the phase watcher a moment to finalize the entry.
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(registry.record(1).await.is_none());
        assert!(!registry.active.contains("alice"));
        assert!(!registry.active.contains("bob"));
        assert_eq!(
            registry.attach(1, "alice").await.err(),
            Some(RegistryError::MatchNotFound)
        );
    }
}
