// In-memory matchmaking queues, one FIFO per game type.

use crate::domain::GameType;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;

/// Players currently bound to a live session; they may not queue again.
#[derive(Debug, Clone, Default)]
pub struct ActivePlayers {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl ActivePlayers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, username: &str) -> bool {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).contains(username)
    }

    pub fn claim(&self, username: &str) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(username.to_string());
    }

    pub fn release(&self, username: &str) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(username);
    }
}

/// Notification delivered to a queued player once an opponent is found.
#[derive(Debug, Clone)]
pub struct MatchNotice {
    pub game_id: u64,
    pub opponent: String,
    /// Username occupying slot one, which both clients need to agree on.
    pub player1: String,
    pub game_type: GameType,
}

/// A player waiting in a queue, with the channel used to deliver their notice.
#[derive(Debug)]
pub struct Ticket {
    pub username: String,
    pub enqueued_at: Instant,
    pub notify: mpsc::Sender<MatchNotice>,
}

impl Ticket {
    pub fn new(username: String, notify: mpsc::Sender<MatchNotice>) -> Self {
        Self {
            username,
            enqueued_at: Instant::now(),
            notify,
        }
    }
}

/// Outcome returned after enqueueing a player.
#[derive(Debug)]
pub enum JoinOutcome {
    Waiting,
    /// `first` is the longer-waiting player and takes slot one.
    Paired { first: Ticket, second: Ticket },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchmakingError {
    #[error("already searching for a match")]
    AlreadyQueued,
    #[error("already in an active match")]
    AlreadyInSession,
}

/// FIFO matchmaker keyed by game type.
#[derive(Debug, Default)]
pub struct Matchmaker {
    queues: HashMap<GameType, VecDeque<Ticket>>,
}

impl Matchmaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a player and pairs them immediately when an opponent waits.
    pub fn enqueue(
        &mut self,
        game_type: GameType,
        ticket: Ticket,
        active: &ActivePlayers,
    ) -> Result<JoinOutcome, MatchmakingError> {
        if self
            .queues
            .values()
            .flatten()
            .any(|waiting| waiting.username == ticket.username)
        {
            return Err(MatchmakingError::AlreadyQueued);
        }
        if active.contains(&ticket.username) {
            return Err(MatchmakingError::AlreadyInSession);
        }

        let queue = self.queues.entry(game_type).or_default();
        // A queued player may have dropped their socket; their notice channel
        // is closed, so skip them rather than pairing against a ghost.
        while let Some(opponent) = queue.pop_front() {
            if opponent.notify.is_closed() {
                continue;
            }
            return Ok(JoinOutcome::Paired {
                first: opponent,
                second: ticket,
            });
        }

        queue.push_back(ticket);
        Ok(JoinOutcome::Waiting)
    }

    /// Number of tickets currently waiting across every queue.
    pub fn queued_count(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    /// Removes a player from every queue. Safe to call for unknown players.
    pub fn leave(&mut self, username: &str) {
        for queue in self.queues.values_mut() {
            queue.retain(|ticket| ticket.username != username);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(name: &str) -> (Ticket, mpsc::Receiver<MatchNotice>) {
        let (tx, rx) = mpsc::channel(1);
        (Ticket::new(name.to_string(), tx), rx)
    }

    #[tokio::test]
    async fn pairs_oldest_waiter_first() {
        let mut matchmaker = Matchmaker::new();
        let active = ActivePlayers::new();

        let (alice, _alice_rx) = ticket("alice");
        let (bob, _bob_rx) = ticket("bob");
        let (carol, _carol_rx) = ticket("carol");

        assert!(matches!(
            matchmaker.enqueue(GameType::Pong, alice, &active),
            Ok(JoinOutcome::Waiting)
        ));
        match matchmaker.enqueue(GameType::Pong, bob, &active) {
            Ok(JoinOutcome::Paired { first, second }) => {
                assert_eq!(first.username, "alice");
                assert_eq!(second.username, "bob");
            }
            other => panic!("expected pairing, got {other:?}"),
        }
        // The queue drained; the next player waits again.
        assert!(matches!(
            matchmaker.enqueue(GameType::Pong, carol, &active),
            Ok(JoinOutcome::Waiting)
        ));
    }

    #[tokio::test]
    async fn queues_are_separate_per_game_type() {
        let mut matchmaker = Matchmaker::new();
        let active = ActivePlayers::new();

        let (alice, _alice_rx) = ticket("alice");
        let (bob, _bob_rx) = ticket("bob");

        matchmaker.enqueue(GameType::Pong, alice, &active).unwrap();
        assert!(matches!(
            matchmaker.enqueue(GameType::SpaceRivalry, bob, &active),
            Ok(JoinOutcome::Waiting)
        ));
    }

    #[tokio::test]
    async fn rejects_duplicate_queue_entry() {
        let mut matchmaker = Matchmaker::new();
        let active = ActivePlayers::new();

        let (first, _rx1) = ticket("alice");
        let (second, _rx2) = ticket("alice");

        matchmaker.enqueue(GameType::Pong, first, &active).unwrap();
        assert_eq!(
            matchmaker
                .enqueue(GameType::SpaceRivalry, second, &active)
                .unwrap_err(),
            MatchmakingError::AlreadyQueued
        );
    }

    #[tokio::test]
    async fn rejects_players_in_active_sessions() {
        let mut matchmaker = Matchmaker::new();
        let active = ActivePlayers::new();
        active.claim("alice");

        let (alice, _rx) = ticket("alice");
        assert_eq!(
            matchmaker.enqueue(GameType::Pong, alice, &active).unwrap_err(),
            MatchmakingError::AlreadyInSession
        );
    }

    #[tokio::test]
    async fn skips_waiters_with_closed_channels() {
        let mut matchmaker = Matchmaker::new();
        let active = ActivePlayers::new();

        let (alice, alice_rx) = ticket("alice");
        matchmaker.enqueue(GameType::Pong, alice, &active).unwrap();
        drop(alice_rx);

        let (bob, _bob_rx) = ticket("bob");
        assert!(matches!(
            matchmaker.enqueue(GameType::Pong, bob, &active),
            Ok(JoinOutcome::Waiting)
        ));
    }

    #[tokio::test]
    async fn leave_removes_ticket_and_is_idempotent() {
        let mut matchmaker = Matchmaker::new();
        let active = ActivePlayers::new();

        let (alice, _alice_rx) = ticket("alice");
        matchmaker.enqueue(GameType::Pong, alice, &active).unwrap();
        matchmaker.leave("alice");
        matchmaker.leave("alice");

        // Alice is gone, so bob waits instead of pairing.
        let (bob, _bob_rx) = ticket("bob");
        assert!(matches!(
            matchmaker.enqueue(GameType::Pong, bob, &active),
            Ok(JoinOutcome::Waiting)
        ));
    }

    #[tokio::test]
    async fn released_players_can_requeue() {
        let mut matchmaker = Matchmaker::new();
        let active = ActivePlayers::new();
        active.claim("alice");
        active.release("alice");

        let (alice, _rx) = ticket("alice");
        assert!(matches!(
            matchmaker.enqueue(GameType::Pong, alice, &active),
            Ok(JoinOutcome::Waiting)
        ));
    }
}
