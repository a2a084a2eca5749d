// The authoritative per-match loop. One task per session owns the simulation;
// connection handlers only talk to it through the command channel.

use crate::domain::{GameSim, GameType, MatchOutcome, MatchRecord, MatchStatus, PlayerSlot};
use crate::use_cases::store::MatchStore;
use crate::use_cases::types::{SessionCommand, SessionEvent, SessionPhase, SessionSettings};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{error, info, warn};

/// Immutable facts about the match a session task is driving.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub game_id: u64,
    pub game_type: GameType,
    /// Slot one first, slot two second.
    pub players: [String; 2],
}

enum Ending {
    Finished(MatchOutcome),
    Forfeited(MatchOutcome),
    Cancelled,
}

pub async fn session_task(
    ctx: SessionContext,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    event_tx: broadcast::Sender<SessionEvent>,
    phase_tx: watch::Sender<SessionPhase>,
    store: Arc<dyn MatchStore>,
    settings: SessionSettings,
) {
    // The match id doubles as the simulation seed; a replay of the same
    // session with the same inputs is bit-identical.
    let mut sim = GameSim::new(ctx.game_type, ctx.game_id);
    let mut phase = SessionPhase::Waiting;
    let mut attached = [false, false];
    let mut attach_time: [Option<Instant>; 2] = [None, None];
    // Per-slot forfeit deadlines, armed on detach and cleared on reattach.
    let mut grace: [Option<Instant>; 2] = [None, None];
    let waiting_deadline = Instant::now() + settings.waiting_timeout;

    let mut interval = tokio::time::interval(settings.tick_interval);

    info!(
        game_id = ctx.game_id,
        game_type = ctx.game_type.as_wire(),
        player1 = %ctx.players[0],
        player2 = %ctx.players[1],
        "session started"
    );

    let ending = loop {
        let maybe_ending: Option<Ending> = tokio::select! {
            _ = interval.tick() => {
                let now = Instant::now();

                if let Some(absent) = expired_grace_slot(&grace, now) {
                    if phase == SessionPhase::Playing {
                        info!(game_id = ctx.game_id, player = %ctx.players[absent.index()], "grace period expired; forfeiting");
                        Some(Ending::Forfeited(sim.force_winner(absent.other())))
                    } else {
                        Some(Ending::Cancelled)
                    }
                } else if phase == SessionPhase::Waiting && now >= waiting_deadline {
                    info!(game_id = ctx.game_id, "no full attach before timeout; cancelling");
                    Some(Ending::Cancelled)
                } else if phase == SessionPhase::Playing && grace.iter().all(Option::is_none) {
                    // The simulation holds still while a player is absent.
                    if let Some(outcome) = sim.tick() {
                        Some(Ending::Finished(outcome))
                    } else {
                        let _ = event_tx.send(SessionEvent::Snapshot(sim.snapshot(&ctx.players)));
                        None
                    }
                } else {
                    None
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(SessionCommand::Attach { slot }) => {
                        attached[slot.index()] = true;
                        attach_time[slot.index()] = Some(Instant::now());
                        if grace[slot.index()].take().is_some() {
                            let _ = event_tx.send(SessionEvent::PlayerReconnected {
                                username: ctx.players[slot.index()].clone(),
                            });
                        }
                        if phase == SessionPhase::Waiting && attached.iter().all(|a| *a) {
                            phase = SessionPhase::Playing;
                            let _ = phase_tx.send(SessionPhase::Playing);
                            sim.start();
                            let _ = event_tx.send(SessionEvent::Snapshot(sim.snapshot(&ctx.players)));
                        }
                        None
                    }
                    Some(SessionCommand::Detach { slot }) => {
                        if attached[slot.index()] {
                            attached[slot.index()] = false;
                            let username = ctx.players[slot.index()].clone();
                            let brief = attach_time[slot.index()]
                                .is_some_and(|t| t.elapsed() < settings.unstable_link_threshold);
                            if brief {
                                // A flap this fast is link instability, not
                                // abandonment; it never escalates to forfeit.
                                let _ = event_tx.send(SessionEvent::ConnectionWarning { username });
                            } else {
                                let _ = event_tx.send(SessionEvent::PlayerDisconnected { username });
                                grace[slot.index()] = Some(Instant::now() + settings.grace_period);
                            }
                        }
                        None
                    }
                    Some(SessionCommand::Input { slot, input }) => {
                        // Inputs only move the world during live play. The
                        // mutated state goes out right away rather than waiting
                        // for the next tick.
                        if phase == SessionPhase::Playing && grace.iter().all(Option::is_none) {
                            sim.apply_input(slot, input);
                            let _ = event_tx.send(SessionEvent::Snapshot(sim.snapshot(&ctx.players)));
                        }
                        None
                    }
                    None => Some(Ending::Cancelled),
                }
            }
        };

        if let Some(ending) = maybe_ending {
            break ending;
        }
    };

    match ending {
        Ending::Finished(outcome) => {
            conclude(&ctx, &sim, outcome, false, &event_tx, &phase_tx, store.as_ref()).await;
        }
        Ending::Forfeited(outcome) => {
            conclude(&ctx, &sim, outcome, true, &event_tx, &phase_tx, store.as_ref()).await;
        }
        Ending::Cancelled => {
            if let Err(e) = store.cancel_match(ctx.game_id).await {
                warn!(game_id = ctx.game_id, error = %e, "failed to record match cancellation");
            }
            let _ = phase_tx.send(SessionPhase::Cancelled);
            info!(game_id = ctx.game_id, "session cancelled");
        }
    }
}

fn expired_grace_slot(grace: &[Option<Instant>; 2], now: Instant) -> Option<PlayerSlot> {
    for slot in [PlayerSlot::One, PlayerSlot::Two] {
        if grace[slot.index()].is_some_and(|deadline| now >= deadline) {
            return Some(slot);
        }
    }
    None
}

async fn conclude(
    ctx: &SessionContext,
    sim: &GameSim,
    outcome: MatchOutcome,
    forfeit: bool,
    event_tx: &broadcast::Sender<SessionEvent>,
    phase_tx: &watch::Sender<SessionPhase>,
    store: &dyn MatchStore,
) {
    let snapshot = sim.snapshot(&ctx.players);
    let _ = event_tx.send(SessionEvent::Ended { snapshot, forfeit });

    let record = completed_record(ctx, outcome, forfeit);
    persist_with_retry(store, &record).await;

    let winner = ctx.players[outcome.winner.index()].clone();
    info!(
        game_id = ctx.game_id,
        winner = %winner,
        forfeit,
        score1 = outcome.score.0,
        score2 = outcome.score.1,
        "session ended"
    );
    let phase = if forfeit {
        SessionPhase::Forfeited {
            winner,
            score: outcome.score,
        }
    } else {
        SessionPhase::Finished {
            winner,
            score: outcome.score,
        }
    };
    let _ = phase_tx.send(phase);
}

fn completed_record(ctx: &SessionContext, outcome: MatchOutcome, forfeit: bool) -> MatchRecord {
    let mut record = MatchRecord::ongoing(
        ctx.game_id,
        ctx.game_type,
        ctx.players[0].clone(),
        ctx.players[1].clone(),
    );
    record.status = MatchStatus::Completed;
    record.score = outcome.score;
    record.winner = Some(ctx.players[outcome.winner.index()].clone());
    record.forfeit = forfeit;
    record
}

/// One retry, then log-and-drop. A lost record must never wedge the session
/// teardown path or hold the broadcast channels open.
async fn persist_with_retry(store: &dyn MatchStore, record: &MatchRecord) {
    for attempt in 1..=2u32 {
        match store.submit_result(record).await {
            Ok(()) => return,
            Err(e) if attempt < 2 => {
                warn!(game_id = record.game_id, error = %e, "result submit failed; retrying");
            }
            Err(e) => {
                error!(game_id = record.game_id, error = %e, "result submit failed; dropping record");
            }
        }
    }
}
