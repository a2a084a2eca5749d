// Arcade shooter rules. Both ships share one field; destroying a hazard
// scores the shooter and launches a retaliation shot at the other ship.

use crate::domain::rng::SeededRng;
use crate::domain::{InputCommand, MatchOutcome, PlayerSlot};

pub const FIELD_WIDTH: f32 = 800.0;
pub const FIELD_HEIGHT: f32 = 600.0;
pub const SHIP_Y: f32 = 560.0;
pub const SHIP_WIDTH: f32 = 40.0;
pub const SHIP_SPEED: f32 = 8.0;
pub const STARTING_HEALTH: u32 = 3;

pub const SHOT_SPEED: f32 = 10.0;
/// Ticks between shots; rapid fire roughly doubles the rate.
pub const SHOT_COOLDOWN: u32 = 15;
pub const RAPID_FIRE_COOLDOWN: u32 = 7;

pub const HAZARD_SPAWN_INTERVAL: u32 = 45;
pub const SCOUT_SPEED: f32 = 4.0;
pub const SCOUT_RADIUS: f32 = 12.0;
pub const CRUISER_SPEED: f32 = 1.5;
pub const CRUISER_RADIUS: f32 = 24.0;
pub const CRUISER_HEALTH: u32 = 2;
pub const FRAGMENT_RADIUS: f32 = 10.0;

pub const KILL_SCORE: u32 = 50;
/// Ticks a combo survives without another kill.
pub const COMBO_WINDOW: u32 = 120;
pub const POWER_UP_CHANCE: f32 = 0.2;
pub const POWER_UP_DURATION: u32 = 300;
pub const RETALIATION_SHOT_SPEED: f32 = 6.0;

/// Placeholder forfeit score for this mode.
pub const FORFEIT_SCORE: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HazardKind {
    Scout,
    Cruiser,
    Fragment,
}

impl HazardKind {
    fn radius(&self) -> f32 {
        match self {
            HazardKind::Scout => SCOUT_RADIUS,
            HazardKind::Cruiser => CRUISER_RADIUS,
            HazardKind::Fragment => FRAGMENT_RADIUS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hazard {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub kind: HazardKind,
    pub health: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Shot {
    pub x: f32,
    pub y: f32,
    pub owner: PlayerSlot,
}

/// Retaliation projectile launched from a destroyed hazard toward a ship.
#[derive(Debug, Clone, PartialEq)]
pub struct EnemyShot {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub target: PlayerSlot,
}

#[derive(Debug, Clone)]
struct Ship {
    x: f32,
    health: u32,
    score: u32,
    combo: u32,
    combo_ticks: u32,
    shot_cooldown: u32,
    shield_ticks: u32,
    rapid_fire_ticks: u32,
    wants_shot: bool,
}

impl Ship {
    fn new(x: f32) -> Self {
        Self {
            x,
            health: STARTING_HEALTH,
            score: 0,
            combo: 0,
            combo_ticks: 0,
            shot_cooldown: 0,
            shield_ticks: 0,
            rapid_fire_ticks: 0,
            wants_shot: false,
        }
    }

    fn cooldown_after_shot(&self) -> u32 {
        if self.rapid_fire_ticks > 0 {
            RAPID_FIRE_COOLDOWN
        } else {
            SHOT_COOLDOWN
        }
    }

    /// A shield eats the whole hit; otherwise lose health and the combo.
    fn absorb_hit(&mut self) {
        if self.shield_ticks > 0 {
            self.shield_ticks = 0;
        } else {
            self.health = self.health.saturating_sub(1);
            self.combo = 0;
            self.combo_ticks = 0;
        }
    }
}

/// Authoritative shooter state, mutated only by the session task.
pub struct RivalryState {
    rng: SeededRng,
    started: bool,
    ships: [Ship; 2],
    shots: Vec<Shot>,
    enemy_shots: Vec<EnemyShot>,
    hazards: Vec<Hazard>,
    spawn_timer: u32,
    outcome: Option<MatchOutcome>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShipView {
    pub x: f32,
    pub health: u32,
    pub score: u32,
    pub combo: u32,
    pub shield: bool,
    pub rapid_fire: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HazardView {
    pub x: f32,
    pub y: f32,
    pub kind: HazardKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShotView {
    pub x: f32,
    pub y: f32,
    pub player1: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnemyShotView {
    pub x: f32,
    pub y: f32,
}

/// Whole-state snapshot for broadcast; never a delta.
#[derive(Debug, Clone, PartialEq)]
pub struct RivalrySnapshot {
    pub game_started: bool,
    pub game_over: bool,
    pub player1: String,
    pub player2: String,
    pub ship1: ShipView,
    pub ship2: ShipView,
    pub shots: Vec<ShotView>,
    pub enemy_shots: Vec<EnemyShotView>,
    pub hazards: Vec<HazardView>,
    pub winner: Option<String>,
}

impl RivalryState {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SeededRng::new(seed),
            started: false,
            ships: [
                Ship::new(FIELD_WIDTH / 3.0),
                Ship::new(FIELD_WIDTH * 2.0 / 3.0),
            ],
            shots: Vec::new(),
            enemy_shots: Vec::new(),
            hazards: Vec::new(),
            spawn_timer: HAZARD_SPAWN_INTERVAL,
            outcome: None,
        }
    }

    pub fn start(&mut self) {
        self.started = true;
    }

    pub fn outcome(&self) -> Option<MatchOutcome> {
        self.outcome
    }

    pub fn force_winner(&mut self, winner: PlayerSlot) -> MatchOutcome {
        let score = match winner {
            PlayerSlot::One => (FORFEIT_SCORE, 0),
            PlayerSlot::Two => (0, FORFEIT_SCORE),
        };
        let outcome = MatchOutcome { winner, score };
        self.outcome = Some(outcome);
        outcome
    }

    pub fn apply_input(&mut self, slot: PlayerSlot, input: InputCommand) {
        if self.outcome.is_some() {
            return;
        }
        let half = SHIP_WIDTH / 2.0;
        let ship = &mut self.ships[slot.index()];
        match input {
            InputCommand::Left => ship.x = (ship.x - SHIP_SPEED).max(half),
            InputCommand::Right => ship.x = (ship.x + SHIP_SPEED).min(FIELD_WIDTH - half),
            InputCommand::Shoot => ship.wants_shot = true,
            InputCommand::MouseMove { x, .. } => {
                ship.x = x.clamp(half, FIELD_WIDTH - half)
            }
            // Vertical movement belongs to the other mode.
            InputCommand::Up | InputCommand::Down => {}
        }
    }

    pub fn tick(&mut self) -> Option<MatchOutcome> {
        if !self.started || self.outcome.is_some() {
            return None;
        }

        self.tick_timers();
        self.fire_pending_shots();
        self.advance_projectiles();
        self.spawn_hazards();
        self.resolve_shot_hits();
        self.resolve_ship_hits();
        self.check_win();
        self.outcome
    }

    fn tick_timers(&mut self) {
        for ship in &mut self.ships {
            ship.shot_cooldown = ship.shot_cooldown.saturating_sub(1);
            ship.shield_ticks = ship.shield_ticks.saturating_sub(1);
            ship.rapid_fire_ticks = ship.rapid_fire_ticks.saturating_sub(1);
            if ship.combo_ticks > 0 {
                ship.combo_ticks -= 1;
                if ship.combo_ticks == 0 {
                    ship.combo = 0;
                }
            }
        }
    }

    fn fire_pending_shots(&mut self) {
        for (index, ship) in self.ships.iter_mut().enumerate() {
            if !ship.wants_shot {
                continue;
            }
            ship.wants_shot = false;
            if ship.shot_cooldown > 0 {
                continue;
            }
            ship.shot_cooldown = ship.cooldown_after_shot();
            self.shots.push(Shot {
                x: ship.x,
                y: SHIP_Y - SHIP_WIDTH / 2.0,
                owner: if index == 0 {
                    PlayerSlot::One
                } else {
                    PlayerSlot::Two
                },
            });
        }
    }

    fn advance_projectiles(&mut self) {
        for shot in &mut self.shots {
            shot.y -= SHOT_SPEED;
        }
        self.shots.retain(|shot| shot.y > -SHOT_SPEED);

        for shot in &mut self.enemy_shots {
            shot.x += shot.vx;
            shot.y += shot.vy;
        }
        self.enemy_shots.retain(|shot| {
            shot.y < FIELD_HEIGHT + RETALIATION_SHOT_SPEED
                && shot.x > -RETALIATION_SHOT_SPEED
                && shot.x < FIELD_WIDTH + RETALIATION_SHOT_SPEED
        });

        for hazard in &mut self.hazards {
            let speed = match hazard.kind {
                HazardKind::Cruiser => CRUISER_SPEED,
                HazardKind::Scout | HazardKind::Fragment => SCOUT_SPEED,
            };
            hazard.y += speed;
            hazard.x = (hazard.x + hazard.vx)
                .clamp(hazard.kind.radius(), FIELD_WIDTH - hazard.kind.radius());
        }
        // Hazards that fall past the floor despawn.
        self.hazards.retain(|h| h.y < FIELD_HEIGHT + h.kind.radius());
    }

    fn spawn_hazards(&mut self) {
        self.spawn_timer = self.spawn_timer.saturating_sub(1);
        if self.spawn_timer > 0 {
            return;
        }
        self.spawn_timer = HAZARD_SPAWN_INTERVAL;

        let x = self.rng.range_f32(20.0, FIELD_WIDTH - 20.0);
        let cruiser = self.rng.chance(1.0 / 3.0);
        let (kind, health) = if cruiser {
            (HazardKind::Cruiser, CRUISER_HEALTH)
        } else {
            (HazardKind::Scout, 1)
        };
        self.hazards.push(Hazard {
            x,
            y: -kind.radius(),
            vx: 0.0,
            kind,
            health,
        });
    }

    fn resolve_shot_hits(&mut self) {
        let mut destroyed: Vec<(f32, f32, HazardKind, PlayerSlot)> = Vec::new();

        let hazards = &mut self.hazards;
        self.shots.retain(|shot| {
            for hazard in hazards.iter_mut() {
                if hazard.health == 0 {
                    continue;
                }
                let dx = shot.x - hazard.x;
                let dy = shot.y - hazard.y;
                let radius = hazard.kind.radius();
                if dx * dx + dy * dy <= radius * radius {
                    hazard.health -= 1;
                    if hazard.health == 0 {
                        destroyed.push((hazard.x, hazard.y, hazard.kind, shot.owner));
                    }
                    return false;
                }
            }
            true
        });
        self.hazards.retain(|h| h.health > 0);

        for (x, y, kind, owner) in destroyed {
            self.award_kill(owner);
            if kind == HazardKind::Cruiser {
                self.split_cruiser(x, y);
            }
            self.launch_retaliation(x, y, owner.other());
        }
    }

    fn award_kill(&mut self, owner: PlayerSlot) {
        let ship = &mut self.ships[owner.index()];
        ship.score += KILL_SCORE * (ship.combo + 1);
        ship.combo += 1;
        ship.combo_ticks = COMBO_WINDOW;

        if self.rng.chance(POWER_UP_CHANCE) {
            let ship = &mut self.ships[owner.index()];
            if self.rng.next_bool() {
                ship.shield_ticks = POWER_UP_DURATION;
            } else {
                ship.rapid_fire_ticks = POWER_UP_DURATION;
            }
        }
    }

    fn split_cruiser(&mut self, x: f32, y: f32) {
        for direction in [-1.0f32, 1.0] {
            self.hazards.push(Hazard {
                x: x + direction * CRUISER_RADIUS,
                y,
                vx: direction * 1.5,
                kind: HazardKind::Fragment,
                health: 1,
            });
        }
    }

    fn launch_retaliation(&mut self, x: f32, y: f32, target: PlayerSlot) {
        let target_x = self.ships[target.index()].x;
        let dx = target_x - x;
        let dy = SHIP_Y - y;
        let length = dx.hypot(dy).max(1.0);
        self.enemy_shots.push(EnemyShot {
            x,
            y,
            vx: dx / length * RETALIATION_SHOT_SPEED,
            vy: dy / length * RETALIATION_SHOT_SPEED,
            target,
        });
    }

    fn resolve_ship_hits(&mut self) {
        let half = SHIP_WIDTH / 2.0;
        let ships = &mut self.ships;
        self.enemy_shots.retain(|shot| {
            let ship = &mut ships[shot.target.index()];
            let hit = (shot.x - ship.x).abs() <= half && (shot.y - SHIP_Y).abs() <= half;
            if !hit {
                return true;
            }
            ship.absorb_hit();
            false
        });

        // Hazards ram whichever ship they reach; contact consumes the hazard.
        self.hazards.retain(|hazard| {
            let reach = hazard.kind.radius() + half;
            for ship in ships.iter_mut() {
                let dx = hazard.x - ship.x;
                let dy = hazard.y - SHIP_Y;
                if dx.abs() <= reach && dy.abs() <= reach {
                    ship.absorb_hit();
                    return false;
                }
            }
            true
        });
    }

    fn check_win(&mut self) {
        if self.outcome.is_some() {
            return;
        }
        let winner = if self.ships[0].health == 0 {
            Some(PlayerSlot::Two)
        } else if self.ships[1].health == 0 {
            Some(PlayerSlot::One)
        } else {
            None
        };
        if let Some(winner) = winner {
            self.outcome = Some(MatchOutcome {
                winner,
                score: (self.ships[0].score, self.ships[1].score),
            });
        }
    }

    pub fn snapshot(&self, players: &[String; 2]) -> RivalrySnapshot {
        let view = |ship: &Ship| ShipView {
            x: ship.x,
            health: ship.health,
            score: ship.score,
            combo: ship.combo,
            shield: ship.shield_ticks > 0,
            rapid_fire: ship.rapid_fire_ticks > 0,
        };
        RivalrySnapshot {
            game_started: self.started,
            game_over: self.outcome.is_some(),
            player1: players[0].clone(),
            player2: players[1].clone(),
            ship1: view(&self.ships[0]),
            ship2: view(&self.ships[1]),
            shots: self
                .shots
                .iter()
                .map(|s| ShotView {
                    x: s.x,
                    y: s.y,
                    player1: s.owner == PlayerSlot::One,
                })
                .collect(),
            enemy_shots: self
                .enemy_shots
                .iter()
                .map(|s| EnemyShotView { x: s.x, y: s.y })
                .collect(),
            hazards: self
                .hazards
                .iter()
                .map(|h| HazardView {
                    x: h.x,
                    y: h.y,
                    kind: h.kind,
                })
                .collect(),
            winner: self
                .outcome
                .map(|o| players[o.winner.index()].clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started_state() -> RivalryState {
        let mut state = RivalryState::new(3);
        state.start();
        state
    }

    #[test]
    fn ship_movement_clamps_to_field() {
        let mut state = started_state();
        for _ in 0..200 {
            state.apply_input(PlayerSlot::One, InputCommand::Left);
        }
        assert_eq!(state.ships[0].x, SHIP_WIDTH / 2.0);
        for _ in 0..200 {
            state.apply_input(PlayerSlot::One, InputCommand::Right);
        }
        assert_eq!(state.ships[0].x, FIELD_WIDTH - SHIP_WIDTH / 2.0);
    }

    #[test]
    fn shot_cooldown_limits_fire_rate() {
        let mut state = started_state();
        state.apply_input(PlayerSlot::One, InputCommand::Shoot);
        state.tick();
        assert_eq!(state.shots.len(), 1);

        // Immediately firing again is swallowed by the cooldown.
        state.apply_input(PlayerSlot::One, InputCommand::Shoot);
        state.tick();
        assert_eq!(state.shots.len(), 1);

        for _ in 0..SHOT_COOLDOWN {
            state.tick();
        }
        state.apply_input(PlayerSlot::One, InputCommand::Shoot);
        state.tick();
        assert_eq!(state.shots.len(), 2);
    }

    #[test]
    fn destroying_a_scout_scores_and_retaliates() {
        let mut state = started_state();
        state.hazards.push(Hazard {
            x: 400.0,
            y: 300.0,
            vx: 0.0,
            kind: HazardKind::Scout,
            health: 1,
        });
        state.shots.push(Shot {
            x: 400.0,
            y: 300.0 + SHOT_SPEED + 2.0,
            owner: PlayerSlot::One,
        });
        state.spawn_timer = 10_000;
        state.tick();

        assert_eq!(state.ships[0].score, KILL_SCORE);
        assert_eq!(state.ships[0].combo, 1);
        assert!(state.hazards.is_empty());
        assert_eq!(state.enemy_shots.len(), 1);
        assert_eq!(state.enemy_shots[0].target, PlayerSlot::Two);
    }

    #[test]
    fn combo_multiplies_kill_score() {
        let mut state = started_state();
        state.spawn_timer = 10_000;
        for _ in 0..2 {
            state.hazards.push(Hazard {
                x: 200.0,
                y: 300.0,
                vx: 0.0,
                kind: HazardKind::Scout,
                health: 1,
            });
            state.shots.push(Shot {
                x: 200.0,
                y: 300.0 + SHOT_SPEED + 2.0,
                owner: PlayerSlot::One,
            });
            state.enemy_shots.clear();
            state.tick();
        }
        // 50 for the first kill, 100 for the second within the window.
        assert_eq!(state.ships[0].score, KILL_SCORE * 3);
        assert_eq!(state.ships[0].combo, 2);
    }

    #[test]
    fn combo_expires_after_the_window() {
        let mut state = started_state();
        state.spawn_timer = 10_000;
        state.ships[0].combo = 3;
        state.ships[0].combo_ticks = 1;
        state.tick();
        assert_eq!(state.ships[0].combo, 0);
    }

    #[test]
    fn cruiser_splits_into_fragments() {
        let mut state = started_state();
        state.spawn_timer = 10_000;
        state.hazards.push(Hazard {
            x: 400.0,
            y: 300.0,
            vx: 0.0,
            kind: HazardKind::Cruiser,
            health: 1,
        });
        state.shots.push(Shot {
            x: 400.0,
            y: 300.0 + SHOT_SPEED + 2.0,
            owner: PlayerSlot::Two,
        });
        state.tick();

        let fragments: Vec<_> = state
            .hazards
            .iter()
            .filter(|h| h.kind == HazardKind::Fragment)
            .collect();
        assert_eq!(fragments.len(), 2);
        assert_eq!(state.enemy_shots[0].target, PlayerSlot::One);
    }

    #[test]
    fn cruiser_takes_two_hits() {
        let mut state = started_state();
        state.spawn_timer = 10_000;
        state.hazards.push(Hazard {
            x: 400.0,
            y: 300.0,
            vx: 0.0,
            kind: HazardKind::Cruiser,
            health: CRUISER_HEALTH,
        });
        state.shots.push(Shot {
            x: 400.0,
            y: 300.0 + SHOT_SPEED + 2.0,
            owner: PlayerSlot::One,
        });
        state.tick();
        assert_eq!(state.hazards.len(), 1);
        assert_eq!(state.hazards[0].health, 1);
        assert_eq!(state.ships[0].score, 0);
    }

    #[test]
    fn shield_absorbs_one_hit() {
        let mut state = started_state();
        state.spawn_timer = 10_000;
        state.ships[1].shield_ticks = POWER_UP_DURATION;
        state.enemy_shots.push(EnemyShot {
            x: state.ships[1].x,
            y: SHIP_Y,
            vx: 0.0,
            vy: 0.0,
            target: PlayerSlot::Two,
        });
        state.tick();
        assert_eq!(state.ships[1].health, STARTING_HEALTH);
        assert_eq!(state.ships[1].shield_ticks, 0);
    }

    #[test]
    fn unshielded_hit_costs_health_and_combo() {
        let mut state = started_state();
        state.spawn_timer = 10_000;
        state.ships[1].combo = 4;
        state.ships[1].combo_ticks = COMBO_WINDOW;
        state.enemy_shots.push(EnemyShot {
            x: state.ships[1].x,
            y: SHIP_Y,
            vx: 0.0,
            vy: 0.0,
            target: PlayerSlot::Two,
        });
        state.tick();
        assert_eq!(state.ships[1].health, STARTING_HEALTH - 1);
        assert_eq!(state.ships[1].combo, 0);
    }

    #[test]
    fn hazard_contact_costs_health_and_consumes_the_hazard() {
        let mut state = started_state();
        state.spawn_timer = 10_000;
        state.hazards.push(Hazard {
            x: state.ships[0].x,
            y: SHIP_Y,
            vx: 0.0,
            kind: HazardKind::Scout,
            health: 1,
        });
        state.tick();
        assert_eq!(state.ships[0].health, STARTING_HEALTH - 1);
        assert!(state.hazards.is_empty());
    }

    #[test]
    fn shield_absorbs_hazard_contact() {
        let mut state = started_state();
        state.spawn_timer = 10_000;
        state.ships[1].shield_ticks = POWER_UP_DURATION;
        state.hazards.push(Hazard {
            x: state.ships[1].x,
            y: SHIP_Y,
            vx: 0.0,
            kind: HazardKind::Cruiser,
            health: CRUISER_HEALTH,
        });
        state.tick();
        assert_eq!(state.ships[1].health, STARTING_HEALTH);
        assert_eq!(state.ships[1].shield_ticks, 0);
        assert!(state.hazards.is_empty());
    }

    #[test]
    fn depleting_health_ends_the_match() {
        let mut state = started_state();
        state.spawn_timer = 10_000;
        state.ships[0].health = 1;
        state.ships[1].score = 300;
        state.enemy_shots.push(EnemyShot {
            x: state.ships[0].x,
            y: SHIP_Y,
            vx: 0.0,
            vy: 0.0,
            target: PlayerSlot::One,
        });
        let outcome = state.tick().expect("match should end");
        assert_eq!(outcome.winner, PlayerSlot::Two);
        assert_eq!(outcome.score, (0, 300));
        assert!(state.tick().is_none());
    }

    #[test]
    fn same_seed_same_simulation() {
        let mut a = started_state();
        let mut b = started_state();
        for tick in 0..600 {
            if tick % 5 == 0 {
                a.apply_input(PlayerSlot::One, InputCommand::Shoot);
                b.apply_input(PlayerSlot::One, InputCommand::Shoot);
            }
            a.tick();
            b.tick();
        }
        let players = ["a".to_string(), "b".to_string()];
        assert_eq!(a.snapshot(&players), b.snapshot(&players));
    }

    #[test]
    fn hazards_spawn_on_the_interval() {
        let mut state = started_state();
        for _ in 0..HAZARD_SPAWN_INTERVAL {
            state.tick();
        }
        assert_eq!(state.hazards.len(), 1);
        let x = state.hazards[0].x;
        assert!((20.0..=FIELD_WIDTH - 20.0).contains(&x));
    }

    #[test]
    fn forfeit_assigns_placeholder_score() {
        let mut state = started_state();
        let outcome = state.force_winner(PlayerSlot::One);
        assert_eq!(outcome.score, (FORFEIT_SCORE, 0));
    }
}
