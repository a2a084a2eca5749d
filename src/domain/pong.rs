// Paddle-and-ball simulation rules. Field coordinates match the classic
// client: origin top-left, y grows downward, ball speed in px per tick.

use crate::domain::rng::SeededRng;
use crate::domain::{InputCommand, MatchOutcome, PlayerSlot};

pub const GAME_WIDTH: f32 = 800.0;
pub const GAME_HEIGHT: f32 = 400.0;
pub const PADDLE_WIDTH: f32 = 15.0;
pub const PADDLE_HEIGHT: f32 = 80.0;
pub const BALL_SIZE: f32 = 10.0;
pub const PADDLE_SPEED: f32 = 8.0;
pub const INITIAL_BALL_SPEED: f32 = 7.0;
pub const MAX_BALL_SPEED: f32 = 15.0;
pub const BALL_SPEEDUP: f32 = 0.2;
/// Steepest rebound angle off a paddle edge (75 degrees).
pub const MAX_BOUNCE_ANGLE: f32 = 5.0 * std::f32::consts::PI / 12.0;

const LEFT_PADDLE_X: f32 = 50.0;
const RIGHT_PADDLE_X: f32 = GAME_WIDTH - 50.0 - PADDLE_WIDTH;

/// Points needed to take a round, subject to the lead margin.
pub const ROUND_TARGET: u32 = 11;
/// Required lead: 11-10 keeps playing, 12-10 ends the round.
pub const ROUND_LEAD: u32 = 2;
/// Rounds needed to take the match.
pub const ROUNDS_TO_WIN: u32 = 2;

/// Authoritative paddle-and-ball state, mutated only by the session task.
pub struct PongState {
    rng: SeededRng,
    started: bool,
    paddle1_y: f32,
    paddle2_y: f32,
    ball_x: f32,
    ball_y: f32,
    vel_x: f32,
    vel_y: f32,
    score: (u32, u32),
    rounds: (u32, u32),
    total_points: (u32, u32),
    outcome: Option<MatchOutcome>,
}

/// Whole-state snapshot for broadcast; never a delta.
#[derive(Debug, Clone, PartialEq)]
pub struct PongSnapshot {
    pub game_started: bool,
    pub game_over: bool,
    pub player1: String,
    pub player2: String,
    pub paddle1_y: f32,
    pub paddle2_y: f32,
    pub ball_x: f32,
    pub ball_y: f32,
    pub score1: u32,
    pub score2: u32,
    pub rounds1: u32,
    pub rounds2: u32,
    pub winner: Option<String>,
}

impl PongState {
    pub fn new(seed: u64) -> Self {
        let mut rng = SeededRng::new(seed);
        let (vel_x, vel_y) = serve_velocity(&mut rng);
        Self {
            rng,
            started: false,
            paddle1_y: (GAME_HEIGHT - PADDLE_HEIGHT) / 2.0,
            paddle2_y: (GAME_HEIGHT - PADDLE_HEIGHT) / 2.0,
            ball_x: GAME_WIDTH / 2.0,
            ball_y: GAME_HEIGHT / 2.0,
            vel_x,
            vel_y,
            score: (0, 0),
            rounds: (0, 0),
            total_points: (0, 0),
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
        // Placeholder forfeit score: winning threshold vs zero.
        let score = match winner {
            PlayerSlot::One => (ROUND_TARGET, 0),
            PlayerSlot::Two => (0, ROUND_TARGET),
        };
        let outcome = MatchOutcome { winner, score };
        self.outcome = Some(outcome);
        outcome
    }

    pub fn apply_input(&mut self, slot: PlayerSlot, input: InputCommand) {
        if self.outcome.is_some() {
            return;
        }
        let paddle = match slot {
            PlayerSlot::One => &mut self.paddle1_y,
            PlayerSlot::Two => &mut self.paddle2_y,
        };
        match input {
            InputCommand::Up => *paddle = (*paddle - PADDLE_SPEED).max(0.0),
            InputCommand::Down => {
                *paddle = (*paddle + PADDLE_SPEED).min(GAME_HEIGHT - PADDLE_HEIGHT)
            }
            InputCommand::MouseMove { y, .. } => {
                *paddle = y.clamp(0.0, GAME_HEIGHT - PADDLE_HEIGHT)
            }
            // Horizontal movement and shooting belong to the other mode.
            InputCommand::Left | InputCommand::Right | InputCommand::Shoot => {}
        }
    }

    pub fn tick(&mut self) -> Option<MatchOutcome> {
        if !self.started || self.outcome.is_some() {
            return None;
        }

        self.advance_ball();
        self.check_paddles();
        self.check_scoring();
        self.outcome
    }

    fn advance_ball(&mut self) {
        let next_x = self.ball_x + self.vel_x;
        let mut next_y = self.ball_y + self.vel_y;

        // Wall bounce inverts the perpendicular component.
        if next_y - BALL_SIZE / 2.0 <= 0.0 {
            next_y = BALL_SIZE / 2.0;
            self.vel_y = self.vel_y.abs();
        } else if next_y + BALL_SIZE / 2.0 >= GAME_HEIGHT {
            next_y = GAME_HEIGHT - BALL_SIZE / 2.0;
            self.vel_y = -self.vel_y.abs();
        }

        self.ball_x = next_x;
        self.ball_y = next_y;
    }

    fn check_paddles(&mut self) {
        let ball_left = self.ball_x - BALL_SIZE / 2.0;
        let ball_right = self.ball_x + BALL_SIZE / 2.0;
        let ball_top = self.ball_y - BALL_SIZE / 2.0;
        let ball_bottom = self.ball_y + BALL_SIZE / 2.0;

        if ball_left <= LEFT_PADDLE_X + PADDLE_WIDTH
            && ball_right >= LEFT_PADDLE_X
            && ball_top <= self.paddle1_y + PADDLE_HEIGHT
            && ball_bottom >= self.paddle1_y
            && self.vel_x < 0.0
        {
            self.ball_x = LEFT_PADDLE_X + PADDLE_WIDTH + BALL_SIZE / 2.0;
            self.reflect_off_paddle(self.paddle1_y, true);
        }

        if ball_right >= RIGHT_PADDLE_X
            && ball_left <= RIGHT_PADDLE_X + PADDLE_WIDTH
            && ball_top <= self.paddle2_y + PADDLE_HEIGHT
            && ball_bottom >= self.paddle2_y
            && self.vel_x > 0.0
        {
            self.ball_x = RIGHT_PADDLE_X - BALL_SIZE / 2.0;
            self.reflect_off_paddle(self.paddle2_y, false);
        }
    }

    fn reflect_off_paddle(&mut self, paddle_y: f32, left_paddle: bool) {
        // Contact offset along the paddle decides the rebound angle.
        let relative_hit =
            ((self.ball_y - (paddle_y + PADDLE_HEIGHT / 2.0)) / (PADDLE_HEIGHT / 2.0))
                .clamp(-1.0, 1.0);
        let angle = relative_hit * MAX_BOUNCE_ANGLE;

        let current_speed = self.vel_x.hypot(self.vel_y);
        let new_speed = (current_speed + BALL_SPEEDUP).min(MAX_BALL_SPEED);

        let direction = if left_paddle { 1.0 } else { -1.0 };
        self.vel_x = direction * (new_speed * angle.cos()).abs();
        self.vel_y = new_speed * angle.sin();
    }

    fn check_scoring(&mut self) {
        let scored = if self.ball_x <= 0.0 {
            self.score.1 += 1;
            true
        } else if self.ball_x >= GAME_WIDTH {
            self.score.0 += 1;
            true
        } else {
            false
        };

        if !scored {
            return;
        }

        if round_won(self.score) {
            if self.score.0 > self.score.1 {
                self.rounds.0 += 1;
            } else {
                self.rounds.1 += 1;
            }
            self.total_points.0 += self.score.0;
            self.total_points.1 += self.score.1;
            self.score = (0, 0);

            if self.rounds.0 >= ROUNDS_TO_WIN || self.rounds.1 >= ROUNDS_TO_WIN {
                let winner = if self.rounds.0 > self.rounds.1 {
                    PlayerSlot::One
                } else {
                    PlayerSlot::Two
                };
                self.outcome = Some(MatchOutcome {
                    winner,
                    score: self.total_points,
                });
                return;
            }
        }

        self.reset_ball();
    }

    fn reset_ball(&mut self) {
        self.ball_x = GAME_WIDTH / 2.0;
        self.ball_y = GAME_HEIGHT / 2.0;
        let (vel_x, vel_y) = serve_velocity(&mut self.rng);
        self.vel_x = vel_x;
        self.vel_y = vel_y;
    }

    pub fn snapshot(&self, players: &[String; 2]) -> PongSnapshot {
        PongSnapshot {
            game_started: self.started,
            game_over: self.outcome.is_some(),
            player1: players[0].clone(),
            player2: players[1].clone(),
            paddle1_y: self.paddle1_y,
            paddle2_y: self.paddle2_y,
            ball_x: self.ball_x,
            ball_y: self.ball_y,
            score1: self.score.0,
            score2: self.score.1,
            rounds1: self.rounds.0,
            rounds2: self.rounds.1,
            winner: self
                .outcome
                .map(|o| players[o.winner.index()].clone()),
        }
    }
}

fn round_won(score: (u32, u32)) -> bool {
    let (a, b) = score;
    let (hi, lo) = if a > b { (a, b) } else { (b, a) };
    hi >= ROUND_TARGET && hi - lo >= ROUND_LEAD
}

fn serve_velocity(rng: &mut SeededRng) -> (f32, f32) {
    let direction = if rng.next_bool() { 1.0 } else { -1.0 };
    let vel_x = INITIAL_BALL_SPEED * direction;
    let vel_y = INITIAL_BALL_SPEED * rng.range_f32(-1.0, 1.0);
    (vel_x, vel_y)
}
