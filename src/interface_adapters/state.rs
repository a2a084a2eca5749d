use crate::use_cases::{Matchmaker, SessionRegistry};
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct AppState {
    // Queue state; held across pairing so claims cannot race.
    pub matchmaker: Mutex<Matchmaker>,
    // Owns the set of active session tasks.
    pub registry: Arc<SessionRegistry>,
}
