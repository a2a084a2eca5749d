// Use cases layer: application workflows for the session server.

pub mod matchmaking;
pub mod registry;
pub mod session;
pub mod store;
pub mod types;

pub use matchmaking::{
    ActivePlayers, JoinOutcome, MatchNotice, Matchmaker, MatchmakingError, Ticket,
};
pub use registry::{AttachGrant, RegistryError, SessionHandle, SessionRegistry};
pub use session::{SessionContext, session_task};
pub use store::{MatchStore, NoopStore, StoreError};
pub use types::{SessionCommand, SessionEvent, SessionPhase, SessionSettings};
