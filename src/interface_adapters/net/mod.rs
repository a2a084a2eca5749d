// Network adapter modules split by client-facing sockets vs internal HTTP routes.

pub mod client;
pub mod internal;
pub mod queue;

pub use client::{game_ws_handler, spawn_session_serializer};
pub use internal::healthz_handler;
pub use queue::matchmaking_ws_handler;
