// Internal HTTP routes for operations probes.

use crate::interface_adapters::state::AppState;
use axum::{Json, extract::State};
use std::sync::Arc;

#[derive(Debug, serde::Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_sessions: usize,
    pub queued_players: usize,
}

pub async fn healthz_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let active_sessions = state.registry.session_count().await;
    let queued_players = state.matchmaker.lock().await.queued_count();
    Json(HealthResponse {
        status: "ok",
        active_sessions,
        queued_players,
    })
}
