// Framework bootstrap for the session server runtime.

use crate::frameworks::config;
use crate::interface_adapters::clients::store::MatchStoreClient;
use crate::interface_adapters::net::{game_ws_handler, healthz_handler, matchmaking_ws_handler};
use crate::interface_adapters::state::AppState;
use crate::use_cases::{ActivePlayers, MatchStore, Matchmaker, NoopStore, SessionRegistry};

use axum::{Router, routing::get};
use std::io::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

pub async fn run(listener: tokio::net::TcpListener) -> Result<()> {
    let address = listener.local_addr()?;
    // build state
    let state = build_state()?;
    // Start the Web Server
    let app = Router::new()
        .route("/ws/matchmaking", get(matchmaking_ws_handler))
        .route("/ws/game/{game_id}", get(game_ws_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(state);

    tracing::info!(%address, "listening");

    // Serve app and report errors rather than panicking
    axum::serve(listener, app).await.inspect_err(|e| {
        tracing::error!(error = %e, "server error");
    })
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let address = SocketAddr::from(([127, 0, 0, 1], config::http_port()));

    // Bind TCP listener with error handling
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    run(listener).await
}

fn build_state() -> Result<Arc<AppState>> {
    let store: Arc<dyn MatchStore> = match config::store_service_url() {
        Some(base_url) => {
            let timeout = config::store_timeout();
            let client = MatchStoreClient::new(base_url.clone(), timeout).map_err(|e| {
                std::io::Error::other(format!("failed to initialize store client: {e}"))
            })?;
            tracing::debug!(
                store_base_url = %base_url,
                store_timeout_ms = timeout.as_millis(),
                "result store client configured"
            );
            Arc::new(client)
        }
        None => {
            tracing::info!("no result store configured; match records are not persisted");
            Arc::new(NoopStore)
        }
    };

    // The active-player set is shared between matchmaking and the registry.
    let active = ActivePlayers::new();
    let registry = Arc::new(SessionRegistry::new(
        config::session_settings(),
        store,
        active,
    ));

    Ok(Arc::new(AppState {
        matchmaker: Mutex::new(Matchmaker::new()),
        registry,
    }))
}
