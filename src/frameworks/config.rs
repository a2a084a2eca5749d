use crate::use_cases::SessionSettings;
use std::{env, time::Duration};

// Runtime/server constants (not gameplay tuning).

pub fn http_port() -> u16 {
    env::var("SESSION_SERVER_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000)
}

/// Base URL of the result-persistence service; unset means results are
/// accepted locally and dropped.
pub fn store_service_url() -> Option<String> {
    env::var("STORE_SERVICE_URL")
        .ok()
        .filter(|value| !value.trim().is_empty())
}

pub fn store_timeout() -> Duration {
    let millis = env::var("STORE_TIMEOUT_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(1500);
    Duration::from_millis(millis)
}

pub const COMMAND_CHANNEL_CAPACITY: usize = 256;
pub const EVENT_BROADCAST_CAPACITY: usize = 128;

pub const TICK_INTERVAL: Duration = Duration::from_millis(1000 / 60);
/// Absent players forfeit after this long.
pub const GRACE_PERIOD: Duration = Duration::from_secs(5);
/// Connections shorter than this are reported as link instability.
pub const UNSTABLE_LINK_THRESHOLD: Duration = Duration::from_secs(1);
/// Sessions cancel if both players never show up.
pub const WAITING_TIMEOUT: Duration = Duration::from_secs(30);

pub fn session_settings() -> SessionSettings {
    SessionSettings {
        command_channel_capacity: COMMAND_CHANNEL_CAPACITY,
        event_broadcast_capacity: EVENT_BROADCAST_CAPACITY,
        tick_interval: TICK_INTERVAL,
        grace_period: GRACE_PERIOD,
        unstable_link_threshold: UNSTABLE_LINK_THRESHOLD,
        waiting_timeout: WAITING_TIMEOUT,
    }
}
