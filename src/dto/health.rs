use serde::Serialize;
use utoipa::ToSchema;

use crate::services::engine::EngineStats;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Players currently announced on a connection.
    pub online_players: usize,
    /// Players waiting for an opponent.
    pub pending_players: usize,
    /// Sessions currently forming or active.
    pub active_sessions: usize,
}

impl HealthResponse {
    /// Create a health response indicating the engine is operational.
    pub fn ok(stats: EngineStats) -> Self {
        Self {
            status: "ok".to_string(),
            online_players: stats.online_players,
            pending_players: stats.pending_players,
            active_sessions: stats.active_sessions,
        }
    }

    /// Create a health response indicating the engine stopped answering.
    pub fn degraded() -> Self {
        Self {
            status: "degraded".to_string(),
            online_players: 0,
            pending_players: 0,
            active_sessions: 0,
        }
    }
}
