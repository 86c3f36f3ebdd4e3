use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report engine counters, or a degraded payload when the engine stopped answering.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.engine.stats().await {
        Some(stats) => HealthResponse::ok(stats),
        None => {
            warn!("session engine unavailable (degraded mode)");
            HealthResponse::degraded()
        }
    }
}
