/// Live sockets and broadcast groups.
pub mod hub;
/// Player presence.
pub mod registry;
/// Matched sessions and their progress.
pub mod session;
/// Session lifecycle transitions.
pub mod state_machine;

use std::sync::Arc;

use crate::services::engine::EngineHandle;

pub use self::hub::ConnectionHub;

/// Handle to [`AppState`] shared across handlers.
pub type SharedState = Arc<AppState>;

/// State shared by the HTTP and WebSocket handlers.
///
/// Game state itself lives in the engine task; handlers only talk to it through
/// [`EngineHandle`] and push frames through the [`ConnectionHub`].
pub struct AppState {
    /// Mailbox of the session engine.
    pub engine: EngineHandle,
    /// Live sockets and broadcast groups.
    pub hub: Arc<ConnectionHub>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(engine: EngineHandle, hub: Arc<ConnectionHub>) -> SharedState {
        Arc::new(Self { engine, hub })
    }
}
