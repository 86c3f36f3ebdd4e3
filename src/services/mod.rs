/// OpenAPI documentation generation.
pub mod documentation;
/// Session engine actor owning players and sessions.
pub mod engine;
/// Outbound transport abstraction used by the engine.
pub mod gateway;
/// Health check service.
pub mod health_service;
/// Letter verification and word scrambling.
pub mod letters;
/// Pairing selection and the periodic matchmaking scheduler.
pub mod matchmaking;
/// Deadline winner determination.
pub mod outcome;
/// WebSocket connection and message handling service.
pub mod websocket_service;
