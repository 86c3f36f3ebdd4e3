/// Payload pieces shared by several messages.
pub mod common;
/// Health check response.
pub mod health;
/// Custom field validators.
pub mod validation;
/// WebSocket protocol messages.
pub mod ws;
