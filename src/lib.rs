//! Library crate for word-duel-back, exposing modules for binaries and integration tests.

/// Application configuration loading.
pub mod config;
/// Word corpus access.
pub mod dao;
/// Wire types for HTTP and WebSocket payloads.
pub mod dto;
/// Protocol and engine error types.
pub mod error;
/// HTTP route trees.
pub mod routes;
/// Engine, socket handling and supporting services.
pub mod services;
/// Presence, sessions and shared handler state.
pub mod state;
