use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Word Duel Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::ServerMessage,
            crate::dto::ws::PlayerJoinRequest,
            crate::dto::ws::WordSubmitRequest,
            crate::dto::common::PlayerSummary,
            crate::dto::common::LetterResult,
            crate::dto::common::ProgressSummary,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "players", description = "WebSocket protocol for matchmaking and sessions"),
    )
)]
pub struct ApiDoc;
