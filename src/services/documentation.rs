use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Pub Quiz Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::channel::read_channel,
        crate::routes::channel::post_channel,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::game::PlayerSummary,
            crate::dto::game::PlayerUpdate,
            crate::dto::game::GameStatusResponse,
            crate::dto::ws::StatusMessage,
            crate::dto::ws::AdminCommand,
            crate::dto::ws::JoinRequest,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "channels", description = "Route-token channels for the big screen, players and the admin console"),
    )
)]
pub struct ApiDoc;
