use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status (always "ok" while the process serves requests).
    pub status: String,
    /// Route tokens currently bound in the connection router.
    pub routes: Vec<String>,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(routes: Vec<String>) -> Self {
        Self {
            status: "ok".to_string(),
            routes,
        }
    }
}
