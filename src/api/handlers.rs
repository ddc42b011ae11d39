use tracing::info;

pub const LIVENESS_MESSAGE: &str = "App Manager Webhook Service is running.";

/// Root liveness endpoint
pub async fn root() -> &'static str {
    info!("Liveness check on root route");
    LIVENESS_MESSAGE
}
