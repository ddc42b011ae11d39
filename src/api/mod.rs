//! HTTP surface: liveness and webhook endpoints, wrapped in the request
//! audit log and a panic guard.

pub mod audit;
pub mod handlers;
pub mod webhook;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::catch_panic::CatchPanicLayer;

use crate::SharedState;

pub use handlers::{LIVENESS_MESSAGE, root};
pub use webhook::handle_webhook;

/// Build the application router.
///
/// The audit layer is outermost so that every response, including 404s
/// and recovered panics, gets its completion record.
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/webhook", post(handle_webhook))
        .with_state(state)
        .layer(CatchPanicLayer::custom(audit::handle_panic))
        .layer(middleware::from_fn(audit::log_request))
}
