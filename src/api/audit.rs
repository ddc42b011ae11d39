//! Request/response audit records and the last-resort panic response

use axum::{
    Json,
    extract::{ConnectInfo, Request},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::any::Any;
use std::net::SocketAddr;
use tracing::{error, info};
use uuid::Uuid;

use crate::logging::panic_message;

/// Logs every request on arrival and again once its response is built.
pub async fn log_request(request: Request, next: Next) -> Response {
    let request_id = Uuid::now_v7();
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    info!(
        "[{}] Received {} request to {} from {}",
        request_id,
        request.method(),
        request.uri().path(),
        client
    );

    let response = next.run(request).await;

    info!(
        "[{}] Sent response with status {}",
        request_id,
        response.status()
    );
    response
}

/// Turns a panic inside a handler into a 500 instead of a dropped connection.
pub fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    error!(
        "Unhandled panic while serving request: {}",
        panic_message(panic.as_ref())
    );

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error" })),
    )
        .into_response()
}
