//! Webhook handler for push notifications

use axum::{
    Json,
    body::Bytes,
    extract::State as AxumState,
    extract::rejection::BytesRejection,
    http::HeaderMap,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::SharedState;
use crate::error::{ApiError, ValidationError};
use crate::utils::{SIGNATURE_HEADER, verify_signature};
use crate::webhook::WebhookEvent;

/// Handles `POST /webhook`: validate, run the deployment script, relay its output.
pub async fn handle_webhook(
    AxumState(state): AxumState<SharedState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Value>, ApiError> {
    info!("Received new webhook request");

    let body = body.map_err(|e| {
        error!("Could not read request body: {}", e);
        ValidationError::InvalidBody
    })?;

    if let Some(secret) = state.config.secret() {
        let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        match signature {
            Some(signature) if verify_signature(secret, &body, signature) => {}
            Some(_) => {
                error!("Signature verification failed");
                return Err(ApiError::Unauthorized);
            }
            None => {
                error!(
                    "Webhook secret is configured, but no {} header supplied",
                    SIGNATURE_HEADER
                );
                return Err(ApiError::Unauthorized);
            }
        }
    }

    let event =
        WebhookEvent::from_body(&body, state.config.script.action).map_err(|e| {
            match &e {
                ValidationError::InvalidBody => error!("Received invalid JSON data"),
                ValidationError::MissingParameters { missing } => {
                    error!("Missing required parameters: {}", missing.join(", "))
                }
            }
            e
        })?;

    info!(
        "Received data: owner_name={}, app_name={}, action={}",
        event.owner_name, event.app_name, event.action
    );
    debug!("{:#}", event.raw_payload);
    info!(
        "Running deployment for application '{}' of owner '{}'",
        event.app_name, event.owner_name
    );

    // Run on its own task: a panic inside the dispatcher becomes a join
    // error here, and a dropped client connection does not stop the script.
    let dispatcher = Arc::clone(&state.dispatcher);
    let result = tokio::spawn(async move { dispatcher.dispatch(&event).await })
        .await
        .map_err(|e| {
            let err = anyhow::Error::new(e).context("deployment task failed");
            error!("Unhandled error: {:?}", err);
            ApiError::Internal(err)
        })?
        .map_err(|e| {
            error!("Deployment could not run: {}", e);
            ApiError::Dispatch(e)
        })?;

    if result.success() {
        let message = result.stdout.trim();
        info!("Command completed successfully: {}", message);
        Ok(Json(json!({ "message": message })))
    } else {
        let stderr = result.stderr.trim().to_string();
        error!(
            "Command failed with exit code {}: {}",
            result.exit_code, stderr
        );
        Err(ApiError::CommandFailed(stderr))
    }
}
