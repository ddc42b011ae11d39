//! Webhook payload extraction and validation

use serde::Deserialize;
use serde_json::Value;
use std::fmt;

use crate::error::ValidationError;

/// The action passed to the deployment script.
///
/// Only one action exists today; it is an enum so that more can be added
/// without changing the dispatch contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Pull,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Pull => "pull",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data extracted from a push notification, scoped to a single request
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub owner_name: String,
    pub app_name: String,
    pub action: Action,
    /// Kept for logging only
    pub raw_payload: Value,
}

impl WebhookEvent {
    /// Parse a raw request body and extract the fields needed to dispatch.
    ///
    /// The owner comes from `repository.owner.name`, the application from
    /// `repository.name`. The action is never read from the payload.
    pub fn from_body(body: &[u8], action: Action) -> Result<Self, ValidationError> {
        let payload: Value =
            serde_json::from_slice(body).map_err(|_| ValidationError::InvalidBody)?;
        Self::from_payload(payload, action)
    }

    pub fn from_payload(payload: Value, action: Action) -> Result<Self, ValidationError> {
        match payload.as_object() {
            Some(map) if !map.is_empty() => {}
            _ => return Err(ValidationError::InvalidBody),
        }

        let owner_name = non_empty_string(payload.pointer("/repository/owner/name"));
        let app_name = non_empty_string(payload.pointer("/repository/name"));

        // `action` can only be empty if a future variant maps to "", but it
        // is checked alongside the payload fields all the same.
        let missing: Vec<&'static str> = [
            ("owner_name", owner_name.is_some()),
            ("app_name", app_name.is_some()),
            ("action", !action.as_str().is_empty()),
        ]
        .into_iter()
        .filter(|(_, present)| !present)
        .map(|(name, _)| name)
        .collect();

        match (owner_name, app_name) {
            (Some(owner_name), Some(app_name)) if missing.is_empty() => Ok(Self {
                owner_name,
                app_name,
                action,
                raw_payload: payload,
            }),
            _ => Err(ValidationError::MissingParameters { missing }),
        }
    }
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}
