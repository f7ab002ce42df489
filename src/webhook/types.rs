//! Wire types for the change-event webhook and the HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Change-data-capture notification from the indexer.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeEvent {
    #[serde(default)]
    pub webhook_id: Option<String>,
    #[serde(default)]
    pub webhook_name: Option<String>,
    pub op: String,
    pub entity: String,
    pub data: ChangeData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeData {
    /// Row after the change; absent for deletes.
    #[serde(default)]
    pub new: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

impl ChangeOp {
    pub fn parse(op: &str) -> Option<Self> {
        match op.trim().to_ascii_uppercase().as_str() {
            "INSERT" => Some(ChangeOp::Insert),
            "UPDATE" => Some(ChangeOp::Update),
            "DELETE" => Some(ChangeOp::Delete),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AckResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn with_message(message: &str) -> Self {
        Self {
            success: true,
            message: Some(message.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub queue_size: usize,
    pub queue_pending: usize,
}

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("invalid webhook signature")]
    Authentication,
    #[error("invalid market id: {0}")]
    InvalidMarketId(String),
    #[error("failed to process webhook: {0}")]
    Processing(String),
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::Authentication => StatusCode::UNAUTHORIZED,
            WebhookError::InvalidMarketId(_) => StatusCode::BAD_REQUEST,
            WebhookError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "success": false,
            "error": self.to_string(),
        }));
        (self.status(), body).into_response()
    }
}
