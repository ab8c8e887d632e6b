use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Failures talking to WeChat Pay.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Gateway configuration error: {0}")]
    Config(String),

    #[error("Gateway transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Malformed gateway payload: {0}")]
    MalformedPayload(String),

    #[error("Gateway signature mismatch")]
    InvalidSignature,

    #[error("Gateway rejected request: {0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Corrupt transaction record {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Transaction {0} not found")]
    NotFound(u64),
}

/// Why a reconciliation attempt produced no outcome.
///
/// "Not paid yet" is not an error; it is `ReconcileOutcome::NotConfirmed`.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Gateway unavailable: {0}")]
    Transport(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<GatewayError> for ReconcileError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::MalformedPayload(_) | GatewayError::InvalidSignature => {
                ReconcileError::MalformedPayload(err.to_string())
            }
            GatewayError::Config(_) | GatewayError::Transport(_) | GatewayError::Rejected(_) => {
                ReconcileError::Transport(err.to_string())
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error("No checkout order in this session")]
    NoActiveOrder,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl From<ReconcileError> for CheckoutError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Validation(msg) => CheckoutError::Validation(msg),
            ReconcileError::Store(e) => CheckoutError::Store(e),
            other => CheckoutError::InternalError(other.to_string()),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub request_id: String,
}

impl IntoResponse for CheckoutError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();

        let (status, error_code) = match &self {
            CheckoutError::NoActiveOrder => (StatusCode::NOT_FOUND, "NO_ACTIVE_ORDER"),
            CheckoutError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            CheckoutError::Validation(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_FAILED")
            }
            CheckoutError::Gateway(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            error_code: error_code.to_string(),
            timestamp: Utc::now(),
            request_id,
        };

        tracing::error!(
            error = ?self,
            error_code = error_code,
            "Request failed"
        );

        (status, Json(body)).into_response()
    }
}
