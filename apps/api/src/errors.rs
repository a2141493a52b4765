use std::sync::OnceLock;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::analysis::contract::ContractError;
use crate::analysis::resolver::ModelResolutionError;
use crate::db::StoreError;
use crate::extraction::ExtractionError;

static DIAGNOSTICS: OnceLock<bool> = OnceLock::new();

/// Enables `details` in error bodies. Called once at startup; off unless enabled.
pub fn enable_diagnostics(enabled: bool) {
    let _ = DIAGNOSTICS.set(enabled);
}

fn diagnostics_enabled() -> bool {
    DIAGNOSTICS.get().copied().unwrap_or(false)
}

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Model resolution error: {0}")]
    ModelResolution(#[from] ModelResolutionError),

    #[error("{0}")]
    Contract(#[from] ContractError),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication required".to_string(),
            ),
            AppError::Extraction(e) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "EXTRACTION_ERROR",
                e.to_string(),
            ),
            AppError::ModelResolution(e) => {
                tracing::error!("Model resolution error: {e}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "MODEL_RESOLUTION_ERROR",
                    "No AI model is currently available".to_string(),
                )
            }
            AppError::Contract(e @ ContractError::MalformedResponse { .. }) => {
                tracing::error!("Malformed model response: {e:?}");
                (
                    StatusCode::BAD_GATEWAY,
                    "MALFORMED_RESPONSE",
                    "The AI returned a response that could not be read".to_string(),
                )
            }
            AppError::Contract(ContractError::SchemaViolation { field, .. }) => {
                tracing::error!("Model response schema violation: {self}");
                (
                    StatusCode::BAD_GATEWAY,
                    "SCHEMA_VIOLATION",
                    format!("The AI returned an incomplete analysis ({field})"),
                )
            }
            AppError::Llm(msg) => {
                tracing::error!("LLM error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "LLM_ERROR",
                    "An AI processing error occurred".to_string(),
                )
            }
            AppError::Persistence(e) => {
                tracing::error!("Persistence error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "PERSISTENCE_ERROR",
                    "The analysis could not be saved".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if diagnostics_enabled() && status.is_server_error() {
            error["details"] = json!(format!("{self:?}"));
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_per_kind() {
        let cases = [
            (
                AppError::Validation("jobDescription is required".into()),
                StatusCode::BAD_REQUEST,
            ),
            (AppError::Unauthorized, StatusCode::UNAUTHORIZED),
            (
                AppError::Extraction(ExtractionError::NoText),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                AppError::ModelResolution(ModelResolutionError {
                    fallbacks: vec![],
                    skipped: vec![],
                }),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::Contract(ContractError::SchemaViolation {
                    field: "interviewQuestions",
                    reason: "expected exactly 5 items, got 4".into(),
                }),
                StatusCode::BAD_GATEWAY,
            ),
            (
                AppError::Persistence(StoreError::MissingOwner),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
