//! Unified API error handling
//!
//! Every failure leaves the API as `{success: false, error, kind, ...}`. Schema
//! violations keep their per-field issues and parse failures keep the
//! candidate text, so clients can see exactly what the model got wrong.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use serde_json::{Value, json};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::service::batch::BatchError;
use crate::service::classification::ClassificationError;
use crate::service::comparison::{BranchFailure, ComparisonError};
use crate::service::decode::ParseFailure;
use crate::service::generation::GenerationError;
use crate::service::llm::ProviderError;
use crate::service::schema::{ValidationFailure, ValidationIssue};

/// Standard error response format
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Always false
    pub success: bool,
    /// Human-readable error message
    pub error: String,
    /// Error type/code
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<Value>,
    /// Per-field schema violations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issues: Option<Vec<ValidationIssue>>,
    /// Unique request ID for tracing
    pub request_id: String,
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ApiError {
    /// Malformed body or query (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Message must not be empty")]
    EmptyInput,

    /// Every batch message was rejected (400)
    #[error("No valid messages in batch")]
    NoValidMessages(Vec<String>),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Model output parsed but broke the ticket schema (422)
    #[error("Model output did not match the ticket schema: {0}")]
    Validation(ValidationFailure),

    /// Model output was not JSON (502)
    #[error("Model output was not valid JSON: {0}")]
    Parse(ParseFailure),

    #[error("{0}")]
    RateLimited(ProviderError),

    /// Any other provider failure (502)
    #[error("{0}")]
    Provider(ProviderError),

    /// Both comparison branches failed (502)
    #[error("Both comparison branches failed")]
    BothFailed {
        left: BranchFailure,
        right: BranchFailure,
    },
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::EmptyInput => "empty_input",
            ApiError::NoValidMessages(_) => "no_valid_messages",
            ApiError::NotFound(_) => "not_found",
            ApiError::Validation(_) => "validation_error",
            ApiError::Parse(_) => "parse_error",
            ApiError::RateLimited(_) => "rate_limited",
            ApiError::Provider(_) => "provider_error",
            ApiError::BothFailed { .. } => "comparison_failed",
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            ApiError::NoValidMessages(warnings) => Some(json!({ "warnings": warnings })),
            ApiError::Parse(failure) => Some(json!({
                "line": failure.line,
                "column": failure.column,
                "candidate": failure.candidate,
            })),
            ApiError::BothFailed { left, right } => Some(json!({ "left": left, "right": right })),
            _ => None,
        }
    }

    fn issues(&self) -> Option<Vec<ValidationIssue>> {
        match self {
            ApiError::Validation(failure) => Some(failure.issues.clone()),
            _ => None,
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::EmptyInput | ApiError::NoValidMessages(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Parse(_) | ApiError::Provider(_) | ApiError::BothFailed { .. } => {
                StatusCode::BAD_GATEWAY
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let kind = self.kind();

        if status.is_server_error() {
            tracing::error!(kind = kind, status = status.as_u16(), message = %self, "API error");
        } else {
            tracing::warn!(kind = kind, status = status.as_u16(), message = %self, "API error");
        }

        HttpResponse::build(status).json(ErrorResponse {
            success: false,
            error: self.to_string(),
            kind: kind.to_string(),
            details: self.details(),
            issues: self.issues(),
            request_id: Uuid::new_v4().to_string(),
        })
    }
}

// ============================================================================
// From conversions for service errors
// ============================================================================

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::RateLimited(_) => ApiError::RateLimited(err),
            _ => ApiError::Provider(err),
        }
    }
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::EmptyInput => ApiError::EmptyInput,
            GenerationError::Provider(e) => e.into(),
        }
    }
}

impl From<ClassificationError> for ApiError {
    fn from(err: ClassificationError) -> Self {
        match err {
            ClassificationError::Generation(e) => e.into(),
            ClassificationError::Parse(f) => ApiError::Parse(f),
            ClassificationError::Validation(f) => ApiError::Validation(f),
        }
    }
}

impl From<ComparisonError> for ApiError {
    fn from(err: ComparisonError) -> Self {
        match err {
            ComparisonError::EmptyInput => ApiError::EmptyInput,
            ComparisonError::BothFailed { left, right } => ApiError::BothFailed { left, right },
        }
    }
}

impl From<BatchError> for ApiError {
    fn from(err: BatchError) -> Self {
        match err {
            BatchError::NotFound(id) => ApiError::NotFound(format!("batch job {}", id)),
            BatchError::NoValidMessages { warnings } => ApiError::NoValidMessages(warnings),
        }
    }
}
