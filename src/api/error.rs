//! Unified API error handling.
//!
//! Every handler failure is rendered as the same JSON envelope:
//! `{"error": {"code", "message", "details"?}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::scheduler::{ErrorCategory, SchedulingError};

/// Error codes for API responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Client errors (4xx)
    BadRequest,
    Unauthorized,
    Forbidden,
    NotApprovedStudent,
    NotFound,
    ValidationError,
    InvalidTimeRange,
    InvalidRating,
    ProfileIncomplete,
    CancellationWindowClosed,
    LessonNotCompleted,
    InsufficientCredits,
    SlotUnavailable,
    ReviewAlreadyExists,
    AlreadyTerminal,

    // Server errors (5xx)
    InternalError,
    ServiceUnavailable,
    DatabaseError,
    ExternalServiceError,
}

impl ErrorCode {
    /// Get the default HTTP status code for this error code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::BadRequest
            | ErrorCode::ValidationError
            | ErrorCode::InvalidTimeRange
            | ErrorCode::InvalidRating
            | ErrorCode::ProfileIncomplete
            | ErrorCode::CancellationWindowClosed
            | ErrorCode::LessonNotCompleted
            | ErrorCode::InsufficientCredits => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden | ErrorCode::NotApprovedStudent => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::SlotUnavailable
            | ErrorCode::ReviewAlreadyExists
            | ErrorCode::AlreadyTerminal => StatusCode::CONFLICT,
            ErrorCode::InternalError | ErrorCode::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::ExternalServiceError => StatusCode::BAD_GATEWAY,
        }
    }

    /// Get the string representation of the error code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "bad_request",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::NotApprovedStudent => "not_approved_student",
            ErrorCode::NotFound => "not_found",
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::InvalidTimeRange => "invalid_time_range",
            ErrorCode::InvalidRating => "invalid_rating",
            ErrorCode::ProfileIncomplete => "profile_incomplete",
            ErrorCode::CancellationWindowClosed => "cancellation_window_closed",
            ErrorCode::LessonNotCompleted => "lesson_not_completed",
            ErrorCode::InsufficientCredits => "insufficient_credits",
            ErrorCode::SlotUnavailable => "slot_unavailable",
            ErrorCode::ReviewAlreadyExists => "review_already_exists",
            ErrorCode::AlreadyTerminal => "already_terminal",
            ErrorCode::InternalError => "internal_error",
            ErrorCode::ServiceUnavailable => "service_unavailable",
            ErrorCode::DatabaseError => "database_error",
            ErrorCode::ExternalServiceError => "external_service_error",
        }
    }
}

/// The inner error object in the response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, serde_json::Value>>,
}

/// The full error response envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Unified API error type
#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    status: StatusCode,
    message: String,
    details: Option<HashMap<String, serde_json::Value>>,
}

impl ApiError {
    /// Create a new API error with a specific code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status_code(),
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attach one detail entry
    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details
            .get_or_insert_with(HashMap::new)
            .insert(key.to_string(), value.into());
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Bad request error (400)
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    /// Unauthorized error (401) - caller identity missing or unverifiable
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// Not found error (404)
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Service unavailable error (503)
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let response = ErrorResponse {
            error: ErrorBody {
                code: self.code.as_str().to_string(),
                message: self.message,
                details: self.details,
            },
        };

        (self.status, Json(response)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<SchedulingError> for ApiError {
    fn from(err: SchedulingError) -> Self {
        let code = match &err {
            SchedulingError::InvalidTimeRange(_) => ErrorCode::InvalidTimeRange,
            SchedulingError::InvalidRating(_) => ErrorCode::InvalidRating,
            SchedulingError::Validation(_) => ErrorCode::ValidationError,
            SchedulingError::ProfileIncomplete { .. } => ErrorCode::ProfileIncomplete,
            SchedulingError::CancellationWindowClosed { .. } => ErrorCode::CancellationWindowClosed,
            SchedulingError::LessonNotCompleted => ErrorCode::LessonNotCompleted,
            SchedulingError::SlotUnavailable => ErrorCode::SlotUnavailable,
            SchedulingError::ReviewAlreadyExists => ErrorCode::ReviewAlreadyExists,
            SchedulingError::AlreadyTerminal(_) => ErrorCode::AlreadyTerminal,
            SchedulingError::InsufficientCredits => ErrorCode::InsufficientCredits,
            SchedulingError::NotApprovedStudent => ErrorCode::NotApprovedStudent,
            SchedulingError::Forbidden(_) => ErrorCode::Forbidden,
            SchedulingError::NotFound(_) => ErrorCode::NotFound,
            SchedulingError::Transient { .. } => ErrorCode::ServiceUnavailable,
            SchedulingError::Collaborator(_) => ErrorCode::ExternalServiceError,
            SchedulingError::Database(_) if err.is_transient() => ErrorCode::ServiceUnavailable,
            SchedulingError::Database(_) => ErrorCode::DatabaseError,
        };

        if err.category() == ErrorCategory::Internal {
            tracing::error!(error = %err, "Request failed");
            // Storage and collaborator internals stay out of responses
            let message = match code {
                ErrorCode::ExternalServiceError => "A directory service is unavailable",
                _ => "An internal error occurred",
            };
            return ApiError::new(code, message);
        }

        tracing::debug!(code = code.as_str(), error = %err, "Request rejected");
        let api_error = ApiError::new(code, err.to_string());
        match err {
            SchedulingError::ProfileIncomplete { missing } => {
                api_error.with_detail("missing_fields", missing)
            }
            SchedulingError::CancellationWindowClosed { hours } => {
                api_error.with_detail("window_hours", hours)
            }
            SchedulingError::AlreadyTerminal(status) => {
                api_error.with_detail("status", status.as_str())
            }
            SchedulingError::Transient { attempts } => api_error.with_detail("attempts", attempts),
            _ => api_error,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        SchedulingError::from(err).into()
    }
}
