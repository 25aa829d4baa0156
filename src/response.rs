use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Clone)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
    is_operational: bool,
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn code_already_used() -> Self {
        Self::operational(
            StatusCode::BAD_REQUEST,
            "CODE_ALREADY_USED",
            "This code has already been used",
        )
    }

    pub fn code_expired() -> Self {
        Self::operational(StatusCode::BAD_REQUEST, "CODE_EXPIRED", "This code has expired")
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::TOO_MANY_REQUESTS, "TOO_MANY_REQUESTS", message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "UPSTREAM_FAILURE".to_string(),
            message: message.into(),
            is_operational: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".to_string(),
            message: message.into(),
            is_operational: false,
        }
    }

    fn operational(
        status: StatusCode,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            is_operational: true,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!(error = %err, "transfer storage query failed");
        Self::upstream("Failed to reach transfer storage")
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Internals are logged, never echoed back.
        let message = if self.is_operational {
            self.message
        } else {
            tracing::error!(code = %self.code, message = %self.message, "internal error");
            "Internal server error".to_string()
        };

        let body = ErrorResponse {
            error: message,
            code: self.code,
        };

        (self.status, Json(body)).into_response()
    }
}

pub fn json_error(
    status: StatusCode,
    code: impl Into<String>,
    message: impl Into<String>,
) -> AppError {
    AppError {
        status,
        code: code.into(),
        message: message.into(),
        is_operational: true,
    }
}
