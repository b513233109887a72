use std::error::Error as StdError;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::auth::AuthError;
use crate::application::error::ErrorReport;
use crate::application::posts::PostError;
use crate::application::uploads::UploadError;
use crate::domain::error::ErrorKind;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const INVALID_CREDENTIALS: &str = "invalid_credentials";
    pub const INVALID_TOKEN: &str = "invalid_token";
    pub const EXPIRED: &str = "expired";
    pub const NOT_FOUND: &str = "not_found";
    pub const CONFLICT: &str = "conflict";
    pub const INTERNAL: &str = "internal_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    report: Option<ErrorReport>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
            report: None,
        }
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn unauthorized(message: &'static str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, codes::UNAUTHORIZED, message, None)
    }

    /// Build a response for a service error of the given kind.
    ///
    /// Client errors carry the error text as a hint. Internal errors only keep
    /// it in the attached report.
    pub fn from_service(source: &'static str, kind: ErrorKind, error: &dyn StdError) -> Self {
        let (status, code, message) = describe(kind);
        let hint = (kind != ErrorKind::Internal).then(|| error.to_string());
        Self {
            status,
            code,
            message,
            hint,
            report: Some(ErrorReport::from_error(source, status, error)),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

/// Status, code and public message for each error kind.
pub fn describe(kind: ErrorKind) -> (StatusCode, &'static str, &'static str) {
    match kind {
        ErrorKind::InvalidInput => (
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Request could not be processed",
        ),
        ErrorKind::InvalidCredentials => (
            StatusCode::UNAUTHORIZED,
            codes::INVALID_CREDENTIALS,
            "Invalid email or password",
        ),
        ErrorKind::InvalidToken => (
            StatusCode::UNAUTHORIZED,
            codes::INVALID_TOKEN,
            "Invalid access token",
        ),
        ErrorKind::Expired => (StatusCode::UNAUTHORIZED, codes::EXPIRED, "Token expired"),
        ErrorKind::NotFound => (
            StatusCode::NOT_FOUND,
            codes::NOT_FOUND,
            "Resource not found",
        ),
        ErrorKind::Conflict => (
            StatusCode::CONFLICT,
            codes::CONFLICT,
            "Resource already exists",
        ),
        ErrorKind::Internal => (
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::INTERNAL,
            "Internal server error",
        ),
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::from_service("infra::http::auth", err.kind(), &err)
    }
}

impl From<PostError> for ApiError {
    fn from(err: PostError) -> Self {
        Self::from_service("infra::http::posts", err.kind(), &err)
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        Self::from_service("infra::http::uploads", err.kind(), &err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let report = self.report.unwrap_or_else(|| {
            ErrorReport::from_message(
                "infra::http",
                self.status,
                format!(
                    "{}: {}",
                    self.code,
                    self.hint.as_deref().unwrap_or(self.message)
                ),
            )
        });
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        report.attach(&mut response);
        response
    }
}
