use serde::Serialize;
use thiserror::Error;

/// Closed set of failure categories shared by every service.
///
/// Service errors expose `kind()` so callers branch on the category instead of
/// comparing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Expired,
    InvalidCredentials,
    InvalidInput,
    InvalidToken,
    Conflict,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Expired => "expired",
            ErrorKind::InvalidCredentials => "invalid_credentials",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::InvalidToken => "invalid_token",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("domain entity `{entity}` not found")]
    NotFound { entity: &'static str },
    #[error("domain validation failed: {message}")]
    Validation { message: String },
}

impl DomainError {
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::NotFound { .. } => ErrorKind::NotFound,
            DomainError::Validation { .. } => ErrorKind::InvalidInput,
        }
    }
}
