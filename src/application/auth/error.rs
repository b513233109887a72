use thiserror::Error;

use crate::application::repos::RepoError;
use crate::domain::error::{DomainError, ErrorKind};

use super::password::PasswordError;

/// Why an access token was refused. Only logged; callers see [`AuthError::InvalidToken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    Malformed,
    Signature,
    Algorithm,
    Expired,
    Subject,
}

impl TokenRejection {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenRejection::Malformed => "malformed",
            TokenRejection::Signature => "signature",
            TokenRejection::Algorithm => "algorithm",
            TokenRejection::Expired => "expired",
            TokenRejection::Subject => "subject",
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("an account with this email already exists")]
    EmailTaken,
    #[error("refresh token not found")]
    RefreshTokenNotFound,
    #[error("refresh token expired")]
    RefreshTokenExpired,
    #[error("invalid token")]
    InvalidToken(TokenRejection),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error("failed to sign access token: {0}")]
    Signing(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Validation(err) => err.kind(),
            AuthError::InvalidCredentials => ErrorKind::InvalidCredentials,
            AuthError::EmailTaken => ErrorKind::Conflict,
            AuthError::RefreshTokenNotFound => ErrorKind::NotFound,
            AuthError::RefreshTokenExpired => ErrorKind::Expired,
            AuthError::InvalidToken(_) => ErrorKind::InvalidToken,
            AuthError::Password(_) | AuthError::Signing(_) | AuthError::Repo(_) => {
                ErrorKind::Internal
            }
        }
    }
}
