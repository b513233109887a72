//! Request handlers grouped by resource.

mod auth;
mod health;
mod posts;
mod uploads;

pub use auth::*;
pub use health::*;
pub use posts::*;
pub use uploads::*;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::entities::UserRecord;

/// Name of the cookie carrying the opaque refresh token.
pub const REFRESH_COOKIE: &str = "refresh-token";

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub registered_at: OffsetDateTime,
}

impl From<UserRecord> for UserResponse {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            registered_at: user.registered_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub body: Option<String>,
}
