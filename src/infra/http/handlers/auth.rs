use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::application::auth::TokenPair;
use crate::infra::http::error::ApiError;
use crate::infra::http::state::AppState;

use super::{REFRESH_COOKIE, SignInRequest, SignUpRequest, TokenResponse, UserResponse};

pub async fn sign_up(
    State(state): State<AppState>,
    Json(payload): Json<SignUpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .sessions
        .sign_up(&payload.name, &payload.email, &payload.password)
        .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

pub async fn sign_in(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<SignInRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pair = state
        .sessions
        .sign_in(&payload.email, &payload.password)
        .await?;

    Ok(issue(&state, jar, pair))
}

/// Rotate the refresh token carried in the cookie.
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .ok_or_else(|| ApiError::unauthorized("Refresh token cookie required"))?;

    let pair = state.sessions.refresh_tokens(&token).await?;

    Ok(issue(&state, jar, pair))
}

fn issue(state: &AppState, jar: CookieJar, pair: TokenPair) -> (CookieJar, Json<TokenResponse>) {
    let cookie = refresh_cookie(pair.refresh_token, state.sessions.issuer().refresh_ttl());
    (
        jar.add(cookie),
        Json(TokenResponse {
            token: pair.access_token,
        }),
    )
}

fn refresh_cookie(token: String, ttl: std::time::Duration) -> Cookie<'static> {
    let max_age = time::Duration::seconds(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX));

    Cookie::build((REFRESH_COOKIE, token))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(max_age)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_cookie_is_http_only_and_scoped_to_root() {
        let cookie = refresh_cookie("abc".to_string(), std::time::Duration::from_secs(60));

        assert_eq!(cookie.name(), REFRESH_COOKIE);
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(60)));
    }
}
