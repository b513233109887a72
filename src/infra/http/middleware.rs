use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

use super::error::ApiError;
use super::state::AppState;

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

/// User id taken from a verified access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub i64);

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

/// Reject requests without a valid `Authorization: Bearer` access token.
///
/// The user id is inserted into both the request and the response extensions
/// so the response logger can report it.
pub async fn require_access_token(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = extract_bearer(request.headers().get(header::AUTHORIZATION)) else {
        return ApiError::unauthorized("Bearer access token required").into_response();
    };

    let user = match state.sessions.parse_access_token(token) {
        Ok(user_id) => AuthenticatedUser(user_id),
        Err(err) => return ApiError::from(err).into_response(),
    };

    request.extensions_mut().insert(user);
    let mut response = next.run(request).await;
    response.extensions_mut().insert(user);
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let user_id = response
            .extensions()
            .get::<AuthenticatedUser>()
            .map(|user| user.0.to_string())
            .unwrap_or_default();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "quaderno::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                user_id = user_id,
                "request failed",
            );
        } else {
            warn!(
                target = "quaderno::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                request_id = request_id,
                user_id = user_id,
                "client request error",
            );
        }
    }

    response
}

fn extract_bearer(header: Option<&HeaderValue>) -> Option<&str> {
    let raw = header?.to_str().ok()?;
    let token = raw.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_prefix_is_required() {
        let value = HeaderValue::from_static("Bearer abc.def.ghi");
        assert_eq!(extract_bearer(Some(&value)), Some("abc.def.ghi"));

        let basic = HeaderValue::from_static("Basic Zm9vOmJhcg==");
        assert_eq!(extract_bearer(Some(&basic)), None);

        let empty = HeaderValue::from_static("Bearer ");
        assert_eq!(extract_bearer(Some(&empty)), None);
        assert_eq!(extract_bearer(None), None);
    }
}
