use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::application::error::ErrorReport;
use crate::infra::http::state::AppState;

pub async fn health(State(state): State<AppState>) -> Response {
    let backend = state.health.backend();
    match state.health.check().await {
        Ok(()) => Json(json!({ "status": "ok", "backend": backend })).into_response(),
        Err(message) => {
            let mut response = (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "backend": backend })),
            )
                .into_response();
            ErrorReport::from_message(
                "infra::http::health",
                StatusCode::SERVICE_UNAVAILABLE,
                message,
            )
            .attach(&mut response);
            response
        }
    }
}
