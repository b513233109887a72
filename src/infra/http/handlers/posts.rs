use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::infra::http::error::ApiError;
use crate::infra::http::middleware::AuthenticatedUser;
use crate::infra::http::state::AppState;

use super::{CreatePostRequest, UpdatePostRequest};

pub async fn list_posts(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let posts = state.posts.list().await?;
    Ok(Json(posts))
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let post = state
        .posts
        .create(user_id, &payload.title, &payload.body)
        .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn get_post(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let post = state.posts.get(user_id, id).await?;
    Ok(Json(post))
}

pub async fn update_post(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let post = state
        .posts
        .update(
            user_id,
            id,
            payload.title.as_deref(),
            payload.body.as_deref(),
        )
        .await?;
    Ok(Json(post))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.posts.delete(user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
