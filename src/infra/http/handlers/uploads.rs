use axum::Json;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum_extra::extract::cookie::CookieJar;
use bytes::Bytes;

use crate::infra::http::error::ApiError;
use crate::infra::http::state::AppState;

use super::REFRESH_COOKIE;

/// Accept a multipart `file` (and optional `comment`) for the user owning the
/// refresh-token cookie. The cookie is only looked up, never rotated.
pub async fn upload_file(
    State(state): State<AppState>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .ok_or_else(|| ApiError::unauthorized("Refresh token cookie required"))?;
    let author_id = state.sessions.user_id_by_token(&token).await?;

    let mut file: Option<(String, Bytes)> = None;
    let mut comment = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request("invalid multipart payload", Some(err.to_string())))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let file_name = field
                    .file_name()
                    .map(|name| name.to_string())
                    .ok_or_else(|| ApiError::bad_request("missing file name", None))?;
                let data = field.bytes().await.map_err(|err| {
                    ApiError::bad_request("failed to read upload", Some(err.to_string()))
                })?;
                file = Some((file_name, data));
            }
            Some("comment") => {
                comment = field.text().await.map_err(|err| {
                    ApiError::bad_request("failed to read comment", Some(err.to_string()))
                })?;
            }
            _ => {}
        }
    }

    let (file_name, data) = file.ok_or_else(|| ApiError::bad_request("missing file", None))?;

    let record = state
        .uploads
        .upload(author_id, &file_name, &comment, data)
        .await?;

    Ok((StatusCode::CREATED, Json(record)))
}
