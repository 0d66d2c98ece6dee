use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
};

use crate::AppState;

/// Serves a stored report image. Paths that leave the media dir are 404s.
pub async fn serve_media(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, StatusCode> {
    let file_path = state.images.resolve(&path).ok_or(StatusCode::NOT_FOUND)?;

    let file_bytes = tokio::fs::read(&file_path)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;

    let content_type = mime_guess::from_path(&file_path)
        .first_raw()
        .unwrap_or("application/octet-stream");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, file_bytes.len().to_string())
        .header(header::CACHE_CONTROL, "private, max-age=86400")
        .body(Body::from(file_bytes))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
