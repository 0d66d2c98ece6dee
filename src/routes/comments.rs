use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::Result,
    middleware::json::AppJson,
    models::{
        auth::AuthenticatedUser,
        comment::{CommentQuery, CommentView, CreateCommentRequest},
    },
    services::comments::CommentService,
    AppState,
};

pub async fn list_comments(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<CommentQuery>,
) -> Result<Json<Vec<CommentView>>> {
    let comments = CommentService::list(state.store.as_ref(), &user, query.report).await?;
    Ok(Json(comments))
}

pub async fn create_comment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    AppJson(body): AppJson<CreateCommentRequest>,
) -> Result<(StatusCode, Json<CommentView>)> {
    let comment =
        CommentService::create(state.store.as_ref(), &state.notifications, &user, body).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    CommentService::delete(state.store.as_ref(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
