use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::Result,
    middleware::json::AppJson,
    models::{
        auth::AuthenticatedUser,
        report::{CreateReportRequest, PatchReportRequest, ReportPage, ReportQuery},
    },
    services::reports::ReportService,
    AppState,
};

pub async fn list_reports(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ReportQuery>,
) -> Result<Json<ReportPage>> {
    let page = ReportService::list(state.store.as_ref(), &state.images, &user, &query).await?;
    Ok(Json(page))
}

pub async fn create_reports(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    AppJson(body): AppJson<CreateReportRequest>,
) -> Result<(StatusCode, Json<Vec<i64>>)> {
    let ids = ReportService::create(
        state.store.as_ref(),
        &state.images,
        &state.notifications,
        &user,
        body,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(ids)))
}

/// `{"read_people": ...}` marks the report read for the caller; any other
/// body updates the report.
pub async fn patch_report(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    AppJson(body): AppJson<Value>,
) -> Result<Response> {
    match PatchReportRequest::from_body(body)? {
        PatchReportRequest::MarkRead => {
            ReportService::mark_read(state.store.as_ref(), &user, id).await?;
            Ok(Json(json!({ "message": "Success Check Read" })).into_response())
        }
        PatchReportRequest::Update(req) => {
            let view =
                ReportService::update(state.store.as_ref(), &state.images, &user, id, req).await?;
            Ok(Json(view).into_response())
        }
    }
}

pub async fn delete_report(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    ReportService::delete(state.store.as_ref(), &state.images, id).await?;
    Ok(Json(json!({ "message": "성공적으로 삭제됐습니다." })))
}
