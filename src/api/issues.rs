//! Issue report endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::issue::{CloseIssue, CreateIssue, IssueCreated, IssueQuery, IssueReport},
    AppState,
};

/// List issue reports
#[utoipa::path(
    get,
    path = "/issues",
    tag = "issues",
    params(IssueQuery),
    responses(
        (status = 200, description = "Issue reports, newest first", body = Vec<IssueReport>)
    )
)]
pub async fn list_issues(
    State(state): State<AppState>,
    Query(query): Query<IssueQuery>,
) -> AppResult<Json<Vec<IssueReport>>> {
    let issues = state.services.lifecycle.list_issues(query.status.as_deref()).await?;
    Ok(Json(issues))
}

/// Get an issue report
#[utoipa::path(
    get,
    path = "/issues/{id}",
    tag = "issues",
    params(("id" = String, Path, description = "Report ID")),
    responses(
        (status = 200, description = "Issue report", body = IssueReport),
        (status = 404, description = "Report not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_issue(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<IssueReport>> {
    let issue = state.services.lifecycle.get_issue(&id).await?;
    Ok(Json(issue))
}

/// Report a defect; the tool goes to maintenance
#[utoipa::path(
    post,
    path = "/issues",
    tag = "issues",
    request_body = CreateIssue,
    responses(
        (status = 201, description = "Issue reported", body = IssueCreated),
        (status = 400, description = "Missing fields", body = crate::error::ErrorResponse),
        (status = 404, description = "Tool not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn report_issue(
    State(state): State<AppState>,
    Json(request): Json<CreateIssue>,
) -> AppResult<(StatusCode, Json<IssueCreated>)> {
    let created = state.services.lifecycle.report_issue(request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Close (or reopen) an issue
#[utoipa::path(
    post,
    path = "/issues/{id}/close",
    tag = "issues",
    params(("id" = String, Path, description = "Report ID")),
    request_body = CloseIssue,
    responses(
        (status = 200, description = "Issue updated", body = IssueReport),
        (status = 404, description = "Report not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn close_issue(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CloseIssue>,
) -> AppResult<Json<IssueReport>> {
    let issue = state.services.lifecycle.close_issue(&id, request).await?;
    Ok(Json(issue))
}
