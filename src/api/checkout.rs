//! Check-out and check-in endpoints

use axum::{extract::State, Json};

use crate::{
    error::AppResult,
    models::{
        checkout::{BatchCheckoutReport, BatchCheckoutRequest, CheckinReceipt, CheckinRequest, CheckoutRequest},
        Tool,
    },
    AppState,
};

/// Check a tool out to a user
#[utoipa::path(
    post,
    path = "/checkout",
    tag = "lifecycle",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Tool checked out", body = Tool),
        (status = 404, description = "Tool or user not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Tool not available or overdue for calibration", body = crate::error::ErrorResponse)
    )
)]
pub async fn check_out(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> AppResult<Json<Tool>> {
    let tool = state
        .services
        .lifecycle
        .check_out(&request.user_id, &request.tool_id)
        .await?;
    Ok(Json(tool))
}

/// Check out several tools; each is reported independently
#[utoipa::path(
    post,
    path = "/checkout/batch",
    tag = "lifecycle",
    request_body = BatchCheckoutRequest,
    responses(
        (status = 200, description = "Partitioned outcome", body = BatchCheckoutReport),
        (status = 400, description = "Empty tool list", body = crate::error::ErrorResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn batch_check_out(
    State(state): State<AppState>,
    Json(request): Json<BatchCheckoutRequest>,
) -> AppResult<Json<BatchCheckoutReport>> {
    let report = state
        .services
        .lifecycle
        .batch_check_out(&request.user_id, &request.tool_ids)
        .await?;
    Ok(Json(report))
}

/// Return a tool, optionally flagging it for maintenance
#[utoipa::path(
    post,
    path = "/checkin",
    tag = "lifecycle",
    request_body = CheckinRequest,
    responses(
        (status = 200, description = "Tool checked in", body = CheckinReceipt),
        (status = 409, description = "Tool not checked out", body = crate::error::ErrorResponse)
    )
)]
pub async fn check_in(
    State(state): State<AppState>,
    Json(request): Json<CheckinRequest>,
) -> AppResult<Json<CheckinReceipt>> {
    let receipt = state
        .services
        .lifecycle
        .check_in(&request.tool_id, request.report_issue)
        .await?;
    Ok(Json(receipt))
}
