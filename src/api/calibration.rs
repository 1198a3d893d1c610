//! Calibration calendar and forecast endpoints

use axum::{
    extract::{Query, State},
    Json,
};

use crate::{
    error::AppResult,
    models::tool::{CalendarQuery, CalibrationDay, CalibrationProposal, ProposalOutcome, ToolUsageStats},
    AppState,
};

/// Number of tools due for calibration per day of a month
#[utoipa::path(
    get,
    path = "/calibration/events",
    tag = "calibration",
    params(CalendarQuery),
    responses(
        (status = 200, description = "Due dates with counts", body = Vec<CalibrationDay>),
        (status = 400, description = "Invalid month", body = crate::error::ErrorResponse)
    )
)]
pub async fn calibration_events(
    State(state): State<AppState>,
    Query(query): Query<CalendarQuery>,
) -> AppResult<Json<Vec<CalibrationDay>>> {
    let days = state.services.tools.calibration_events(query).await?;
    Ok(Json(days))
}

/// Per-tool usage figures for the forecaster
#[utoipa::path(
    get,
    path = "/calibration/usage-stats",
    tag = "calibration",
    responses(
        (status = 200, description = "Usage statistics", body = Vec<ToolUsageStats>)
    )
)]
pub async fn usage_stats(State(state): State<AppState>) -> AppResult<Json<Vec<ToolUsageStats>>> {
    let stats = state.services.tools.usage_stats().await?;
    Ok(Json(stats))
}

/// Apply accepted calibration proposals
#[utoipa::path(
    post,
    path = "/calibration/proposals",
    tag = "calibration",
    request_body = Vec<CalibrationProposal>,
    responses(
        (status = 200, description = "Applied, skipped and missing proposals", body = ProposalOutcome)
    )
)]
pub async fn apply_proposals(
    State(state): State<AppState>,
    Json(proposals): Json<Vec<CalibrationProposal>>,
) -> AppResult<Json<ProposalOutcome>> {
    let outcome = state.services.tools.apply_calibration_proposals(proposals).await?;
    Ok(Json(outcome))
}
