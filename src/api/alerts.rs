//! Alert endpoints

use axum::{extract::State, Json};

use crate::{error::AppResult, models::AlertReport, AppState};

/// Current overdue and long check-out tools, without notifying anyone
#[utoipa::path(
    get,
    path = "/alerts",
    tag = "alerts",
    responses(
        (status = 200, description = "Alert classification", body = AlertReport)
    )
)]
pub async fn get_alerts(State(state): State<AppState>) -> AppResult<Json<AlertReport>> {
    let report = state.services.alerts.classify().await?;
    Ok(Json(report))
}

/// Run an alert evaluation and send the notices that are due
#[utoipa::path(
    post,
    path = "/alerts/evaluate",
    tag = "alerts",
    responses(
        (status = 200, description = "Alert evaluation outcome", body = AlertReport)
    )
)]
pub async fn evaluate_alerts(State(state): State<AppState>) -> AppResult<Json<AlertReport>> {
    let report = state.services.alerts.evaluate().await?;
    Ok(Json(report))
}
