//! Identity bridge endpoints used by NFC readers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::scan::{DeviceQuery, ResolveRequest, ResolvedIdentity, Scan, ScanRequest, SessionEndRequest},
    AppState,
};

/// Submit a badge scan
#[utoipa::path(
    post,
    path = "/nfc/scan",
    tag = "nfc",
    request_body = ScanRequest,
    responses(
        (status = 200, description = "Badge accepted", body = Scan),
        (status = 400, description = "Malformed UID", body = crate::error::ErrorResponse),
        (status = 404, description = "Access denied: unknown tag", body = crate::error::ErrorResponse)
    )
)]
pub async fn scan(State(state): State<AppState>, Json(request): Json<ScanRequest>) -> AppResult<Json<Scan>> {
    let scan = state
        .services
        .scans
        .scan(&request.uid, request.device.as_deref())
        .await?;
    Ok(Json(scan))
}

/// Latest unexpired scan for a device session (null when none)
#[utoipa::path(
    get,
    path = "/nfc/latest",
    tag = "nfc",
    params(DeviceQuery),
    responses(
        (status = 200, description = "Latest scan, or null when the slot is empty", body = Scan)
    )
)]
pub async fn latest(
    State(state): State<AppState>,
    Query(query): Query<DeviceQuery>,
) -> AppResult<Json<Option<Scan>>> {
    let scan = state.services.scans.latest(query.device.as_deref()).await?;
    Ok(Json(scan))
}

/// End a device session
#[utoipa::path(
    post,
    path = "/nfc/session/end",
    tag = "nfc",
    request_body = SessionEndRequest,
    responses(
        (status = 204, description = "Session cleared")
    )
)]
pub async fn end_session(
    State(state): State<AppState>,
    Json(request): Json<SessionEndRequest>,
) -> AppResult<StatusCode> {
    state.services.scans.end_session(request.device.as_deref()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Resolve a tag to the user or tool carrying it
#[utoipa::path(
    post,
    path = "/nfc/resolve",
    tag = "nfc",
    request_body = ResolveRequest,
    responses(
        (status = 200, description = "Resolved identity", body = ResolvedIdentity),
        (status = 404, description = "Tag not assigned", body = crate::error::ErrorResponse)
    )
)]
pub async fn resolve(
    State(state): State<AppState>,
    Json(request): Json<ResolveRequest>,
) -> AppResult<Json<ResolvedIdentity>> {
    let identity = state.services.scans.resolve(&request.tag).await?;
    Ok(Json(identity))
}
