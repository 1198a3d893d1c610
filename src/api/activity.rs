//! Activity feed, live view, audit trail and emergency unlock

use axum::{
    extract::{Query, State},
    Json,
};

use crate::{
    error::AppResult,
    models::{
        audit::{AuditEntry, EmergencyUnlock, UnlockReceipt},
        checkout::LiveCheckout,
        transaction::{LimitQuery, TransactionDetails},
    },
    AppState,
};

/// Recent check-outs and check-ins
#[utoipa::path(
    get,
    path = "/transactions",
    tag = "activity",
    params(LimitQuery),
    responses(
        (status = 200, description = "Transactions, newest first", body = Vec<TransactionDetails>)
    )
)]
pub async fn recent_transactions(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> AppResult<Json<Vec<TransactionDetails>>> {
    let rows = state.services.activity.recent_transactions(query.limit).await?;
    Ok(Json(rows))
}

/// Tools currently checked out
#[utoipa::path(
    get,
    path = "/live-view",
    tag = "activity",
    responses(
        (status = 200, description = "Open check-outs", body = Vec<LiveCheckout>)
    )
)]
pub async fn live_view(State(state): State<AppState>) -> AppResult<Json<Vec<LiveCheckout>>> {
    let rows = state.services.activity.live_view().await?;
    Ok(Json(rows))
}

/// Audit trail
#[utoipa::path(
    get,
    path = "/audit-trail",
    tag = "activity",
    params(LimitQuery),
    responses(
        (status = 200, description = "Audit entries, newest first", body = Vec<AuditEntry>)
    )
)]
pub async fn audit_trail(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> AppResult<Json<Vec<AuditEntry>>> {
    let rows = state.services.activity.audit_trail(query.limit).await?;
    Ok(Json(rows))
}

/// Record an emergency cabinet unlock
#[utoipa::path(
    post,
    path = "/unlock/emergency",
    tag = "activity",
    request_body = EmergencyUnlock,
    responses(
        (status = 200, description = "Unlock recorded", body = UnlockReceipt),
        (status = 400, description = "Reason missing", body = crate::error::ErrorResponse),
        (status = 404, description = "Supervisor not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn emergency_unlock(
    State(state): State<AppState>,
    Json(request): Json<EmergencyUnlock>,
) -> AppResult<Json<UnlockReceipt>> {
    let receipt = state.services.activity.emergency_unlock(request).await?;
    Ok(Json(receipt))
}
