//! API handlers for Toolcrib REST endpoints

pub mod activity;
pub mod alerts;
pub mod calibration;
pub mod checkout;
pub mod health;
pub mod issues;
pub mod nfc;
pub mod openapi;
pub mod tools;
pub mod users;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::AppState;

/// Create the application router with all routes
pub fn router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Tools
        .route("/tools", get(tools::list_tools).post(tools::create_tool))
        .route("/tools/batch", post(tools::batch_update_tools))
        .route(
            "/tools/:id",
            get(tools::get_tool)
                .put(tools::update_tool)
                .delete(tools::delete_tool),
        )
        .route("/tools/:id/status", put(tools::set_tool_status))
        .route("/tools/:id/tag", put(tools::assign_tool_tag))
        // Lifecycle
        .route("/checkout", post(checkout::check_out))
        .route("/checkout/batch", post(checkout::batch_check_out))
        .route("/checkin", post(checkout::check_in))
        // Issues
        .route("/issues", get(issues::list_issues).post(issues::report_issue))
        .route("/issues/:id", get(issues::get_issue))
        .route("/issues/:id/close", post(issues::close_issue))
        // Alerts
        .route("/alerts", get(alerts::get_alerts))
        .route("/alerts/evaluate", post(alerts::evaluate_alerts))
        // Users
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/users/:id/tools", get(users::get_user_tools))
        .route("/users/:id/tag", put(users::assign_user_tag))
        // Activity
        .route("/transactions", get(activity::recent_transactions))
        .route("/live-view", get(activity::live_view))
        .route("/audit-trail", get(activity::audit_trail))
        .route("/unlock/emergency", post(activity::emergency_unlock))
        // Calibration
        .route("/calibration/events", get(calibration::calibration_events))
        .route("/calibration/usage-stats", get(calibration::usage_stats))
        .route("/calibration/proposals", post(calibration::apply_proposals))
        // Identity bridge
        .route("/nfc/scan", post(nfc::scan))
        .route("/nfc/latest", get(nfc::latest))
        .route("/nfc/session/end", post(nfc::end_session))
        .route("/nfc/resolve", post(nfc::resolve))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
