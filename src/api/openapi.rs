//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{activity, alerts, calibration, checkout, health, issues, nfc, tools, users};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Toolcrib API",
        version = "1.0.0",
        description = "Workshop tool inventory, check-out and calibration tracking REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Tools
        tools::list_tools,
        tools::get_tool,
        tools::create_tool,
        tools::update_tool,
        tools::delete_tool,
        tools::set_tool_status,
        tools::assign_tool_tag,
        tools::batch_update_tools,
        // Lifecycle
        checkout::check_out,
        checkout::batch_check_out,
        checkout::check_in,
        // Issues
        issues::list_issues,
        issues::get_issue,
        issues::report_issue,
        issues::close_issue,
        // Alerts
        alerts::get_alerts,
        alerts::evaluate_alerts,
        // Users
        users::list_users,
        users::get_user,
        users::create_user,
        users::update_user,
        users::delete_user,
        users::get_user_tools,
        users::assign_user_tag,
        // Activity
        activity::recent_transactions,
        activity::live_view,
        activity::audit_trail,
        activity::emergency_unlock,
        // Calibration
        calibration::calibration_events,
        calibration::usage_stats,
        calibration::apply_proposals,
        // Identity bridge
        nfc::scan,
        nfc::latest,
        nfc::end_session,
        nfc::resolve,
    ),
    components(
        schemas(
            // Tools
            crate::models::Tool,
            crate::models::ToolStatus,
            crate::models::tool::CreateTool,
            crate::models::tool::UpdateTool,
            crate::models::tool::ToolStatusUpdate,
            crate::models::tool::BatchToolUpdate,
            crate::models::tool::AssignTag,
            crate::models::tool::ToolUsageStats,
            crate::models::tool::CalibrationProposal,
            crate::models::tool::ProposalOutcome,
            crate::models::tool::CalibrationDay,
            // Lifecycle
            crate::models::checkout::CheckoutRequest,
            crate::models::checkout::BatchCheckoutRequest,
            crate::models::checkout::CheckinRequest,
            crate::models::checkout::CheckinReceipt,
            crate::models::checkout::BatchFailure,
            crate::models::checkout::BatchCheckoutReport,
            crate::models::checkout::LiveCheckout,
            crate::models::Transaction,
            crate::models::TransactionType,
            crate::models::transaction::TransactionDetails,
            // Issues
            crate::models::IssueReport,
            crate::models::IssueStatus,
            crate::models::issue::CreateIssue,
            crate::models::issue::CloseIssue,
            crate::models::issue::IssueCreated,
            // Alerts
            crate::models::AlertReport,
            crate::models::AlertTier,
            crate::models::alert::OverdueTool,
            crate::models::alert::LongCheckout,
            // Users
            crate::models::User,
            crate::models::UserRole,
            crate::models::user::CreateUser,
            crate::models::user::UpdateUser,
            // Audit
            crate::models::AuditAction,
            crate::models::audit::AuditEntry,
            crate::models::audit::EmergencyUnlock,
            crate::models::audit::UnlockReceipt,
            // Identity bridge
            crate::models::scan::Scan,
            crate::models::scan::ScanRequest,
            crate::models::scan::SessionEndRequest,
            crate::models::scan::ResolveRequest,
            crate::models::scan::IdentityKind,
            crate::models::scan::ResolvedIdentity,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "tools", description = "Tool registry"),
        (name = "lifecycle", description = "Check-out and check-in"),
        (name = "issues", description = "Defect reports"),
        (name = "alerts", description = "Calibration and long check-out alerts"),
        (name = "users", description = "User directory"),
        (name = "activity", description = "Activity feed, live view and audit trail"),
        (name = "calibration", description = "Calibration calendar and forecasting"),
        (name = "nfc", description = "NFC identity bridge")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
