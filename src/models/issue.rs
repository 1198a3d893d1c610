//! Issue report model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::enums::IssueStatus;

/// Defect ticket raised against a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct IssueReport {
    pub id: String,
    pub tool_id: String,
    pub reporter_id: String,
    pub defect_type: String,
    pub description: String,
    pub status: IssueStatus,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl IssueReport {
    /// Generate a report identifier such as `ISS-3F2A9C10`
    pub fn generate_id() -> String {
        let raw = uuid::Uuid::new_v4().simple().to_string();
        format!("ISS-{}", raw[..8].to_uppercase())
    }

    /// Move to a new status; closing stamps `closed_at`, reopening clears it
    pub fn set_status(&mut self, status: IssueStatus, now: DateTime<Utc>) {
        self.status = status;
        self.closed_at = match status {
            IssueStatus::Closed => Some(now),
            IssueStatus::New => None,
        };
    }
}

/// Report issue request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateIssue {
    #[validate(length(min = 1, message = "tool_id is required"))]
    pub tool_id: String,
    #[validate(length(min = 1, message = "reporter_id is required"))]
    pub reporter_id: String,
    #[validate(length(min = 1, message = "defect_type is required"))]
    pub defect_type: String,
    #[serde(default)]
    pub description: String,
}

/// Close (or reopen) issue request
#[derive(Debug, Deserialize, ToSchema)]
pub struct CloseIssue {
    /// "Closed" or "New"; defaults to "Closed"
    pub status: Option<String>,
    #[serde(default)]
    pub make_tool_available: bool,
}

/// Report identifier returned on creation
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IssueCreated {
    pub report_id: String,
}

/// Query parameters for issue listing
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct IssueQuery {
    pub status: Option<String>,
}
