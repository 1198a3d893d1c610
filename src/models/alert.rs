//! Alert classification results

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::enums::ToolStatus;

/// Escalation tier of a long check-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AlertTier {
    /// Holder is contacted directly
    Warning,
    /// Supervisor channel is contacted
    Critical,
}

/// Tool whose calibration date has passed
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OverdueTool {
    pub tool_id: String,
    pub name: String,
    pub status: ToolStatus,
    pub calibration_due: NaiveDate,
    pub days_overdue: i64,
}

/// Tool held beyond a threshold
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LongCheckout {
    pub tool_id: String,
    pub tool_name: String,
    pub holder_id: String,
    pub holder_name: Option<String>,
    pub transaction_id: i64,
    pub checked_out_at: DateTime<Utc>,
    pub hours_held: f64,
    pub tier: AlertTier,
    /// A notice was delivered during this evaluation
    pub notified: bool,
}

/// Outcome of an alert evaluation
#[derive(Debug, Default, Clone, Serialize, Deserialize, ToSchema)]
pub struct AlertReport {
    pub overdue_tools: Vec<OverdueTool>,
    pub long_checkout_tools: Vec<LongCheckout>,
}

impl AlertReport {
    pub fn notifications_sent(&self) -> usize {
        self.long_checkout_tools.iter().filter(|c| c.notified).count()
    }
}
