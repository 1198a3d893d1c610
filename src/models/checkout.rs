//! Check-out / check-in requests and reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{tool::Tool, transaction::Transaction, user::User};

/// Check-out request
#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub user_id: String,
    pub tool_id: String,
}

/// Batch check-out request
#[derive(Debug, Deserialize, ToSchema)]
pub struct BatchCheckoutRequest {
    pub user_id: String,
    pub tool_ids: Vec<String>,
}

/// Check-in request
#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckinRequest {
    pub tool_id: String,
    #[serde(default)]
    pub report_issue: bool,
}

/// Result of a successful check-in
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckinReceipt {
    pub tool: Tool,
    /// Holder the tool was released from
    pub user_id: String,
    pub duration_hours: f64,
}

/// One tool that could not be checked out in a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BatchFailure {
    pub tool_id: String,
    pub reason: String,
}

/// Partitioned outcome of a batch check-out
#[derive(Debug, Default, Clone, Serialize, Deserialize, ToSchema)]
pub struct BatchCheckoutReport {
    pub checked_out: Vec<String>,
    pub unavailable: Vec<BatchFailure>,
    pub errors: Vec<BatchFailure>,
}

/// A tool currently in use together with its open check-out
#[derive(Debug, Clone)]
pub struct OpenCheckout {
    pub tool: Tool,
    /// Latest check-out transaction for the tool (highest id)
    pub checkout: Transaction,
    pub holder: Option<User>,
}

/// Live view row
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LiveCheckout {
    pub tool_id: String,
    pub tool_name: String,
    pub user_id: String,
    pub user_name: Option<String>,
    pub checkout_time: DateTime<Utc>,
    pub seconds_held: i64,
}

impl LiveCheckout {
    pub fn from_open(open: &OpenCheckout, now: DateTime<Utc>) -> Self {
        Self {
            tool_id: open.tool.id.clone(),
            tool_name: open.tool.name.clone(),
            user_id: open.checkout.user_id.clone(),
            user_name: open.holder.as_ref().map(|u| u.name.clone()),
            checkout_time: open.checkout.timestamp,
            seconds_held: (now - open.checkout.timestamp).num_seconds().max(0),
        }
    }
}
