//! Check-out / check-in transaction log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use super::enums::TransactionType;

/// Append-only log entry. Only `last_alert_sent` is ever updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Transaction {
    pub id: i64,
    pub user_id: String,
    pub tool_id: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub timestamp: DateTime<Utc>,
    /// Most recent escalation notice fired for this check-out
    pub last_alert_sent: Option<DateTime<Utc>>,
}

/// Transaction to append
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: String,
    pub tool_id: String,
    pub kind: TransactionType,
    pub timestamp: DateTime<Utc>,
}

/// Transaction with display names, for the activity feed
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct TransactionDetails {
    pub id: i64,
    pub user_id: String,
    pub user_name: Option<String>,
    pub tool_id: String,
    pub tool_name: Option<String>,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub timestamp: DateTime<Utc>,
}

/// Query parameters for list endpoints with a limit
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}
