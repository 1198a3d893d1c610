//! Audit trail model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::enums::AuditAction;

/// Actor recorded for actions not attributable to a user
pub const SYSTEM_ACTOR: &str = "SYSTEM";

/// Immutable audit event
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct AuditEvent {
    pub id: i64,
    /// User id, or `SYSTEM`
    pub actor_user_id: String,
    pub action: AuditAction,
    #[schema(value_type = Object)]
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Event to append
#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub actor_user_id: String,
    pub action: AuditAction,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Audit event with the actor's current name, if the actor still exists
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct AuditEntry {
    pub id: i64,
    pub actor_user_id: String,
    pub user_name: Option<String>,
    pub action: AuditAction,
    #[schema(value_type = Object)]
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Emergency unlock request
#[derive(Debug, Deserialize, ToSchema)]
pub struct EmergencyUnlock {
    pub supervisor_id: Option<String>,
    pub reason: Option<String>,
}

/// Outcome of an emergency unlock
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UnlockReceipt {
    pub actor_user_id: String,
    pub reason: String,
    pub supervisor_notified: bool,
    pub timestamp: DateTime<Utc>,
}
