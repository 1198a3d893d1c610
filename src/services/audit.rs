//! Audit trail writer
//!
//! Audit entries are written after the business change has committed. A
//! failed append is logged and dropped; it never fails the operation that
//! produced it.

use serde_json::Value;
use std::sync::Arc;

use crate::{
    clock::Clock,
    error::AppResult,
    models::{audit::AuditEntry, AuditAction, NewAuditEvent},
    repository::Store,
};

/// Default number of entries returned by the audit trail view
pub const AUDIT_TRAIL_LIMIT: i64 = 100;

#[derive(Clone)]
pub struct AuditLogger {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Append an audit event, best effort
    pub async fn record(&self, actor: &str, action: AuditAction, details: Value) {
        let event = NewAuditEvent {
            actor_user_id: actor.to_string(),
            action,
            details,
            timestamp: self.clock.now(),
        };

        match self.store.append_audit(event).await {
            Ok(stored) => {
                tracing::debug!(id = stored.id, action = %action, actor = %actor, "audit event recorded");
            }
            Err(e) => {
                tracing::warn!(action = %action, actor = %actor, "Failed to record audit event: {}", e);
            }
        }
    }

    /// Most recent audit entries, newest first
    pub async fn trail(&self, limit: Option<i64>) -> AppResult<Vec<AuditEntry>> {
        let limit = limit.unwrap_or(AUDIT_TRAIL_LIMIT).clamp(1, 1000);
        self.store.audit_trail(limit).await
    }
}
