//! Read-only activity views and the emergency unlock

use serde_json::json;
use std::sync::Arc;

use super::{
    audit::AuditLogger,
    notifier::{Channel, NotificationService},
};
use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::{
        audit::{AuditEntry, EmergencyUnlock, UnlockReceipt},
        checkout::LiveCheckout,
        transaction::TransactionDetails,
        AuditAction, SYSTEM_ACTOR,
    },
    repository::Store,
};

/// Default number of rows in the transaction feed
pub const RECENT_TRANSACTIONS_LIMIT: i64 = 20;

#[derive(Clone)]
pub struct ActivityService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    audit: AuditLogger,
    notifications: NotificationService,
}

impl ActivityService {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        audit: AuditLogger,
        notifications: NotificationService,
    ) -> Self {
        Self {
            store,
            clock,
            audit,
            notifications,
        }
    }

    /// Newest transactions first
    pub async fn recent_transactions(&self, limit: Option<i64>) -> AppResult<Vec<TransactionDetails>> {
        let limit = limit.unwrap_or(RECENT_TRANSACTIONS_LIMIT).clamp(1, 500);
        self.store.recent_transactions(limit).await
    }

    /// Tools currently out, oldest check-out first
    pub async fn live_view(&self) -> AppResult<Vec<LiveCheckout>> {
        let now = self.clock.now();
        Ok(self
            .store
            .open_checkouts()
            .await?
            .iter()
            .map(|open| LiveCheckout::from_open(open, now))
            .collect())
    }

    pub async fn audit_trail(&self, limit: Option<i64>) -> AppResult<Vec<AuditEntry>> {
        self.audit.trail(limit).await
    }

    /// Record a cabinet override and alert the supervisor channel
    pub async fn emergency_unlock(&self, request: EmergencyUnlock) -> AppResult<UnlockReceipt> {
        let reason = request
            .reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .ok_or_else(|| AppError::Validation("reason is required".to_string()))?;

        let actor = match request.supervisor_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => {
                self.store
                    .get_user(id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?
                    .id
            }
            None => SYSTEM_ACTOR.to_string(),
        };

        tracing::warn!(actor = %actor, "emergency unlock: {}", reason);
        self.audit
            .record(&actor, AuditAction::EmergencyUnlock, json!({ "reason": reason }))
            .await;

        let message = format!("*Emergency unlock*\nTriggered by {}: {}", actor, reason);
        let supervisor_notified = self.notifications.send(Channel::Supervisor, &message).await;

        Ok(UnlockReceipt {
            actor_user_id: actor,
            reason,
            supervisor_notified,
            timestamp: self.clock.now(),
        })
    }
}
