//! Alert evaluator
//!
//! Two read-only scans over tools and their open check-outs: calibration
//! overdue tools, and tools held longer than the warning or critical
//! threshold. Long check-outs notify either the holder (warning) or the
//! supervisor channel (critical); the check-out transaction's
//! `last_alert_sent` marker keeps a notice from repeating inside its
//! re-arm window. Both tiers share the one marker.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::sync::Arc;

use super::notifier::{Channel, NotificationService};
use crate::{
    clock::Clock,
    config::AlertsConfig,
    error::AppResult,
    models::{
        alert::{LongCheckout, OverdueTool},
        AlertReport, AlertTier, OpenCheckout, ToolStatus,
    },
    repository::Store,
};

/// Escalation thresholds
#[derive(Debug, Clone, Copy)]
pub struct AlertPolicy {
    pub warning_after: Duration,
    pub critical_after: Duration,
    pub warning_rearm: Duration,
    pub critical_rearm: Duration,
}

impl From<&AlertsConfig> for AlertPolicy {
    fn from(config: &AlertsConfig) -> Self {
        Self {
            warning_after: Duration::hours(config.warning_after_hours),
            critical_after: Duration::hours(config.critical_after_hours),
            warning_rearm: Duration::hours(config.warning_rearm_hours),
            critical_rearm: Duration::hours(config.critical_rearm_hours),
        }
    }
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self::from(&AlertsConfig::default())
    }
}

impl AlertPolicy {
    /// Tier for a check-out of the given age, if any
    pub fn tier(&self, age: Duration) -> Option<AlertTier> {
        if age >= self.critical_after {
            Some(AlertTier::Critical)
        } else if age >= self.warning_after {
            Some(AlertTier::Warning)
        } else {
            None
        }
    }

    fn rearm(&self, tier: AlertTier) -> Duration {
        match tier {
            AlertTier::Warning => self.warning_rearm,
            AlertTier::Critical => self.critical_rearm,
        }
    }

    /// Whether a notice may go out now given the last one sent
    pub fn is_due(&self, tier: AlertTier, last_sent: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last_sent {
            Some(at) => now - at >= self.rearm(tier),
            None => true,
        }
    }
}

#[derive(Clone)]
pub struct AlertEvaluator {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    notifications: NotificationService,
    policy: AlertPolicy,
}

impl AlertEvaluator {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        notifications: NotificationService,
        policy: AlertPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            notifications,
            policy,
        }
    }

    /// Classify without sending anything
    pub async fn classify(&self) -> AppResult<AlertReport> {
        let now = self.clock.now();
        Ok(AlertReport {
            overdue_tools: self.overdue_tools().await?,
            long_checkout_tools: self
                .store
                .open_checkouts()
                .await?
                .iter()
                .filter_map(|open| self.long_checkout(open, now))
                .collect(),
        })
    }

    /// Classify and send the notices that are due.
    ///
    /// Each notice is claimed by swapping the transaction's marker before
    /// the send, so overlapping runs cannot both deliver it. A failed send
    /// puts the previous marker back and the next run retries.
    pub async fn evaluate(&self) -> AppResult<AlertReport> {
        // Postgres keeps microseconds; the claimed value must round-trip
        // for the restore swap to match it.
        let now = self.clock.now().trunc_subsecs(6);
        let overdue_tools = self.overdue_tools().await?;

        let mut long_checkout_tools = Vec::new();
        for open in self.store.open_checkouts().await? {
            let Some(mut entry) = self.long_checkout(&open, now) else {
                continue;
            };

            let seen = open.checkout.last_alert_sent;
            if self.policy.is_due(entry.tier, seen, now) {
                if let Some((channel, message)) = self.notice(&open, &entry) {
                    entry.notified = self.claim_and_send(&entry, seen, now, channel, &message).await?;
                }
            }
            long_checkout_tools.push(entry);
        }

        let report = AlertReport {
            overdue_tools,
            long_checkout_tools,
        };
        tracing::info!(
            overdue = report.overdue_tools.len(),
            long_checkouts = report.long_checkout_tools.len(),
            notified = report.notifications_sent(),
            "alert evaluation finished"
        );
        Ok(report)
    }

    async fn claim_and_send(
        &self,
        entry: &LongCheckout,
        seen: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        channel: Channel,
        message: &str,
    ) -> AppResult<bool> {
        if !self
            .store
            .swap_alert_marker(entry.transaction_id, seen, Some(now))
            .await?
        {
            tracing::debug!(
                tool = %entry.tool_id,
                transaction = entry.transaction_id,
                "alert already claimed by another run"
            );
            return Ok(false);
        }

        if self.notifications.send(channel, message).await {
            return Ok(true);
        }

        match self
            .store
            .swap_alert_marker(entry.transaction_id, Some(now), seen)
            .await
        {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                transaction = entry.transaction_id,
                "alert marker changed before it could be restored"
            ),
            Err(e) => tracing::warn!(
                tool = %entry.tool_id,
                transaction = entry.transaction_id,
                "Failed to restore alert marker: {}",
                e
            ),
        }
        Ok(false)
    }

    async fn overdue_tools(&self) -> AppResult<Vec<OverdueTool>> {
        let today = self.clock.today();
        Ok(self
            .store
            .list_tools(None)
            .await?
            .into_iter()
            .filter(|t| t.status != ToolStatus::UnderMaintenance && t.is_calibration_overdue(today))
            .map(|t| OverdueTool {
                days_overdue: (today - t.calibration_due).num_days(),
                tool_id: t.id,
                name: t.name,
                status: t.status,
                calibration_due: t.calibration_due,
            })
            .collect())
    }

    fn long_checkout(&self, open: &OpenCheckout, now: DateTime<Utc>) -> Option<LongCheckout> {
        let age = now - open.checkout.timestamp;
        let tier = self.policy.tier(age)?;
        Some(LongCheckout {
            tool_id: open.tool.id.clone(),
            tool_name: open.tool.name.clone(),
            holder_id: open.checkout.user_id.clone(),
            holder_name: open.holder.as_ref().map(|u| u.name.clone()),
            transaction_id: open.checkout.id,
            checked_out_at: open.checkout.timestamp,
            hours_held: age.num_seconds() as f64 / 3600.0,
            tier,
            notified: false,
        })
    }

    /// Recipient and text for a due notice; `None` when the holder has no
    /// contact channel for a warning
    fn notice(&self, open: &OpenCheckout, entry: &LongCheckout) -> Option<(Channel, String)> {
        match entry.tier {
            AlertTier::Warning => {
                let Some(contact) = open.holder.as_ref().and_then(|u| u.contact_channel.clone()) else {
                    tracing::debug!(user = %entry.holder_id, "holder has no contact channel, warning skipped");
                    return None;
                };
                let message = format!(
                    "*Reminder*\nYou have held {} ({}) for {:.1}h. Please check it in when you are done.",
                    entry.tool_name, entry.tool_id, entry.hours_held
                );
                Some((Channel::Direct(contact), message))
            }
            AlertTier::Critical => {
                let message = format!(
                    "*Long checkout*\n{} ({}) has been held by {} for {:.1}h.",
                    entry.tool_name,
                    entry.tool_id,
                    entry.holder_name.as_deref().unwrap_or(&entry.holder_id),
                    entry.hours_held
                );
                Some((Channel::Supervisor, message))
            }
        }
    }
}
