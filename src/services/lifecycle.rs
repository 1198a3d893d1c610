//! Lifecycle engine: check-out, check-in, status overrides and issues
//!
//! Every transition runs inside one store unit of work: the tool row is
//! locked, the preconditions are checked against the locked copy and the
//! tool update and transaction append are committed together. Audit
//! entries and notifications follow the commit and can never undo it.

use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use super::{
    audit::AuditLogger,
    notifier::{Channel, NotificationService},
};
use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::{
        checkout::{BatchCheckoutReport, BatchFailure, CheckinReceipt},
        issue::{CloseIssue, CreateIssue, IssueCreated},
        tool::usage_hours,
        AuditAction, IssueReport, IssueStatus, NewTransaction, Tool, ToolStatus, TransactionType,
        SYSTEM_ACTOR,
    },
    repository::{Store, StoreTx},
};

#[derive(Clone)]
pub struct LifecycleEngine {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    audit: AuditLogger,
    notifications: NotificationService,
}

/// Holder released by an implicit check-in
struct Released {
    user_id: String,
    duration_hours: f64,
}

impl LifecycleEngine {
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

    /// Assign an available, calibrated tool to a user
    pub async fn check_out(&self, user_id: &str, tool_id: &str) -> AppResult<Tool> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let mut tool = tx
            .lock_tool(tool_id)
            .await?
            .ok_or_else(|| AppError::ToolNotFound(tool_id.to_string()))?;
        tool.ensure_can_check_out(self.clock.today())?;

        if tx.lock_user(user_id).await?.is_none() {
            return Err(AppError::NotFound(format!("User {} not found", user_id)));
        }

        tool.mark_checked_out(user_id);
        tx.save_tool(&tool).await?;
        let record = tx
            .append_transaction(NewTransaction {
                user_id: user_id.to_string(),
                tool_id: tool.id.clone(),
                kind: TransactionType::Checkout,
                timestamp: now,
            })
            .await?;
        tx.commit().await?;

        tracing::info!(tool = %tool.id, user = %user_id, "tool checked out");
        self.audit
            .record(
                user_id,
                AuditAction::ToolCheckout,
                json!({ "tool_id": tool.id, "transaction_id": record.id }),
            )
            .await;

        Ok(tool)
    }

    /// Check out several tools for one user, each in its own unit of work
    pub async fn batch_check_out(&self, user_id: &str, tool_ids: &[String]) -> AppResult<BatchCheckoutReport> {
        if tool_ids.is_empty() {
            return Err(AppError::Validation("tool_ids cannot be empty".to_string()));
        }
        if self.store.get_user(user_id).await?.is_none() {
            return Err(AppError::NotFound(format!("User {} not found", user_id)));
        }

        let mut report = BatchCheckoutReport::default();
        for tool_id in tool_ids {
            match self.check_out(user_id, tool_id).await {
                Ok(_) => report.checked_out.push(tool_id.clone()),
                Err(e @ (AppError::ToolNotAvailable(_) | AppError::ToolOverdueForCalibration(_))) => {
                    report.unavailable.push(BatchFailure {
                        tool_id: tool_id.clone(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    if !matches!(e, AppError::ToolNotFound(_)) {
                        tracing::warn!(tool = %tool_id, "batch check-out failed: {}", e);
                    }
                    report.errors.push(BatchFailure {
                        tool_id: tool_id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            user = %user_id,
            checked_out = report.checked_out.len(),
            unavailable = report.unavailable.len(),
            errors = report.errors.len(),
            "batch check-out finished"
        );
        Ok(report)
    }

    /// Release a tool from its holder and accrue the usage time
    pub async fn check_in(&self, tool_id: &str, report_issue: bool) -> AppResult<CheckinReceipt> {
        let mut tx = self.store.begin().await?;

        let mut tool = tx
            .lock_tool(tool_id)
            .await?
            .ok_or_else(|| AppError::ToolNotCheckedOut(tool_id.to_string()))?;
        if tool.status != ToolStatus::InUse {
            return Err(AppError::ToolNotCheckedOut(tool_id.to_string()));
        }

        let new_status = if report_issue {
            ToolStatus::UnderMaintenance
        } else {
            ToolStatus::Available
        };
        let released = self
            .release_holder(tx.as_mut(), &mut tool, new_status)
            .await?
            .ok_or_else(|| AppError::ToolNotCheckedOut(tool_id.to_string()))?;
        tx.save_tool(&tool).await?;
        tx.commit().await?;

        tracing::info!(
            tool = %tool.id,
            user = %released.user_id,
            hours = released.duration_hours,
            "tool checked in"
        );
        self.audit
            .record(
                &released.user_id,
                AuditAction::ToolCheckin,
                json!({
                    "tool_id": tool.id,
                    "duration_hours": released.duration_hours,
                    "report_issue": report_issue,
                }),
            )
            .await;

        if report_issue {
            let message = format!(
                "*Tool returned with an issue*\n{} ({}) was checked in by {} and is now Under Maintenance.",
                tool.name, tool.id, released.user_id
            );
            self.notifications.send(Channel::Supervisor, &message).await;
        }

        Ok(CheckinReceipt {
            tool,
            user_id: released.user_id,
            duration_hours: released.duration_hours,
        })
    }

    /// Manual status change outside the check-out path.
    ///
    /// Moving a held tool to any other status checks it in for its holder
    /// first, so the open interval is accrued and logged.
    pub async fn override_status(&self, tool_id: &str, status: &str) -> AppResult<Tool> {
        let status: ToolStatus = status.parse().map_err(AppError::InvalidStatus)?;

        let mut tx = self.store.begin().await?;
        let mut tool = tx
            .lock_tool(tool_id)
            .await?
            .ok_or_else(|| AppError::ToolNotFound(tool_id.to_string()))?;

        let previous = tool.status;
        let released = if status == ToolStatus::InUse {
            None
        } else {
            self.release_holder(tx.as_mut(), &mut tool, status).await?
        };
        if released.is_none() {
            tool.apply_status(status)?;
        }
        tx.save_tool(&tool).await?;
        tx.commit().await?;

        if let Some(released) = &released {
            tracing::info!(
                tool = %tool.id,
                user = %released.user_id,
                hours = released.duration_hours,
                "holder checked in by status override"
            );
        }
        self.audit
            .record(
                SYSTEM_ACTOR,
                AuditAction::ToolStatusChanged,
                json!({
                    "tool_id": tool.id,
                    "from": previous,
                    "to": tool.status,
                    "released_holder": released.as_ref().map(|r| r.user_id.clone()),
                    "duration_hours": released.as_ref().map(|r| r.duration_hours),
                }),
            )
            .await;

        Ok(tool)
    }

    /// Raise a defect ticket and take the tool out of service
    pub async fn report_issue(&self, request: CreateIssue) -> AppResult<IssueCreated> {
        request.validate()?;
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        let mut tool = tx
            .lock_tool(&request.tool_id)
            .await?
            .ok_or_else(|| AppError::ToolNotFound(request.tool_id.clone()))?;

        // Whoever holds the tool stops accruing usage now
        let released = self
            .release_holder(tx.as_mut(), &mut tool, ToolStatus::UnderMaintenance)
            .await?;
        if released.is_none() {
            tool.apply_status(ToolStatus::UnderMaintenance)?;
        }
        tx.save_tool(&tool).await?;

        let issue = IssueReport {
            id: IssueReport::generate_id(),
            tool_id: tool.id.clone(),
            reporter_id: request.reporter_id.clone(),
            defect_type: request.defect_type.clone(),
            description: request.description.clone(),
            status: IssueStatus::New,
            created_at: now,
            closed_at: None,
        };
        tx.insert_issue(&issue).await?;
        tx.commit().await?;

        tracing::info!(tool = %tool.id, report = %issue.id, "issue reported");
        self.audit
            .record(
                &request.reporter_id,
                AuditAction::IssueReported,
                json!({
                    "report_id": issue.id,
                    "tool_id": tool.id,
                    "defect_type": issue.defect_type,
                    "released_holder": released.as_ref().map(|r| r.user_id.clone()),
                }),
            )
            .await;

        let message = format!(
            "*Issue reported*\n{} ({}): {}\nReported by {}. {}",
            tool.name, tool.id, issue.defect_type, issue.reporter_id, issue.description
        );
        self.notifications.send(Channel::Supervisor, message.trim_end()).await;

        Ok(IssueCreated { report_id: issue.id })
    }

    /// Close or reopen an issue, optionally putting the tool back in service
    pub async fn close_issue(&self, report_id: &str, request: CloseIssue) -> AppResult<IssueReport> {
        let status: IssueStatus = match request.status.as_deref() {
            Some(raw) => raw.parse().map_err(AppError::Validation)?,
            None => IssueStatus::Closed,
        };
        let restore = status == IssueStatus::Closed && request.make_tool_available;

        let mut tx = self.store.begin().await?;
        let mut issue = tx
            .lock_issue(report_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Issue {} not found", report_id)))?;
        issue.set_status(status, self.clock.now());
        tx.save_issue(&issue).await?;

        let mut tool_restored = false;
        if restore {
            match tx.lock_tool(&issue.tool_id).await? {
                Some(mut tool) => {
                    tool.apply_status(ToolStatus::Available)?;
                    tx.save_tool(&tool).await?;
                    tool_restored = true;
                }
                None => {
                    tracing::warn!(tool = %issue.tool_id, report = %issue.id, "issue closed for a deleted tool");
                }
            }
        }
        tx.commit().await?;

        self.audit
            .record(
                SYSTEM_ACTOR,
                AuditAction::IssueClosed,
                json!({
                    "report_id": issue.id,
                    "status": issue.status,
                    "tool_id": issue.tool_id,
                    "tool_restored": tool_restored,
                }),
            )
            .await;

        Ok(issue)
    }

    pub async fn list_issues(&self, status: Option<&str>) -> AppResult<Vec<IssueReport>> {
        let status = status
            .map(|s| s.parse::<IssueStatus>().map_err(AppError::Validation))
            .transpose()?;
        self.store.list_issues(status).await
    }

    pub async fn get_issue(&self, report_id: &str) -> AppResult<IssueReport> {
        self.store
            .get_issue(report_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Issue {} not found", report_id)))
    }

    /// Check-in effect shared by `check_in` and `report_issue`: accrue the
    /// open interval and append the check-in record for the holder.
    ///
    /// Returns `None` when the tool has no holder.
    async fn release_holder(
        &self,
        tx: &mut dyn StoreTx,
        tool: &mut Tool,
        new_status: ToolStatus,
    ) -> AppResult<Option<Released>> {
        let holder = match (&tool.status, &tool.current_holder) {
            (ToolStatus::InUse, Some(holder)) => holder.clone(),
            _ => return Ok(None),
        };

        let now = self.clock.now();
        let checkout = tx.latest_checkout(&tool.id).await?;
        let duration_hours = usage_hours(checkout.map(|c| c.timestamp), now);

        tool.release(new_status, duration_hours);
        tx.append_transaction(NewTransaction {
            user_id: holder.clone(),
            tool_id: tool.id.clone(),
            kind: TransactionType::Checkin,
            timestamp: now,
        })
        .await?;

        Ok(Some(Released {
            user_id: holder,
            duration_hours,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{notifier::MockNotifier, testing::Harness};
    use chrono::Duration;

    #[tokio::test]
    async fn test_scenario_a_second_checkout_is_rejected() {
        let h = Harness::new(MockNotifier::new()).await;
        h.add_tool("T-1", 30).await;

        let tool = h.services.lifecycle.check_out("USR-002", "T-1").await.unwrap();
        assert_eq!(tool.status, ToolStatus::InUse);
        assert_eq!(tool.current_holder.as_deref(), Some("USR-002"));

        let err = h.services.lifecycle.check_out("USR-003", "T-1").await.unwrap_err();
        assert!(matches!(err, AppError::ToolNotAvailable(_)));
    }

    #[tokio::test]
    async fn test_scenario_b_overdue_blocks_checkout() {
        let h = Harness::new(MockNotifier::new()).await;
        h.add_tool("T-2", -1).await;

        let err = h.services.lifecycle.check_out("USR-002", "T-2").await.unwrap_err();
        assert!(matches!(err, AppError::ToolOverdueForCalibration(_)));
        let tool = h.store.get_tool("T-2").await.unwrap().unwrap();
        assert_eq!(tool.status, ToolStatus::Available);
        assert_eq!(tool.total_checkouts, 0);
    }

    #[tokio::test]
    async fn test_overdue_wins_over_status() {
        let h = Harness::new(MockNotifier::new()).await;
        h.add_tool("T-2", -3).await;
        h.services.lifecycle.override_status("T-2", "Pending Verification").await.unwrap();

        let err = h.services.lifecycle.check_out("USR-002", "T-2").await.unwrap_err();
        assert!(matches!(err, AppError::ToolOverdueForCalibration(_)));
    }

    #[tokio::test]
    async fn test_checkout_unknown_tool_or_user() {
        let h = Harness::new(MockNotifier::new()).await;
        h.add_tool("T-1", 30).await;

        assert!(matches!(
            h.services.lifecycle.check_out("USR-002", "NOPE").await,
            Err(AppError::ToolNotFound(_))
        ));
        assert!(matches!(
            h.services.lifecycle.check_out("USR-404", "T-1").await,
            Err(AppError::NotFound(_))
        ));
        let tool = h.store.get_tool("T-1").await.unwrap().unwrap();
        assert_eq!(tool.status, ToolStatus::Available);
    }

    #[tokio::test]
    async fn test_scenario_c_usage_accumulates() {
        let h = Harness::new(MockNotifier::new()).await;
        h.add_tool("T-3", 30).await;

        h.services.lifecycle.check_out("USR-002", "T-3").await.unwrap();
        h.clock.advance(Duration::hours(2));
        let receipt = h.services.lifecycle.check_in("T-3", false).await.unwrap();

        assert_eq!(receipt.user_id, "USR-002");
        assert!((receipt.duration_hours - 2.0).abs() < 1e-6);
        let tool = receipt.tool;
        assert_eq!(tool.status, ToolStatus::Available);
        assert_eq!(tool.current_holder, None);
        assert_eq!(tool.total_checkouts, 1);
        assert!((tool.total_usage_hours - 2.0).abs() < 1e-6);

        let log = h.store.recent_transactions(10).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].kind, TransactionType::Checkin);
        assert_eq!(log[0].user_id, "USR-002");
    }

    #[tokio::test]
    async fn test_scenario_d_issue_checkin_notifies_supervisor() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .withf(|channel, message| *channel == Channel::Supervisor && message.contains("T-4"))
            .times(1)
            .returning(|_, _| Ok(()));
        let h = Harness::new(notifier).await;
        h.add_tool("T-4", 30).await;

        h.services.lifecycle.check_out("USR-002", "T-4").await.unwrap();
        let receipt = h.services.lifecycle.check_in("T-4", true).await.unwrap();
        assert_eq!(receipt.tool.status, ToolStatus::UnderMaintenance);
        assert_eq!(receipt.tool.current_holder, None);
    }

    #[tokio::test]
    async fn test_check_in_requires_in_use() {
        let h = Harness::new(MockNotifier::new()).await;
        h.add_tool("T-1", 30).await;

        assert!(matches!(
            h.services.lifecycle.check_in("T-1", false).await,
            Err(AppError::ToolNotCheckedOut(_))
        ));
        assert!(matches!(
            h.services.lifecycle.check_in("NOPE", false).await,
            Err(AppError::ToolNotCheckedOut(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_checkouts_have_one_winner() {
        let h = Harness::new(MockNotifier::new()).await;
        h.add_tool("T-1", 30).await;

        let a = h.services.lifecycle.clone();
        let b = h.services.lifecycle.clone();
        let (ra, rb) = tokio::join!(
            tokio::spawn(async move { a.check_out("USR-002", "T-1").await }),
            tokio::spawn(async move { b.check_out("USR-003", "T-1").await }),
        );
        let results = [ra.unwrap(), rb.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(AppError::ToolNotAvailable(_))))
                .count(),
            1
        );
        let tool = h.store.get_tool("T-1").await.unwrap().unwrap();
        assert_eq!(tool.total_checkouts, 1);
    }

    #[tokio::test]
    async fn test_batch_partitions_outcomes() {
        let h = Harness::new(MockNotifier::new()).await;
        h.add_tool("T-1", 30).await;
        h.add_tool("T-2", 30).await;
        h.services.lifecycle.check_out("USR-003", "T-2").await.unwrap();

        let ids = vec!["T-1".to_string(), "T-2".to_string(), "T-404".to_string()];
        let report = h.services.lifecycle.batch_check_out("USR-002", &ids).await.unwrap();

        assert_eq!(report.checked_out, vec!["T-1".to_string()]);
        assert_eq!(report.unavailable.len(), 1);
        assert_eq!(report.unavailable[0].tool_id, "T-2");
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].tool_id, "T-404");
    }

    #[tokio::test]
    async fn test_batch_with_unknown_user_fails_whole_call() {
        let h = Harness::new(MockNotifier::new()).await;
        h.add_tool("T-1", 30).await;
        let ids = vec!["T-1".to_string()];
        assert!(matches!(
            h.services.lifecycle.batch_check_out("USR-404", &ids).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_override_status_rules() {
        let h = Harness::new(MockNotifier::new()).await;
        h.add_tool("T-1", 30).await;

        assert!(matches!(
            h.services.lifecycle.override_status("T-1", "Lost").await,
            Err(AppError::InvalidStatus(_))
        ));
        assert!(matches!(
            h.services.lifecycle.override_status("T-1", "In Use").await,
            Err(AppError::InvalidStatus(_))
        ));
        assert!(matches!(
            h.services.lifecycle.override_status("T-9", "Available").await,
            Err(AppError::ToolNotFound(_))
        ));

        h.services.lifecycle.check_out("USR-002", "T-1").await.unwrap();
        let tool = h.services.lifecycle.override_status("T-1", "Available").await.unwrap();
        assert_eq!(tool.current_holder, None);
        assert!(tool.holder_invariant_holds());
    }

    #[tokio::test]
    async fn test_override_of_held_tool_checks_it_in() {
        let h = Harness::new(MockNotifier::new()).await;
        h.add_tool("T-1", 30).await;
        h.services.lifecycle.check_out("USR-002", "T-1").await.unwrap();
        h.clock.advance(Duration::minutes(90));

        let tool = h
            .services
            .lifecycle
            .override_status("T-1", "Pending Verification")
            .await
            .unwrap();
        assert_eq!(tool.status, ToolStatus::PendingVerification);
        assert_eq!(tool.current_holder, None);
        assert!((tool.total_usage_hours - 1.5).abs() < 1e-9);

        let log = h.store.recent_transactions(1).await.unwrap();
        assert_eq!(log[0].kind, TransactionType::Checkin);
        assert_eq!(log[0].user_id, "USR-002");

        let trail = h.store.audit_trail(1).await.unwrap();
        assert_eq!(trail[0].action, AuditAction::ToolStatusChanged);
        assert_eq!(trail[0].details["released_holder"], "USR-002");
        assert_eq!(trail[0].details["duration_hours"], 1.5);
    }

    #[tokio::test]
    async fn test_report_issue_by_holder_releases_tool() {
        let mut notifier = MockNotifier::new();
        notifier.expect_send().times(1).returning(|_, _| Ok(()));
        let h = Harness::new(notifier).await;
        h.add_tool("T-1", 30).await;
        h.services.lifecycle.check_out("USR-002", "T-1").await.unwrap();
        h.clock.advance(Duration::minutes(30));

        let created = h
            .services
            .lifecycle
            .report_issue(CreateIssue {
                tool_id: "T-1".into(),
                reporter_id: "USR-002".into(),
                defect_type: "Calibration drift".into(),
                description: "Reads 3% high".into(),
            })
            .await
            .unwrap();

        let tool = h.store.get_tool("T-1").await.unwrap().unwrap();
        assert_eq!(tool.status, ToolStatus::UnderMaintenance);
        assert_eq!(tool.current_holder, None);
        assert!((tool.total_usage_hours - 0.5).abs() < 1e-6);

        let issue = h.services.lifecycle.get_issue(&created.report_id).await.unwrap();
        assert_eq!(issue.status, IssueStatus::New);
        let log = h.store.recent_transactions(1).await.unwrap();
        assert_eq!(log[0].kind, TransactionType::Checkin);
    }

    #[tokio::test]
    async fn test_report_issue_unknown_tool() {
        let h = Harness::new(MockNotifier::new()).await;
        let err = h
            .services
            .lifecycle
            .report_issue(CreateIssue {
                tool_id: "T-404".into(),
                reporter_id: "USR-002".into(),
                defect_type: "Broken".into(),
                description: String::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_close_issue_restores_tool() {
        let mut notifier = MockNotifier::new();
        notifier.expect_send().returning(|_, _| Ok(()));
        let h = Harness::new(notifier).await;
        h.add_tool("T-1", 30).await;

        let created = h
            .services
            .lifecycle
            .report_issue(CreateIssue {
                tool_id: "T-1".into(),
                reporter_id: "USR-003".into(),
                defect_type: "Cracked housing".into(),
                description: String::new(),
            })
            .await
            .unwrap();

        let issue = h
            .services
            .lifecycle
            .close_issue(
                &created.report_id,
                CloseIssue {
                    status: None,
                    make_tool_available: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(issue.status, IssueStatus::Closed);
        assert!(issue.closed_at.is_some());

        let tool = h.store.get_tool("T-1").await.unwrap().unwrap();
        assert_eq!(tool.status, ToolStatus::Available);
        assert!(tool.holder_invariant_holds());

        let open = h.services.lifecycle.list_issues(Some("New")).await.unwrap();
        assert!(open.is_empty());
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_fail_checkout() {
        let h = Harness::new(MockNotifier::new()).await;
        h.add_tool("T-1", 30).await;
        h.store.fail_audit_writes(true);

        let tool = h.services.lifecycle.check_out("USR-002", "T-1").await.unwrap();
        assert_eq!(tool.status, ToolStatus::InUse);
        assert!(h.store.audit_trail(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_fail_checkin() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .returning(|_, _| Err(crate::services::notifier::NotifyError::Transport("down".into())));
        let h = Harness::new(notifier).await;
        h.add_tool("T-1", 30).await;
        h.services.lifecycle.check_out("USR-002", "T-1").await.unwrap();

        let receipt = h.services.lifecycle.check_in("T-1", true).await.unwrap();
        assert_eq!(receipt.tool.status, ToolStatus::UnderMaintenance);
    }
}
