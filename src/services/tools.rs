//! Tool registry: catalogue CRUD, batch edits, tags and calibration dates

use chrono::{Datelike, NaiveDate};
use serde_json::json;
use std::{collections::BTreeSet, sync::Arc};
use validator::Validate;

use super::{audit::AuditLogger, scans::normalize_tag};
use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::{
        tool::{
            parse_date, BatchToolUpdate, CalendarQuery, CalibrationDay, CalibrationProposal,
            CreateTool, ProposalOutcome, ToolChanges, ToolUsageStats, UpdateTool,
        },
        AuditAction, Tool, ToolStatus, SYSTEM_ACTOR,
    },
    repository::Store,
};

#[derive(Clone)]
pub struct ToolRegistry {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    audit: AuditLogger,
}

impl ToolRegistry {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, audit: AuditLogger) -> Self {
        Self { store, clock, audit }
    }

    pub async fn list(&self, status: Option<&str>) -> AppResult<Vec<Tool>> {
        let status = status
            .map(|s| s.parse::<ToolStatus>().map_err(AppError::InvalidStatus))
            .transpose()?;
        self.store.list_tools(status).await
    }

    pub async fn get(&self, id: &str) -> AppResult<Tool> {
        self.store
            .get_tool(id)
            .await?
            .ok_or_else(|| AppError::ToolNotFound(id.to_string()))
    }

    /// Register a new tool; it starts Available with no history
    pub async fn create(&self, request: CreateTool) -> AppResult<Tool> {
        request.validate()?;
        let (Some(id), Some(name), Some(due)) = (request.id, request.name, request.calibration_due) else {
            return Err(AppError::Validation("id, name and calibration_due are required".to_string()));
        };

        let mut tool = Tool::new(
            id.trim().to_string(),
            name.trim().to_string(),
            request.model.filter(|m| !m.trim().is_empty()),
            parse_date("calibration_due", &due)?,
        );
        tool.nfc_tag = request.nfc_tag.as_deref().map(normalize_tag).transpose()?;

        let mut tx = self.store.begin().await?;
        tx.insert_tool(&tool).await?;
        tx.commit().await?;

        tracing::info!(tool = %tool.id, "tool created");
        self.audit
            .record(
                SYSTEM_ACTOR,
                AuditAction::ToolCreated,
                json!({ "tool_id": tool.id, "name": tool.name, "calibration_due": tool.calibration_due }),
            )
            .await;
        Ok(tool)
    }

    /// Update descriptive fields and the calibration date
    pub async fn update(&self, id: &str, request: UpdateTool) -> AppResult<Tool> {
        request.validate()?;
        let (Some(name), Some(due)) = (request.name, request.calibration_due) else {
            return Err(AppError::Validation("name and calibration_due are required".to_string()));
        };
        let due = parse_date("calibration_due", &due)?;

        let mut tx = self.store.begin().await?;
        let mut tool = tx
            .lock_tool(id)
            .await?
            .ok_or_else(|| AppError::ToolNotFound(id.to_string()))?;
        tool.name = name.trim().to_string();
        if let Some(model) = request.model {
            tool.model = Some(model).filter(|m| !m.trim().is_empty());
        }
        tool.calibration_due = due;
        tx.save_tool(&tool).await?;
        tx.commit().await?;

        self.audit
            .record(
                SYSTEM_ACTOR,
                AuditAction::ToolUpdated,
                json!({ "tool_id": tool.id, "name": tool.name, "calibration_due": tool.calibration_due }),
            )
            .await;
        Ok(tool)
    }

    /// Delete a tool. A tool still in use may be deleted; its transactions stay.
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        let mut tx = self.store.begin().await?;
        let tool = tx
            .lock_tool(id)
            .await?
            .ok_or_else(|| AppError::ToolNotFound(id.to_string()))?;
        tx.delete_tool(id).await?;
        tx.commit().await?;

        if tool.status == ToolStatus::InUse {
            tracing::warn!(tool = %id, holder = ?tool.current_holder, "deleted a tool that was checked out");
        }
        self.audit
            .record(
                SYSTEM_ACTOR,
                AuditAction::ToolDeleted,
                json!({ "tool_id": id, "name": tool.name, "was_in_use": tool.status == ToolStatus::InUse }),
            )
            .await;
        Ok(())
    }

    /// Apply the same status and/or calibration date to several tools at once.
    ///
    /// All ids are updated in one unit of work; one unknown id aborts the
    /// whole batch. "In Use" is refused since only check-out assigns a holder.
    pub async fn batch_update(&self, request: BatchToolUpdate) -> AppResult<Vec<Tool>> {
        let changes = ToolChanges {
            status: request
                .status
                .as_deref()
                .map(|s| s.parse::<ToolStatus>().map_err(AppError::InvalidStatus))
                .transpose()?,
            calibration_due: request
                .calibration_due
                .as_deref()
                .map(|d| parse_date("calibration_due", d))
                .transpose()?,
        };
        if changes.status == Some(ToolStatus::InUse) {
            return Err(AppError::InvalidBatchOperation(
                "cannot set \"In Use\" in a batch; use batch check-out".to_string(),
            ));
        }
        if changes.is_empty() {
            return Err(AppError::Validation("no fields to update".to_string()));
        }
        let ids: BTreeSet<&str> = request.ids.iter().map(String::as_str).collect();
        if ids.is_empty() {
            return Err(AppError::Validation("ids cannot be empty".to_string()));
        }

        let mut tx = self.store.begin().await?;
        let mut updated = Vec::with_capacity(ids.len());
        for id in &ids {
            let mut tool = tx
                .lock_tool(id)
                .await?
                .ok_or_else(|| AppError::ToolNotFound(id.to_string()))?;
            if let Some(status) = changes.status {
                tool.apply_status(status)?;
            }
            if let Some(due) = changes.calibration_due {
                tool.calibration_due = due;
            }
            tx.save_tool(&tool).await?;
            updated.push(tool);
        }
        tx.commit().await?;

        tracing::info!(count = updated.len(), "tools batch updated");
        self.audit
            .record(
                SYSTEM_ACTOR,
                AuditAction::ToolsBatchUpdated,
                json!({
                    "ids": ids,
                    "status": changes.status,
                    "calibration_due": changes.calibration_due,
                }),
            )
            .await;
        Ok(updated)
    }

    /// Attach an NFC sticker to a tool
    pub async fn assign_tag(&self, id: &str, raw_tag: &str) -> AppResult<Tool> {
        let tag = normalize_tag(raw_tag)?;

        let mut tx = self.store.begin().await?;
        let mut tool = tx
            .lock_tool(id)
            .await?
            .ok_or_else(|| AppError::ToolNotFound(id.to_string()))?;
        tool.nfc_tag = Some(tag.clone());
        tx.save_tool(&tool).await?;
        tx.commit().await?;

        self.audit
            .record(SYSTEM_ACTOR, AuditAction::ToolTagAssigned, json!({ "tool_id": id, "tag": tag }))
            .await;
        Ok(tool)
    }

    /// Usage figures for every tool in service
    pub async fn usage_stats(&self) -> AppResult<Vec<ToolUsageStats>> {
        Ok(self
            .store
            .list_tools(None)
            .await?
            .iter()
            .filter(|t| t.status != ToolStatus::UnderMaintenance)
            .map(ToolUsageStats::from)
            .collect())
    }

    /// Apply forecast proposals that move a calibration date earlier.
    ///
    /// Later or equal dates are skipped; unknown tools are reported as missing.
    pub async fn apply_calibration_proposals(
        &self,
        proposals: Vec<CalibrationProposal>,
    ) -> AppResult<ProposalOutcome> {
        let mut outcome = ProposalOutcome::default();
        let mut rescheduled = Vec::new();

        let mut tx = self.store.begin().await?;
        for proposal in &proposals {
            let Some(mut tool) = tx.lock_tool(&proposal.tool_id).await? else {
                outcome.missing.push(proposal.tool_id.clone());
                continue;
            };
            if proposal.recommended_date >= tool.calibration_due {
                outcome.skipped.push(proposal.tool_id.clone());
                continue;
            }
            let previous = tool.calibration_due;
            tool.calibration_due = proposal.recommended_date;
            tx.save_tool(&tool).await?;
            outcome.applied.push(tool.id.clone());
            rescheduled.push((proposal, previous));
        }
        tx.commit().await?;

        for (proposal, previous) in rescheduled {
            self.audit
                .record(
                    SYSTEM_ACTOR,
                    AuditAction::CalibrationRescheduled,
                    json!({
                        "tool_id": proposal.tool_id,
                        "old_date": previous,
                        "new_date": proposal.recommended_date,
                        "reason": proposal.reason,
                    }),
                )
                .await;
        }
        Ok(outcome)
    }

    /// Tools due for calibration per day of a month
    pub async fn calibration_events(&self, query: CalendarQuery) -> AppResult<Vec<CalibrationDay>> {
        let today = self.clock.today();
        let year = query.year.unwrap_or(today.year());
        let month = query.month.unwrap_or(today.month());

        let from = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| AppError::Validation(format!("Invalid month: {}-{}", year, month)))?;
        let to = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(|| AppError::Validation(format!("Invalid month: {}-{}", year, month)))?;

        self.store.calibration_days(from, to).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{notifier::MockNotifier, testing::Harness};

    fn create(id: &str, due: &str) -> CreateTool {
        CreateTool {
            id: Some(id.to_string()),
            name: Some("Digital Multimeter".to_string()),
            model: Some("Fluke 87V".to_string()),
            calibration_due: Some(due.to_string()),
            nfc_tag: None,
        }
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates_and_missing_fields() {
        let h = Harness::new(MockNotifier::new()).await;
        let tools = &h.services.tools;

        let tool = tools.create(create("MM-002", "2026-09-01")).await.unwrap();
        assert_eq!(tool.status, ToolStatus::Available);
        assert_eq!(tool.total_checkouts, 0);

        assert!(matches!(
            tools.create(create("MM-002", "2026-09-01")).await,
            Err(AppError::DuplicateId(_))
        ));

        let mut missing = create("MM-003", "2026-09-01");
        missing.name = None;
        assert!(matches!(tools.create(missing).await, Err(AppError::Validation(_))));

        assert!(matches!(
            tools.create(create("MM-004", "not-a-date")).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_update_and_delete_unknown_tool() {
        let h = Harness::new(MockNotifier::new()).await;
        let update = UpdateTool {
            name: Some("Torque Wrench".into()),
            model: None,
            calibration_due: Some("2026-10-01".into()),
        };
        assert!(matches!(
            h.services.tools.update("TW-404", update).await,
            Err(AppError::ToolNotFound(_))
        ));
        assert!(matches!(
            h.services.tools.delete("TW-404").await,
            Err(AppError::ToolNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_in_use_tool_is_allowed() {
        let h = Harness::new(MockNotifier::new()).await;
        h.add_tool("T-1", 30).await;
        h.services.lifecycle.check_out("USR-002", "T-1").await.unwrap();

        h.services.tools.delete("T-1").await.unwrap();
        assert!(h.store.get_tool("T-1").await.unwrap().is_none());
        assert_eq!(h.store.recent_transactions(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_batch_update_rules() {
        let h = Harness::new(MockNotifier::new()).await;
        h.add_tool("T-1", 30).await;
        h.add_tool("T-2", 30).await;
        h.services.lifecycle.check_out("USR-002", "T-2").await.unwrap();

        let in_use = BatchToolUpdate {
            ids: vec!["T-1".into()],
            status: Some("In Use".into()),
            calibration_due: None,
        };
        assert!(matches!(
            h.services.tools.batch_update(in_use).await,
            Err(AppError::InvalidBatchOperation(_))
        ));

        let empty = BatchToolUpdate {
            ids: vec!["T-1".into()],
            status: None,
            calibration_due: None,
        };
        assert!(matches!(
            h.services.tools.batch_update(empty).await,
            Err(AppError::Validation(_))
        ));

        let updated = h
            .services
            .tools
            .batch_update(BatchToolUpdate {
                ids: vec!["T-1".into(), "T-2".into()],
                status: Some("Pending Verification".into()),
                calibration_due: Some("2026-12-15".into()),
            })
            .await
            .unwrap();
        assert_eq!(updated.len(), 2);
        for tool in updated {
            assert_eq!(tool.status, ToolStatus::PendingVerification);
            assert_eq!(tool.current_holder, None);
            assert_eq!(tool.calibration_due, NaiveDate::from_ymd_opt(2026, 12, 15).unwrap());
        }
    }

    #[tokio::test]
    async fn test_batch_update_is_atomic() {
        let h = Harness::new(MockNotifier::new()).await;
        h.add_tool("T-1", 30).await;

        let result = h
            .services
            .tools
            .batch_update(BatchToolUpdate {
                ids: vec!["T-1".into(), "T-404".into()],
                status: Some("Under Maintenance".into()),
                calibration_due: None,
            })
            .await;
        assert!(matches!(result, Err(AppError::ToolNotFound(_))));
        let tool = h.store.get_tool("T-1").await.unwrap().unwrap();
        assert_eq!(tool.status, ToolStatus::Available);
    }

    #[tokio::test]
    async fn test_tags_are_normalised_and_unique() {
        let h = Harness::new(MockNotifier::new()).await;
        h.add_tool("T-1", 30).await;
        h.add_tool("T-2", 30).await;

        let tool = h.services.tools.assign_tag("T-1", "0xAA 0xBB 0x1").await.unwrap();
        assert_eq!(tool.nfc_tag.as_deref(), Some("aa bb 01"));
        assert!(matches!(
            h.services.tools.assign_tag("T-2", "AA BB 01").await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_only_earlier_proposals_apply() {
        let h = Harness::new(MockNotifier::new()).await;
        h.add_tool("T-1", 30).await;
        h.add_tool("T-2", 30).await;
        let today = h.clock.today();

        let outcome = h
            .services
            .tools
            .apply_calibration_proposals(vec![
                CalibrationProposal {
                    tool_id: "T-1".into(),
                    recommended_date: today + chrono::Duration::days(10),
                    reason: Some("heavy use".into()),
                },
                CalibrationProposal {
                    tool_id: "T-2".into(),
                    recommended_date: today + chrono::Duration::days(40),
                    reason: None,
                },
                CalibrationProposal {
                    tool_id: "T-404".into(),
                    recommended_date: today,
                    reason: None,
                },
            ])
            .await
            .unwrap();

        assert_eq!(outcome.applied, vec!["T-1".to_string()]);
        assert_eq!(outcome.skipped, vec!["T-2".to_string()]);
        assert_eq!(outcome.missing, vec!["T-404".to_string()]);
        let tool = h.store.get_tool("T-1").await.unwrap().unwrap();
        assert_eq!(tool.calibration_due, today + chrono::Duration::days(10));

        let trail = h.store.audit_trail(1).await.unwrap();
        assert_eq!(trail[0].action, AuditAction::CalibrationRescheduled);
    }

    #[tokio::test]
    async fn test_usage_stats_skip_maintenance() {
        let h = Harness::new(MockNotifier::new()).await;
        h.add_tool("T-1", 30).await;
        h.add_tool("T-2", 30).await;
        h.services.lifecycle.override_status("T-2", "Under Maintenance").await.unwrap();

        let stats = h.services.tools.usage_stats().await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].tool_id, "T-1");
    }

    #[tokio::test]
    async fn test_calendar_defaults_to_current_month() {
        let h = Harness::new(MockNotifier::new()).await;
        h.add_tool("T-1", 5).await;
        h.add_tool("T-2", 5).await;
        h.add_tool("T-3", 60).await;

        let days = h.services.tools.calibration_events(CalendarQuery::default()).await.unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].count, 2);

        assert!(matches!(
            h.services
                .tools
                .calibration_events(CalendarQuery { year: Some(2026), month: Some(13) })
                .await,
            Err(AppError::Validation(_))
        ));
    }
}
