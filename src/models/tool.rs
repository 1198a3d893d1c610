//! Tool model and lifecycle rules

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::enums::ToolStatus;
use crate::error::{AppError, AppResult};

/// Tool record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Tool {
    pub id: String,
    pub name: String,
    pub model: Option<String>,
    pub status: ToolStatus,
    /// Set if and only if status is "In Use"
    pub current_holder: Option<String>,
    pub calibration_due: NaiveDate,
    pub total_checkouts: i32,
    pub total_usage_hours: f64,
    /// Normalised NFC sticker UID
    pub nfc_tag: Option<String>,
}

impl Tool {
    pub fn new(id: String, name: String, model: Option<String>, calibration_due: NaiveDate) -> Self {
        Self {
            id,
            name,
            model,
            status: ToolStatus::Available,
            current_holder: None,
            calibration_due,
            total_checkouts: 0,
            total_usage_hours: 0.0,
            nfc_tag: None,
        }
    }

    pub fn is_calibration_overdue(&self, today: NaiveDate) -> bool {
        self.calibration_due < today
    }

    pub fn holder_invariant_holds(&self) -> bool {
        self.current_holder.is_some() == (self.status == ToolStatus::InUse)
    }

    /// Check-out preconditions. A passed calibration date blocks the tool
    /// whatever its stored status says.
    pub fn ensure_can_check_out(&self, today: NaiveDate) -> AppResult<()> {
        if self.is_calibration_overdue(today) {
            return Err(AppError::ToolOverdueForCalibration(self.id.clone()));
        }
        if self.status != ToolStatus::Available {
            return Err(AppError::ToolNotAvailable(self.id.clone()));
        }
        Ok(())
    }

    /// Assign the tool to a holder. Only the check-out path calls this.
    pub(crate) fn mark_checked_out(&mut self, user_id: &str) {
        self.status = ToolStatus::InUse;
        self.current_holder = Some(user_id.to_string());
        self.total_checkouts += 1;
    }

    /// Release the holder, accrue usage and move to a non-holding status
    pub(crate) fn release(&mut self, new_status: ToolStatus, usage_hours: f64) {
        debug_assert!(new_status != ToolStatus::InUse);
        self.status = new_status;
        self.current_holder = None;
        self.total_usage_hours += usage_hours.max(0.0);
    }

    /// Status override outside the check-out/check-in path.
    ///
    /// Any status other than "In Use" drops the holder. "In Use" is only
    /// accepted for a tool that already has a holder.
    pub fn apply_status(&mut self, status: ToolStatus) -> AppResult<()> {
        if status == ToolStatus::InUse {
            if self.current_holder.is_none() {
                return Err(AppError::InvalidStatus(format!(
                    "tool {} has no holder; use check-out to put it in use",
                    self.id
                )));
            }
            self.status = ToolStatus::InUse;
            return Ok(());
        }
        self.status = status;
        self.current_holder = None;
        Ok(())
    }
}

/// Hours between a check-out and `now`, clamped at zero.
///
/// A missing check-out record yields 0.0.
pub fn usage_hours(checked_out_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match checked_out_at {
        Some(at) => ((now - at).num_milliseconds() as f64 / 3_600_000.0).max(0.0),
        None => 0.0,
    }
}

/// Parse a `YYYY-MM-DD` calendar date
pub fn parse_date(field: &str, value: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("Invalid {}: {}", field, value)))
}

/// Create tool request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateTool {
    #[validate(required(message = "id is required"), length(min = 1, message = "id is required"))]
    pub id: Option<String>,
    #[validate(required(message = "name is required"), length(min = 1, message = "name is required"))]
    pub name: Option<String>,
    pub model: Option<String>,
    /// Calibration due date (YYYY-MM-DD)
    #[validate(required(message = "calibration_due is required"))]
    pub calibration_due: Option<String>,
    pub nfc_tag: Option<String>,
}

/// Update tool request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateTool {
    #[validate(required(message = "name is required"), length(min = 1, message = "name is required"))]
    pub name: Option<String>,
    pub model: Option<String>,
    /// Calibration due date (YYYY-MM-DD)
    #[validate(required(message = "calibration_due is required"))]
    pub calibration_due: Option<String>,
}

/// Manual status change request
#[derive(Debug, Deserialize, ToSchema)]
pub struct ToolStatusUpdate {
    pub status: String,
}

/// Batch update request
#[derive(Debug, Deserialize, ToSchema)]
pub struct BatchToolUpdate {
    pub ids: Vec<String>,
    pub status: Option<String>,
    /// Calibration due date (YYYY-MM-DD)
    pub calibration_due: Option<String>,
}

/// Typed set of fields a batch update may touch
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ToolChanges {
    pub status: Option<ToolStatus>,
    pub calibration_due: Option<NaiveDate>,
}

impl ToolChanges {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.calibration_due.is_none()
    }
}

/// NFC tag assignment request
#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignTag {
    pub tag: String,
}

/// Query parameters for tool listing
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ToolQuery {
    /// Filter by status label (e.g. "In Use")
    pub status: Option<String>,
}

/// Per-tool usage figures handed to the calibration forecaster
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ToolUsageStats {
    pub tool_id: String,
    pub name: String,
    pub calibration_due: NaiveDate,
    pub total_checkouts: i32,
    pub total_usage_hours: f64,
    /// Average hours per check-out
    pub usage_density: f64,
}

impl From<&Tool> for ToolUsageStats {
    fn from(tool: &Tool) -> Self {
        Self {
            tool_id: tool.id.clone(),
            name: tool.name.clone(),
            calibration_due: tool.calibration_due,
            total_checkouts: tool.total_checkouts,
            total_usage_hours: tool.total_usage_hours,
            usage_density: tool.total_usage_hours / (f64::from(tool.total_checkouts) + 1.0),
        }
    }
}

/// An accepted forecaster recommendation
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CalibrationProposal {
    pub tool_id: String,
    pub recommended_date: NaiveDate,
    pub reason: Option<String>,
}

/// Outcome of applying a batch of calibration proposals
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ProposalOutcome {
    pub applied: Vec<String>,
    /// Proposals whose date was not earlier than the current one
    pub skipped: Vec<String>,
    pub missing: Vec<String>,
}

/// Month selector for the calibration calendar; defaults to the current month
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct CalendarQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

/// Number of tools due for calibration on a given day
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct CalibrationDay {
    pub date: NaiveDate,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn tool(due: NaiveDate) -> Tool {
        Tool::new("TW-001".into(), "Digital Torque Wrench".into(), None, due)
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_overdue_blocks_checkout_even_when_available() {
        let t = tool(day(2026, 5, 1));
        let err = t.ensure_can_check_out(day(2026, 5, 2)).unwrap_err();
        assert!(matches!(err, AppError::ToolOverdueForCalibration(_)));
        // Due today is still usable
        assert!(t.ensure_can_check_out(day(2026, 5, 1)).is_ok());
    }

    #[test]
    fn test_only_available_tools_can_be_checked_out() {
        let mut t = tool(day(2026, 12, 31));
        t.status = ToolStatus::PendingVerification;
        let err = t.ensure_can_check_out(day(2026, 5, 2)).unwrap_err();
        assert!(matches!(err, AppError::ToolNotAvailable(_)));
    }

    #[test]
    fn test_checkout_and_release_keep_holder_invariant() {
        let mut t = tool(day(2026, 12, 31));
        t.mark_checked_out("USR-002");
        assert!(t.holder_invariant_holds());
        assert_eq!(t.total_checkouts, 1);

        t.release(ToolStatus::UnderMaintenance, 1.5);
        assert!(t.holder_invariant_holds());
        assert_eq!(t.current_holder, None);
        assert!((t.total_usage_hours - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_apply_status_clears_holder() {
        let mut t = tool(day(2026, 12, 31));
        t.mark_checked_out("USR-002");
        t.apply_status(ToolStatus::Available).unwrap();
        assert_eq!(t.current_holder, None);
        assert!(t.holder_invariant_holds());
    }

    #[test]
    fn test_apply_in_use_requires_holder() {
        let mut t = tool(day(2026, 12, 31));
        assert!(matches!(
            t.apply_status(ToolStatus::InUse),
            Err(AppError::InvalidStatus(_))
        ));
        t.mark_checked_out("USR-003");
        assert!(t.apply_status(ToolStatus::InUse).is_ok());
        assert_eq!(t.current_holder.as_deref(), Some("USR-003"));
    }

    #[test]
    fn test_usage_hours_clamps_clock_skew() {
        let now = Utc.with_ymd_and_hms(2026, 5, 2, 12, 0, 0).unwrap();
        assert_eq!(usage_hours(Some(now + Duration::minutes(5)), now), 0.0);
        assert_eq!(usage_hours(None, now), 0.0);
        let h = usage_hours(Some(now - Duration::minutes(90)), now);
        assert!((h - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_usage_density() {
        let mut t = tool(day(2026, 12, 31));
        t.total_checkouts = 3;
        t.total_usage_hours = 12.0;
        let stats = ToolUsageStats::from(&t);
        assert!((stats.usage_density - 3.0).abs() < 1e-9);
    }
}
