//! In-process store
//!
//! Backs the server when `database.backend = "memory"` and the service and
//! API tests. A unit of work takes the state mutex for its whole lifetime
//! and edits a private copy, which `commit` swaps in.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{Store, StoreTx};
use crate::{
    error::{AppError, AppResult},
    models::{
        audit::AuditEntry,
        checkout::OpenCheckout,
        tool::CalibrationDay,
        transaction::TransactionDetails,
        AuditEvent, IssueReport, IssueStatus, NewAuditEvent, NewTransaction, Tool, ToolStatus,
        Transaction, TransactionType, User,
    },
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    tools: BTreeMap<String, Tool>,
    users: BTreeMap<String, User>,
    transactions: Vec<Transaction>,
    issues: BTreeMap<String, IssueReport>,
    audit: Vec<AuditEvent>,
}

impl MemoryState {
    fn latest_checkout(&self, tool_id: &str) -> Option<&Transaction> {
        self.transactions
            .iter()
            .filter(|t| t.tool_id == tool_id && t.kind == TransactionType::Checkout)
            .max_by_key(|t| t.id)
    }

    /// Row constraints the Postgres schema enforces on `tools`
    fn check_tool(&self, tool: &Tool) -> AppResult<()> {
        if !tool.holder_invariant_holds() {
            return Err(AppError::Conflict(format!(
                "tool {} violates the holder/status constraint",
                tool.id
            )));
        }
        if let Some(holder) = &tool.current_holder {
            if !self.users.contains_key(holder) {
                return Err(AppError::Conflict(format!("holder {} does not exist", holder)));
            }
        }
        if let Some(tag) = &tool.nfc_tag {
            if self
                .tools
                .values()
                .any(|t| t.id != tool.id && t.nfc_tag.as_deref() == Some(tag))
            {
                return Err(AppError::Conflict(format!("tag {} is already assigned", tag)));
            }
        }
        Ok(())
    }

    fn check_user(&self, user: &User) -> AppResult<()> {
        if let Some(tag) = &user.nfc_tag {
            if self
                .users
                .values()
                .any(|u| u.id != user.id && u.nfc_tag.as_deref() == Some(tag))
            {
                return Err(AppError::Conflict(format!("tag {} is already assigned", tag)));
            }
        }
        Ok(())
    }
}

/// Shared in-memory store; clones see the same data
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_audit: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every audit append fail, to exercise best-effort auditing
    pub fn fail_audit_writes(&self, fail: bool) {
        self.fail_audit.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn list_tools(&self, status: Option<ToolStatus>) -> AppResult<Vec<Tool>> {
        let state = self.state.lock().await;
        Ok(state
            .tools
            .values()
            .filter(|t| status.map_or(true, |s| t.status == s))
            .cloned()
            .collect())
    }

    async fn get_tool(&self, id: &str) -> AppResult<Option<Tool>> {
        Ok(self.state.lock().await.tools.get(id).cloned())
    }

    async fn find_tool_by_tag(&self, tag: &str) -> AppResult<Option<Tool>> {
        let state = self.state.lock().await;
        Ok(state
            .tools
            .values()
            .find(|t| t.nfc_tag.as_deref() == Some(tag))
            .cloned())
    }

    async fn tools_held_by(&self, user_id: &str) -> AppResult<Vec<Tool>> {
        let state = self.state.lock().await;
        Ok(state
            .tools
            .values()
            .filter(|t| t.current_holder.as_deref() == Some(user_id))
            .cloned()
            .collect())
    }

    async fn calibration_days(&self, from: NaiveDate, to: NaiveDate) -> AppResult<Vec<CalibrationDay>> {
        let state = self.state.lock().await;
        let mut days: BTreeMap<NaiveDate, i64> = BTreeMap::new();
        for tool in state.tools.values() {
            if tool.calibration_due >= from && tool.calibration_due < to {
                *days.entry(tool.calibration_due).or_default() += 1;
            }
        }
        Ok(days
            .into_iter()
            .map(|(date, count)| CalibrationDay { date, count })
            .collect())
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        Ok(self.state.lock().await.users.values().cloned().collect())
    }

    async fn get_user(&self, id: &str) -> AppResult<Option<User>> {
        Ok(self.state.lock().await.users.get(id).cloned())
    }

    async fn find_user_by_tag(&self, tag: &str) -> AppResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|u| u.nfc_tag.as_deref() == Some(tag))
            .cloned())
    }

    async fn recent_transactions(&self, limit: i64) -> AppResult<Vec<TransactionDetails>> {
        let state = self.state.lock().await;
        let mut rows: Vec<&Transaction> = state.transactions.iter().collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(rows
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|t| TransactionDetails {
                id: t.id,
                user_id: t.user_id.clone(),
                user_name: state.users.get(&t.user_id).map(|u| u.name.clone()),
                tool_id: t.tool_id.clone(),
                tool_name: state.tools.get(&t.tool_id).map(|tool| tool.name.clone()),
                kind: t.kind,
                timestamp: t.timestamp,
            })
            .collect())
    }

    async fn open_checkouts(&self) -> AppResult<Vec<OpenCheckout>> {
        let state = self.state.lock().await;
        let mut open: Vec<OpenCheckout> = state
            .tools
            .values()
            .filter(|t| t.status == ToolStatus::InUse)
            .filter_map(|tool| {
                let checkout = state.latest_checkout(&tool.id)?.clone();
                let holder = tool
                    .current_holder
                    .as_ref()
                    .and_then(|id| state.users.get(id))
                    .cloned();
                Some(OpenCheckout {
                    tool: tool.clone(),
                    checkout,
                    holder,
                })
            })
            .collect();
        open.sort_by_key(|o| o.checkout.timestamp);
        Ok(open)
    }

    async fn swap_alert_marker(
        &self,
        transaction_id: i64,
        expected: Option<DateTime<Utc>>,
        new: Option<DateTime<Utc>>,
    ) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        match state
            .transactions
            .iter_mut()
            .find(|t| t.id == transaction_id && t.kind == TransactionType::Checkout)
        {
            Some(tx) if tx.last_alert_sent == expected => {
                tx.last_alert_sent = new;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_issues(&self, status: Option<IssueStatus>) -> AppResult<Vec<IssueReport>> {
        let state = self.state.lock().await;
        let mut issues: Vec<IssueReport> = state
            .issues
            .values()
            .filter(|i| status.map_or(true, |s| i.status == s))
            .cloned()
            .collect();
        issues.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(issues)
    }

    async fn get_issue(&self, id: &str) -> AppResult<Option<IssueReport>> {
        Ok(self.state.lock().await.issues.get(id).cloned())
    }

    async fn append_audit(&self, event: NewAuditEvent) -> AppResult<AuditEvent> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(AppError::Internal("audit log unavailable".to_string()));
        }
        let mut state = self.state.lock().await;
        let stored = AuditEvent {
            id: state.audit.len() as i64 + 1,
            actor_user_id: event.actor_user_id,
            action: event.action,
            details: event.details,
            timestamp: event.timestamp,
        };
        state.audit.push(stored.clone());
        Ok(stored)
    }

    async fn audit_trail(&self, limit: i64) -> AppResult<Vec<AuditEntry>> {
        let state = self.state.lock().await;
        let mut rows: Vec<&AuditEvent> = state.audit.iter().collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(rows
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|e| AuditEntry {
                id: e.id,
                actor_user_id: e.actor_user_id.clone(),
                user_name: state.users.get(&e.actor_user_id).map(|u| u.name.clone()),
                action: e.action,
                details: e.details.clone(),
                timestamp: e.timestamp,
            })
            .collect())
    }
}

/// Unit of work holding the store lock; dropping it discards `working`
pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_tool(&mut self, id: &str) -> AppResult<Option<Tool>> {
        Ok(self.working.tools.get(id).cloned())
    }

    async fn insert_tool(&mut self, tool: &Tool) -> AppResult<()> {
        if self.working.tools.contains_key(&tool.id) {
            return Err(AppError::DuplicateId(format!("Tool ID {} already exists", tool.id)));
        }
        self.working.check_tool(tool)?;
        self.working.tools.insert(tool.id.clone(), tool.clone());
        Ok(())
    }

    async fn save_tool(&mut self, tool: &Tool) -> AppResult<()> {
        if !self.working.tools.contains_key(&tool.id) {
            return Ok(());
        }
        self.working.check_tool(tool)?;
        self.working.tools.insert(tool.id.clone(), tool.clone());
        Ok(())
    }

    async fn delete_tool(&mut self, id: &str) -> AppResult<bool> {
        Ok(self.working.tools.remove(id).is_some())
    }

    async fn latest_checkout(&mut self, tool_id: &str) -> AppResult<Option<Transaction>> {
        Ok(self.working.latest_checkout(tool_id).cloned())
    }

    async fn append_transaction(&mut self, new: NewTransaction) -> AppResult<Transaction> {
        let next_id = self.working.transactions.iter().map(|t| t.id).max().unwrap_or(0) + 1;
        let tx = Transaction {
            id: next_id,
            user_id: new.user_id,
            tool_id: new.tool_id,
            kind: new.kind,
            timestamp: new.timestamp,
            last_alert_sent: None,
        };
        self.working.transactions.push(tx.clone());
        Ok(tx)
    }

    async fn lock_user(&mut self, id: &str) -> AppResult<Option<User>> {
        Ok(self.working.users.get(id).cloned())
    }

    async fn insert_user(&mut self, user: &User) -> AppResult<()> {
        if self.working.users.contains_key(&user.id) {
            return Err(AppError::DuplicateId(format!("User ID {} already exists", user.id)));
        }
        self.working.check_user(user)?;
        self.working.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn save_user(&mut self, user: &User) -> AppResult<()> {
        if !self.working.users.contains_key(&user.id) {
            return Ok(());
        }
        self.working.check_user(user)?;
        self.working.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn delete_user(&mut self, id: &str) -> AppResult<bool> {
        if self
            .working
            .tools
            .values()
            .any(|t| t.current_holder.as_deref() == Some(id))
        {
            return Err(AppError::Conflict(format!("user {} is referenced by tools", id)));
        }
        Ok(self.working.users.remove(id).is_some())
    }

    async fn user_holds_tools(&mut self, user_id: &str) -> AppResult<bool> {
        Ok(self
            .working
            .tools
            .values()
            .any(|t| t.current_holder.as_deref() == Some(user_id)))
    }

    async fn insert_issue(&mut self, issue: &IssueReport) -> AppResult<()> {
        if self.working.issues.contains_key(&issue.id) {
            return Err(AppError::Conflict(format!("issue {} already exists", issue.id)));
        }
        self.working.issues.insert(issue.id.clone(), issue.clone());
        Ok(())
    }

    async fn lock_issue(&mut self, id: &str) -> AppResult<Option<IssueReport>> {
        Ok(self.working.issues.get(id).cloned())
    }

    async fn save_issue(&mut self, issue: &IssueReport) -> AppResult<()> {
        if let Some(existing) = self.working.issues.get_mut(&issue.id) {
            existing.status = issue.status;
            existing.closed_at = issue.closed_at;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
