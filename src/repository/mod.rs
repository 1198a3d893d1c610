//! Repository layer: the transactional store behind the services
//!
//! Reads that only feed listings go straight through [`Store`]. Anything
//! that reads state, checks it and writes it back runs inside a
//! [`StoreTx`]: rows fetched with a `lock_*` method stay locked until the
//! unit is committed or dropped, and dropping without `commit` discards
//! every write made through it.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    error::AppResult,
    models::{
        audit::AuditEntry,
        checkout::OpenCheckout,
        tool::CalibrationDay,
        transaction::TransactionDetails,
        AuditEvent, IssueReport, IssueStatus, NewAuditEvent, NewTransaction, Tool, ToolStatus,
        Transaction, User,
    },
};

pub use memory::MemoryStore;
pub use postgres::Repository;

#[async_trait]
pub trait Store: Send + Sync {
    /// Open an atomic unit of work
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>>;

    /// Cheap connectivity probe
    async fn ping(&self) -> AppResult<()>;

    async fn list_tools(&self, status: Option<ToolStatus>) -> AppResult<Vec<Tool>>;
    async fn get_tool(&self, id: &str) -> AppResult<Option<Tool>>;
    async fn find_tool_by_tag(&self, tag: &str) -> AppResult<Option<Tool>>;
    async fn tools_held_by(&self, user_id: &str) -> AppResult<Vec<Tool>>;
    async fn calibration_days(&self, from: NaiveDate, to: NaiveDate) -> AppResult<Vec<CalibrationDay>>;

    async fn list_users(&self) -> AppResult<Vec<User>>;
    async fn get_user(&self, id: &str) -> AppResult<Option<User>>;
    async fn find_user_by_tag(&self, tag: &str) -> AppResult<Option<User>>;

    async fn recent_transactions(&self, limit: i64) -> AppResult<Vec<TransactionDetails>>;
    /// Every "In Use" tool joined with its latest check-out transaction
    async fn open_checkouts(&self) -> AppResult<Vec<OpenCheckout>>;
    /// Compare-and-swap of a check-out's `last_alert_sent` marker.
    ///
    /// Writes `new` only if the stored marker still equals `expected` and
    /// returns whether it did, so concurrent alert scans cannot both claim
    /// the same notice.
    async fn swap_alert_marker(
        &self,
        transaction_id: i64,
        expected: Option<DateTime<Utc>>,
        new: Option<DateTime<Utc>>,
    ) -> AppResult<bool>;

    async fn list_issues(&self, status: Option<IssueStatus>) -> AppResult<Vec<IssueReport>>;
    async fn get_issue(&self, id: &str) -> AppResult<Option<IssueReport>>;

    async fn append_audit(&self, event: NewAuditEvent) -> AppResult<AuditEvent>;
    async fn audit_trail(&self, limit: i64) -> AppResult<Vec<AuditEntry>>;
}

#[async_trait]
pub trait StoreTx: Send {
    async fn lock_tool(&mut self, id: &str) -> AppResult<Option<Tool>>;
    /// Fails with `DuplicateId` when the id is taken
    async fn insert_tool(&mut self, tool: &Tool) -> AppResult<()>;
    async fn save_tool(&mut self, tool: &Tool) -> AppResult<()>;
    async fn delete_tool(&mut self, id: &str) -> AppResult<bool>;

    /// Latest check-out (highest id) recorded for a tool
    async fn latest_checkout(&mut self, tool_id: &str) -> AppResult<Option<Transaction>>;
    async fn append_transaction(&mut self, tx: NewTransaction) -> AppResult<Transaction>;

    async fn lock_user(&mut self, id: &str) -> AppResult<Option<User>>;
    /// Fails with `DuplicateId` when the id is taken
    async fn insert_user(&mut self, user: &User) -> AppResult<()>;
    async fn save_user(&mut self, user: &User) -> AppResult<()>;
    async fn delete_user(&mut self, id: &str) -> AppResult<bool>;
    async fn user_holds_tools(&mut self, user_id: &str) -> AppResult<bool>;

    async fn insert_issue(&mut self, issue: &IssueReport) -> AppResult<()>;
    async fn lock_issue(&mut self, id: &str) -> AppResult<Option<IssueReport>>;
    async fn save_issue(&mut self, issue: &IssueReport) -> AppResult<()>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}
