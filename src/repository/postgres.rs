//! Postgres store
//!
//! Read-check-write operations hold `SELECT ... FOR UPDATE` row locks for
//! the lifetime of the surrounding sqlx transaction, so two check-outs of
//! the same tool are serialized by the database.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{postgres::PgRow, FromRow, Pool, Postgres, Row};

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

/// Postgres-backed repository holding the connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

/// Build an [`OpenCheckout`] from the joined row of `open_checkouts`
fn open_checkout_from_row(row: &PgRow) -> Result<OpenCheckout, sqlx::Error> {
    let tool = Tool::from_row(row)?;
    let checkout = Transaction {
        id: row.try_get("tx_id")?,
        user_id: row.try_get("tx_user_id")?,
        tool_id: tool.id.clone(),
        kind: TransactionType::Checkout,
        timestamp: row.try_get("tx_timestamp")?,
        last_alert_sent: row.try_get("tx_last_alert_sent")?,
    };
    let holder = match row.try_get::<Option<String>, _>("u_id")? {
        Some(id) => Some(User {
            id,
            name: row.try_get("u_name")?,
            role: row.try_get("u_role")?,
            contact_channel: row.try_get("u_contact_channel")?,
            nfc_tag: row.try_get("u_nfc_tag")?,
            created_at: row.try_get("u_created_at")?,
        }),
        None => None,
    };
    Ok(OpenCheckout { tool, checkout, holder })
}

#[async_trait]
impl Store for Repository {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTx { tx }))
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn list_tools(&self, status: Option<ToolStatus>) -> AppResult<Vec<Tool>> {
        let tools = match status {
            Some(status) => {
                sqlx::query_as::<_, Tool>("SELECT * FROM tools WHERE status = $1 ORDER BY id")
                    .bind(status)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as::<_, Tool>("SELECT * FROM tools ORDER BY id")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(tools)
    }

    async fn get_tool(&self, id: &str) -> AppResult<Option<Tool>> {
        let tool = sqlx::query_as::<_, Tool>("SELECT * FROM tools WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tool)
    }

    async fn find_tool_by_tag(&self, tag: &str) -> AppResult<Option<Tool>> {
        let tool = sqlx::query_as::<_, Tool>("SELECT * FROM tools WHERE nfc_tag = $1")
            .bind(tag)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tool)
    }

    async fn tools_held_by(&self, user_id: &str) -> AppResult<Vec<Tool>> {
        let tools = sqlx::query_as::<_, Tool>(
            "SELECT * FROM tools WHERE current_holder = $1 ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tools)
    }

    async fn calibration_days(&self, from: NaiveDate, to: NaiveDate) -> AppResult<Vec<CalibrationDay>> {
        let days = sqlx::query_as::<_, CalibrationDay>(
            r#"
            SELECT calibration_due AS date, COUNT(*) AS count
            FROM tools
            WHERE calibration_due >= $1 AND calibration_due < $2
            GROUP BY calibration_due
            ORDER BY calibration_due
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(days)
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn get_user(&self, id: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_tag(&self, tag: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE nfc_tag = $1")
            .bind(tag)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn recent_transactions(&self, limit: i64) -> AppResult<Vec<TransactionDetails>> {
        let rows = sqlx::query_as::<_, TransactionDetails>(
            r#"
            SELECT tr.id, tr.user_id, u.name AS user_name,
                   tr.tool_id, t.name AS tool_name, tr.kind, tr.timestamp
            FROM transactions tr
            LEFT JOIN users u ON u.id = tr.user_id
            LEFT JOIN tools t ON t.id = tr.tool_id
            ORDER BY tr.timestamp DESC, tr.id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn open_checkouts(&self) -> AppResult<Vec<OpenCheckout>> {
        let rows = sqlx::query(
            r#"
            SELECT t.*,
                   tr.id AS tx_id, tr.user_id AS tx_user_id,
                   tr.timestamp AS tx_timestamp, tr.last_alert_sent AS tx_last_alert_sent,
                   u.id AS u_id, u.name AS u_name, u.role AS u_role,
                   u.contact_channel AS u_contact_channel, u.nfc_tag AS u_nfc_tag,
                   u.created_at AS u_created_at
            FROM tools t
            JOIN transactions tr ON tr.id = (
                SELECT MAX(id) FROM transactions
                WHERE tool_id = t.id AND kind = 'checkout'
            )
            LEFT JOIN users u ON u.id = t.current_holder
            WHERE t.status = 'In Use'
            ORDER BY tr.timestamp ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let open = rows
            .iter()
            .map(open_checkout_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(open)
    }

    async fn swap_alert_marker(
        &self,
        transaction_id: i64,
        expected: Option<DateTime<Utc>>,
        new: Option<DateTime<Utc>>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transactions SET last_alert_sent = $1
            WHERE id = $2 AND kind = 'checkout' AND last_alert_sent IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(new)
        .bind(transaction_id)
        .bind(expected)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_issues(&self, status: Option<IssueStatus>) -> AppResult<Vec<IssueReport>> {
        let issues = match status {
            Some(status) => {
                sqlx::query_as::<_, IssueReport>(
                    "SELECT * FROM issue_reports WHERE status = $1 ORDER BY created_at DESC",
                )
                .bind(status)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, IssueReport>(
                    "SELECT * FROM issue_reports ORDER BY created_at DESC",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(issues)
    }

    async fn get_issue(&self, id: &str) -> AppResult<Option<IssueReport>> {
        let issue = sqlx::query_as::<_, IssueReport>("SELECT * FROM issue_reports WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(issue)
    }

    async fn append_audit(&self, event: NewAuditEvent) -> AppResult<AuditEvent> {
        let row = sqlx::query_as::<_, AuditEvent>(
            r#"
            INSERT INTO audit_log (actor_user_id, action, details, timestamp)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&event.actor_user_id)
        .bind(event.action)
        .bind(&event.details)
        .bind(event.timestamp)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn audit_trail(&self, limit: i64) -> AppResult<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditEntry>(
            r#"
            SELECT a.id, a.actor_user_id, u.name AS user_name,
                   a.action, a.details, a.timestamp
            FROM audit_log a
            LEFT JOIN users u ON u.id = a.actor_user_id
            ORDER BY a.timestamp DESC, a.id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// Unit of work over a sqlx transaction; rolled back on drop
pub struct PgStoreTx {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn lock_tool(&mut self, id: &str) -> AppResult<Option<Tool>> {
        let tool = sqlx::query_as::<_, Tool>("SELECT * FROM tools WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(tool)
    }

    async fn insert_tool(&mut self, tool: &Tool) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO tools (
                id, name, model, status, current_holder, calibration_due,
                total_checkouts, total_usage_hours, nfc_tag
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&tool.id)
        .bind(&tool.name)
        .bind(&tool.model)
        .bind(tool.status)
        .bind(&tool.current_holder)
        .bind(tool.calibration_due)
        .bind(tool.total_checkouts)
        .bind(tool.total_usage_hours)
        .bind(&tool.nfc_tag)
        .execute(&mut *self.tx)
        .await
        .map_err(AppError::from_store)?;

        if result.rows_affected() == 0 {
            return Err(AppError::DuplicateId(format!("Tool ID {} already exists", tool.id)));
        }
        Ok(())
    }

    async fn save_tool(&mut self, tool: &Tool) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE tools
            SET name = $2, model = $3, status = $4, current_holder = $5,
                calibration_due = $6, total_checkouts = $7,
                total_usage_hours = $8, nfc_tag = $9
            WHERE id = $1
            "#,
        )
        .bind(&tool.id)
        .bind(&tool.name)
        .bind(&tool.model)
        .bind(tool.status)
        .bind(&tool.current_holder)
        .bind(tool.calibration_due)
        .bind(tool.total_checkouts)
        .bind(tool.total_usage_hours)
        .bind(&tool.nfc_tag)
        .execute(&mut *self.tx)
        .await
        .map_err(AppError::from_store)?;
        Ok(())
    }

    async fn delete_tool(&mut self, id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM tools WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(AppError::from_store)?;
        Ok(result.rows_affected() > 0)
    }

    async fn latest_checkout(&mut self, tool_id: &str) -> AppResult<Option<Transaction>> {
        let tx = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT * FROM transactions
            WHERE tool_id = $1 AND kind = 'checkout'
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(tool_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(tx)
    }

    async fn append_transaction(&mut self, new: NewTransaction) -> AppResult<Transaction> {
        let tx = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions (user_id, tool_id, kind, timestamp)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&new.user_id)
        .bind(&new.tool_id)
        .bind(new.kind)
        .bind(new.timestamp)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(AppError::from_store)?;
        Ok(tx)
    }

    async fn lock_user(&mut self, id: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(user)
    }

    async fn insert_user(&mut self, user: &User) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (id, name, role, contact_channel, nfc_tag, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(user.role)
        .bind(&user.contact_channel)
        .bind(&user.nfc_tag)
        .bind(user.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(AppError::from_store)?;

        if result.rows_affected() == 0 {
            return Err(AppError::DuplicateId(format!("User ID {} already exists", user.id)));
        }
        Ok(())
    }

    async fn save_user(&mut self, user: &User) -> AppResult<()> {
        sqlx::query(
            "UPDATE users SET name = $2, role = $3, contact_channel = $4, nfc_tag = $5 WHERE id = $1",
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(user.role)
        .bind(&user.contact_channel)
        .bind(&user.nfc_tag)
        .execute(&mut *self.tx)
        .await
        .map_err(AppError::from_store)?;
        Ok(())
    }

    async fn delete_user(&mut self, id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(AppError::from_store)?;
        Ok(result.rows_affected() > 0)
    }

    async fn user_holds_tools(&mut self, user_id: &str) -> AppResult<bool> {
        let holds: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM tools WHERE current_holder = $1)")
                .bind(user_id)
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(holds)
    }

    async fn insert_issue(&mut self, issue: &IssueReport) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO issue_reports (
                id, tool_id, reporter_id, defect_type, description,
                status, created_at, closed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&issue.id)
        .bind(&issue.tool_id)
        .bind(&issue.reporter_id)
        .bind(&issue.defect_type)
        .bind(&issue.description)
        .bind(issue.status)
        .bind(issue.created_at)
        .bind(issue.closed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(AppError::from_store)?;
        Ok(())
    }

    async fn lock_issue(&mut self, id: &str) -> AppResult<Option<IssueReport>> {
        let issue = sqlx::query_as::<_, IssueReport>(
            "SELECT * FROM issue_reports WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(issue)
    }

    async fn save_issue(&mut self, issue: &IssueReport) -> AppResult<()> {
        sqlx::query("UPDATE issue_reports SET status = $2, closed_at = $3 WHERE id = $1")
            .bind(&issue.id)
            .bind(issue.status)
            .bind(issue.closed_at)
            .execute(&mut *self.tx)
            .await
            .map_err(AppError::from_store)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await.map_err(AppError::from_store)
    }
}
