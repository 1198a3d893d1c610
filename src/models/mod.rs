//! Data models for Toolcrib

pub mod alert;
pub mod audit;
pub mod checkout;
pub mod enums;
pub mod issue;
pub mod scan;
pub mod tool;
pub mod transaction;
pub mod user;

// Re-export commonly used types
pub use alert::{AlertReport, AlertTier};
pub use audit::{AuditEvent, NewAuditEvent, SYSTEM_ACTOR};
pub use checkout::{BatchCheckoutReport, OpenCheckout};
pub use enums::{AuditAction, IssueStatus, ToolStatus, TransactionType, UserRole};
pub use issue::IssueReport;
pub use tool::Tool;
pub use transaction::{NewTransaction, Transaction};
pub use user::User;
