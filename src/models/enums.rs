//! Shared domain enums, stored as text columns

use serde::{Deserialize, Serialize};
use sqlx::{
    encode::IsNull,
    error::BoxDynError,
    postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef},
    Decode, Encode, Postgres,
};
use utoipa::ToSchema;

/// SQLx conversion for enums persisted through their `as_str` label
macro_rules! text_column {
    ($ty:ty) => {
        impl sqlx::Type<Postgres> for $ty {
            fn type_info() -> PgTypeInfo {
                <String as sqlx::Type<Postgres>>::type_info()
            }

            fn compatible(ty: &PgTypeInfo) -> bool {
                <String as sqlx::Type<Postgres>>::compatible(ty)
            }
        }

        impl<'r> Decode<'r, Postgres> for $ty {
            fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
                let s: String = Decode::<Postgres>::decode(value)?;
                s.parse().map_err(|e: String| e.into())
            }
        }

        impl Encode<'_, Postgres> for $ty {
            fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> IsNull {
                <String as Encode<Postgres>>::encode(self.as_str().to_string(), buf)
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }
    };
}

/// Lowercase and drop separators so "In Use", "in_use" and "InUse" compare equal
fn fold(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

// ---------------------------------------------------------------------------
// ToolStatus
// ---------------------------------------------------------------------------

/// Tool lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum ToolStatus {
    #[serde(rename = "Available")]
    Available,
    #[serde(rename = "In Use")]
    InUse,
    /// Advisory: calibration date has passed
    #[serde(rename = "Overdue")]
    Overdue,
    #[serde(rename = "Under Maintenance")]
    UnderMaintenance,
    #[serde(rename = "Pending Verification")]
    PendingVerification,
}

impl ToolStatus {
    pub const ALL: [ToolStatus; 5] = [
        ToolStatus::Available,
        ToolStatus::InUse,
        ToolStatus::Overdue,
        ToolStatus::UnderMaintenance,
        ToolStatus::PendingVerification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Available => "Available",
            ToolStatus::InUse => "In Use",
            ToolStatus::Overdue => "Overdue",
            ToolStatus::UnderMaintenance => "Under Maintenance",
            ToolStatus::PendingVerification => "Pending Verification",
        }
    }
}

impl std::str::FromStr for ToolStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded = fold(s);
        ToolStatus::ALL
            .into_iter()
            .find(|status| fold(status.as_str()) == folded)
            .ok_or_else(|| format!("Invalid tool status: {}", s))
    }
}

text_column!(ToolStatus);

// ---------------------------------------------------------------------------
// UserRole
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum UserRole {
    Supervisor,
    Technician,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Supervisor => "Supervisor",
            UserRole::Technician => "Technician",
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match fold(s).as_str() {
            "supervisor" => Ok(UserRole::Supervisor),
            "technician" => Ok(UserRole::Technician),
            _ => Err(format!("Invalid user role: {}", s)),
        }
    }
}

text_column!(UserRole);

// ---------------------------------------------------------------------------
// TransactionType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Checkout,
    Checkin,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Checkout => "checkout",
            TransactionType::Checkin => "checkin",
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match fold(s).as_str() {
            "checkout" => Ok(TransactionType::Checkout),
            "checkin" => Ok(TransactionType::Checkin),
            _ => Err(format!("Invalid transaction type: {}", s)),
        }
    }
}

text_column!(TransactionType);

// ---------------------------------------------------------------------------
// IssueStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum IssueStatus {
    New,
    Closed,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::New => "New",
            IssueStatus::Closed => "Closed",
        }
    }
}

impl std::str::FromStr for IssueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match fold(s).as_str() {
            "new" => Ok(IssueStatus::New),
            "closed" => Ok(IssueStatus::Closed),
            _ => Err(format!("Invalid issue status: {}", s)),
        }
    }
}

text_column!(IssueStatus);

// ---------------------------------------------------------------------------
// AuditAction
// ---------------------------------------------------------------------------

/// Actions recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    ToolCreated,
    ToolUpdated,
    ToolDeleted,
    ToolStatusChanged,
    ToolsBatchUpdated,
    ToolTagAssigned,
    ToolCheckout,
    ToolCheckin,
    IssueReported,
    IssueClosed,
    UserCreated,
    UserUpdated,
    UserDeleted,
    UserTagAssigned,
    CalibrationRescheduled,
    EmergencyUnlock,
    NfcSessionEnded,
}

impl AuditAction {
    pub const ALL: [AuditAction; 17] = [
        AuditAction::ToolCreated,
        AuditAction::ToolUpdated,
        AuditAction::ToolDeleted,
        AuditAction::ToolStatusChanged,
        AuditAction::ToolsBatchUpdated,
        AuditAction::ToolTagAssigned,
        AuditAction::ToolCheckout,
        AuditAction::ToolCheckin,
        AuditAction::IssueReported,
        AuditAction::IssueClosed,
        AuditAction::UserCreated,
        AuditAction::UserUpdated,
        AuditAction::UserDeleted,
        AuditAction::UserTagAssigned,
        AuditAction::CalibrationRescheduled,
        AuditAction::EmergencyUnlock,
        AuditAction::NfcSessionEnded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::ToolCreated => "TOOL_CREATED",
            AuditAction::ToolUpdated => "TOOL_UPDATED",
            AuditAction::ToolDeleted => "TOOL_DELETED",
            AuditAction::ToolStatusChanged => "TOOL_STATUS_CHANGED",
            AuditAction::ToolsBatchUpdated => "TOOLS_BATCH_UPDATED",
            AuditAction::ToolTagAssigned => "TOOL_TAG_ASSIGNED",
            AuditAction::ToolCheckout => "TOOL_CHECKOUT",
            AuditAction::ToolCheckin => "TOOL_CHECKIN",
            AuditAction::IssueReported => "ISSUE_REPORTED",
            AuditAction::IssueClosed => "ISSUE_CLOSED",
            AuditAction::UserCreated => "USER_CREATED",
            AuditAction::UserUpdated => "USER_UPDATED",
            AuditAction::UserDeleted => "USER_DELETED",
            AuditAction::UserTagAssigned => "USER_TAG_ASSIGNED",
            AuditAction::CalibrationRescheduled => "CALIBRATION_RESCHEDULED",
            AuditAction::EmergencyUnlock => "EMERGENCY_UNLOCK",
            AuditAction::NfcSessionEnded => "NFC_SESSION_ENDED",
        }
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditAction::ALL
            .into_iter()
            .find(|action| action.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Invalid audit action: {}", s))
    }
}

text_column!(AuditAction);
