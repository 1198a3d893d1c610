//! User model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::enums::UserRole;

/// User record (supervisor or technician)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    pub id: String,
    pub name: String,
    pub role: UserRole,
    /// Direct notification channel (Telegram chat id or e-mail address)
    pub contact_channel: Option<String>,
    /// Normalised NFC badge UID
    pub nfc_tag: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Create user request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUser {
    #[validate(required(message = "id is required"), length(min = 1, message = "id is required"))]
    pub id: Option<String>,
    #[validate(required(message = "name is required"), length(min = 1, message = "name is required"))]
    pub name: Option<String>,
    #[validate(required(message = "role is required"))]
    pub role: Option<String>,
    pub contact_channel: Option<String>,
    pub nfc_tag: Option<String>,
}

/// Update user request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateUser {
    #[validate(length(min = 1, message = "name cannot be empty"))]
    pub name: Option<String>,
    pub role: Option<String>,
    pub contact_channel: Option<String>,
}
