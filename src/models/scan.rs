//! Identity bridge scan types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Device session used when the bridge does not send one
pub const DEFAULT_DEVICE: &str = "default";

/// Latest tag seen by a reader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Scan {
    pub device: String,
    /// Normalised tag UID
    pub tag: String,
    /// Resolved user, when the tag belongs to one
    pub user_id: Option<String>,
    pub scanned_at: DateTime<Utc>,
}

/// Scan request from a reader
#[derive(Debug, Deserialize, ToSchema)]
pub struct ScanRequest {
    pub uid: String,
    pub device: Option<String>,
}

/// Session end request
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SessionEndRequest {
    pub device: Option<String>,
}

/// Tag resolution request
#[derive(Debug, Deserialize, ToSchema)]
pub struct ResolveRequest {
    pub tag: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum IdentityKind {
    User,
    Tool,
}

/// Identifier a tag resolves to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ResolvedIdentity {
    pub kind: IdentityKind,
    pub id: String,
}

/// Query parameters for reading the latest scan
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct DeviceQuery {
    pub device: Option<String>,
}
