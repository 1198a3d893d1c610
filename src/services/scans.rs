//! Identity bridge: NFC scans and tag resolution
//!
//! Readers post raw tag UIDs. The latest scan per device session sits in a
//! single-slot mailbox with a short TTL so a client can poll for it; an
//! expired slot reads as empty.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use redis::{AsyncCommands, Client};
use regex::Regex;
use serde_json::json;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;

use super::audit::AuditLogger;
use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::{
        scan::{IdentityKind, ResolvedIdentity, Scan, DEFAULT_DEVICE},
        AuditAction, SYSTEM_ACTOR,
    },
    repository::Store,
};

static HEX_BYTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:0[xX])?([0-9a-fA-F]{1,2})$").expect("valid regex"));

static HEX_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:0[xX])?((?:[0-9a-fA-F]{2})+)$").expect("valid regex"));

/// Canonical form of a tag UID: lowercase two-digit hex bytes joined by
/// single spaces.
///
/// Accepts bytes with or without `0x`, separated by spaces, colons, dashes
/// or commas, or a single unseparated even-length run (`D4814D05`).
pub fn normalize_tag(raw: &str) -> AppResult<String> {
    let tokens: Vec<&str> = raw
        .split(|c: char| c.is_whitespace() || matches!(c, ':' | '-' | ','))
        .filter(|t| !t.is_empty())
        .collect();

    let invalid = || AppError::Validation(format!("Invalid tag UID: {}", raw));

    if tokens.is_empty() {
        return Err(invalid());
    }

    let mut bytes = Vec::new();
    if tokens.len() == 1 && !HEX_BYTE.is_match(tokens[0]) {
        let caps = HEX_RUN.captures(tokens[0]).ok_or_else(invalid)?;
        let run = &caps[1];
        for i in (0..run.len()).step_by(2) {
            bytes.push(u8::from_str_radix(&run[i..i + 2], 16).map_err(|_| invalid())?);
        }
    } else {
        for token in tokens {
            let caps = HEX_BYTE.captures(token).ok_or_else(invalid)?;
            bytes.push(u8::from_str_radix(&caps[1], 16).map_err(|_| invalid())?);
        }
    }

    Ok(bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" "))
}

/// Single-slot mailbox keyed by device session
#[async_trait]
pub trait ScanMailbox: Send + Sync {
    async fn put(&self, scan: &Scan) -> AppResult<()>;
    async fn latest(&self, device: &str) -> AppResult<Option<Scan>>;
    async fn clear(&self, device: &str) -> AppResult<()>;
}

/// In-process mailbox; expiry is checked on read and expired slots are
/// dropped on every write
pub struct MemoryScanMailbox {
    slots: RwLock<HashMap<String, Scan>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl MemoryScanMailbox {
    pub fn new(ttl_secs: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            ttl: Duration::seconds(ttl_secs as i64),
            clock,
        }
    }

    fn is_fresh(&self, scan: &Scan, now: DateTime<Utc>) -> bool {
        now - scan.scanned_at < self.ttl
    }

    #[cfg(test)]
    async fn slot_count(&self) -> usize {
        self.slots.read().await.len()
    }
}

#[async_trait]
impl ScanMailbox for MemoryScanMailbox {
    async fn put(&self, scan: &Scan) -> AppResult<()> {
        let now = self.clock.now();
        let mut slots = self.slots.write().await;
        slots.retain(|_, held| self.is_fresh(held, now));
        slots.insert(scan.device.clone(), scan.clone());
        Ok(())
    }

    async fn latest(&self, device: &str) -> AppResult<Option<Scan>> {
        let now = self.clock.now();
        let slots = self.slots.read().await;
        Ok(slots.get(device).filter(|scan| self.is_fresh(scan, now)).cloned())
    }

    async fn clear(&self, device: &str) -> AppResult<()> {
        self.slots.write().await.remove(device);
        Ok(())
    }
}

/// Redis mailbox; expiry is handled by `SET EX`
#[derive(Clone)]
pub struct RedisScanMailbox {
    client: Client,
    ttl_secs: u64,
}

impl RedisScanMailbox {
    /// Connect and check the server answers
    pub async fn new(url: &str, ttl_secs: u64) -> AppResult<Self> {
        let client = Client::open(url)
            .map_err(|e| AppError::Internal(format!("Failed to create Redis client: {}", e)))?;

        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to connect to Redis: {}", e)))?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Redis connection test failed: {}", e)))?;

        Ok(Self { client, ttl_secs })
    }

    fn key(device: &str) -> String {
        format!("nfc:scan:{}", device)
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get Redis connection: {}", e)))
    }
}

#[async_trait]
impl ScanMailbox for RedisScanMailbox {
    async fn put(&self, scan: &Scan) -> AppResult<()> {
        let payload = serde_json::to_string(scan)
            .map_err(|e| AppError::Internal(format!("Failed to encode scan: {}", e)))?;
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(Self::key(&scan.device), payload, self.ttl_secs)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to store scan in Redis: {}", e)))?;
        Ok(())
    }

    async fn latest(&self, device: &str) -> AppResult<Option<Scan>> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn
            .get(Self::key(device))
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read scan from Redis: {}", e)))?;

        match payload {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| AppError::Internal(format!("Corrupt scan in Redis: {}", e))),
            None => Ok(None),
        }
    }

    async fn clear(&self, device: &str) -> AppResult<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(Self::key(device))
            .await
            .map_err(|e| AppError::Internal(format!("Failed to clear scan in Redis: {}", e)))?;
        Ok(())
    }
}

fn device_or_default(device: Option<&str>) -> String {
    device
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(DEFAULT_DEVICE)
        .to_string()
}

#[derive(Clone)]
pub struct ScanService {
    store: Arc<dyn Store>,
    mailbox: Arc<dyn ScanMailbox>,
    clock: Arc<dyn Clock>,
    audit: AuditLogger,
}

impl ScanService {
    pub fn new(
        store: Arc<dyn Store>,
        mailbox: Arc<dyn ScanMailbox>,
        clock: Arc<dyn Clock>,
        audit: AuditLogger,
    ) -> Self {
        Self {
            store,
            mailbox,
            clock,
            audit,
        }
    }

    /// Record a badge scan and resolve it to a user.
    ///
    /// Unknown tags are still placed in the mailbox, so a tagging station
    /// can pick them up, but the scan itself is refused.
    pub async fn scan(&self, uid: &str, device: Option<&str>) -> AppResult<Scan> {
        let tag = normalize_tag(uid)?;
        let user = self.store.find_user_by_tag(&tag).await?;

        let scan = Scan {
            device: device_or_default(device),
            tag: tag.clone(),
            user_id: user.as_ref().map(|u| u.id.clone()),
            scanned_at: self.clock.now(),
        };
        self.mailbox.put(&scan).await?;

        match user {
            Some(user) => {
                tracing::info!(device = %scan.device, user = %user.id, "badge scanned");
                Ok(scan)
            }
            None => {
                tracing::info!(device = %scan.device, tag = %tag, "unknown tag scanned");
                Err(AppError::NotFound(format!("Access denied: unknown tag {}", tag)))
            }
        }
    }

    /// Latest unexpired scan for a device session
    pub async fn latest(&self, device: Option<&str>) -> AppResult<Option<Scan>> {
        self.mailbox.latest(&device_or_default(device)).await
    }

    /// Clear a device session
    pub async fn end_session(&self, device: Option<&str>) -> AppResult<()> {
        let device = device_or_default(device);
        let last = self.mailbox.latest(&device).await?;
        self.mailbox.clear(&device).await?;

        let actor = last
            .as_ref()
            .and_then(|s| s.user_id.clone())
            .unwrap_or_else(|| SYSTEM_ACTOR.to_string());
        self.audit
            .record(&actor, AuditAction::NfcSessionEnded, json!({ "device": device }))
            .await;
        Ok(())
    }

    /// Resolve a tag to the user or tool carrying it
    pub async fn resolve(&self, raw: &str) -> AppResult<ResolvedIdentity> {
        let tag = normalize_tag(raw)?;

        if let Some(user) = self.store.find_user_by_tag(&tag).await? {
            return Ok(ResolvedIdentity {
                kind: IdentityKind::User,
                id: user.id,
            });
        }
        if let Some(tool) = self.store.find_tool_by_tag(&tag).await? {
            return Ok(ResolvedIdentity {
                kind: IdentityKind::Tool,
                id: tool.id,
            });
        }
        Err(AppError::NotFound(format!("No user or tool carries tag {}", tag)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        models::{User, UserRole},
        repository::MemoryStore,
    };
    use chrono::TimeZone;

    #[test]
    fn test_normalize_tag_forms() {
        assert_eq!(normalize_tag("0xd4 0x81 0x4d 0x5").unwrap(), "d4 81 4d 05");
        assert_eq!(normalize_tag("D4 81 4D 05").unwrap(), "d4 81 4d 05");
        assert_eq!(normalize_tag("d4:81:4d:05").unwrap(), "d4 81 4d 05");
        assert_eq!(normalize_tag("D4814D05").unwrap(), "d4 81 4d 05");
        assert!(normalize_tag("").is_err());
        assert!(normalize_tag("zz 01").is_err());
        assert!(normalize_tag("D4814D0").is_err());
    }

    async fn setup() -> (ScanService, ManualClock, MemoryStore) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 4, 1, 8, 0, 0).unwrap());
        let clock_arc: Arc<dyn Clock> = Arc::new(clock.clone());
        let store = MemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_user(&User {
            id: "USR-002".into(),
            name: "Ana Ruiz".into(),
            role: UserRole::Technician,
            contact_channel: None,
            nfc_tag: Some("d4 81 4d 05".into()),
            created_at: clock.now(),
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let store_arc: Arc<dyn Store> = Arc::new(store.clone());
        let mailbox = Arc::new(MemoryScanMailbox::new(30, clock_arc.clone()));
        let audit = AuditLogger::new(store_arc.clone(), clock_arc.clone());
        (ScanService::new(store_arc, mailbox, clock_arc, audit), clock, store)
    }

    #[tokio::test]
    async fn test_scan_resolves_user_and_expires() {
        let (service, clock, _) = setup().await;

        let scan = service.scan("0xD4 0x81 0x4D 0x05", None).await.unwrap();
        assert_eq!(scan.user_id.as_deref(), Some("USR-002"));
        assert_eq!(scan.device, DEFAULT_DEVICE);

        assert!(service.latest(None).await.unwrap().is_some());
        clock.advance(Duration::seconds(31));
        assert!(service.latest(None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_slots_are_dropped_on_write() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 4, 1, 8, 0, 0).unwrap());
        let mailbox = MemoryScanMailbox::new(30, Arc::new(clock.clone()));
        let scan = |device: &str| Scan {
            device: device.into(),
            tag: "01 02 03 04".into(),
            user_id: None,
            scanned_at: clock.now(),
        };

        for device in ["reader-1", "reader-2", "reader-3"] {
            mailbox.put(&scan(device)).await.unwrap();
        }
        assert_eq!(mailbox.slot_count().await, 3);

        clock.advance(Duration::seconds(31));
        mailbox.put(&scan("reader-4")).await.unwrap();
        assert_eq!(mailbox.slot_count().await, 1);
        assert!(mailbox.latest("reader-1").await.unwrap().is_none());
        assert!(mailbox.latest("reader-4").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_tag_is_denied_but_recorded() {
        let (service, _, _) = setup().await;

        let err = service.scan("01 02 03 04", Some("station-1")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let latest = service.latest(Some("station-1")).await.unwrap().unwrap();
        assert_eq!(latest.tag, "01 02 03 04");
        assert_eq!(latest.user_id, None);
    }

    #[tokio::test]
    async fn test_end_session_clears_slot_and_audits() {
        let (service, _, store) = setup().await;
        service.scan("d4 81 4d 05", Some("bench")).await.unwrap();

        service.end_session(Some("bench")).await.unwrap();
        assert!(service.latest(Some("bench")).await.unwrap().is_none());

        let trail = store.audit_trail(10).await.unwrap();
        assert_eq!(trail[0].action, AuditAction::NfcSessionEnded);
        assert_eq!(trail[0].actor_user_id, "USR-002");
    }

    #[tokio::test]
    async fn test_resolve_user_tag() {
        let (service, _, _) = setup().await;
        let identity = service.resolve("D4814D05").await.unwrap();
        assert_eq!(identity.kind, IdentityKind::User);
        assert_eq!(identity.id, "USR-002");
        assert!(service.resolve("aa bb").await.is_err());
    }
}
