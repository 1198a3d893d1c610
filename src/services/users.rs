//! User directory

use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use super::{audit::AuditLogger, scans::normalize_tag};
use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::{
        user::{CreateUser, UpdateUser},
        AuditAction, Tool, User, UserRole, SYSTEM_ACTOR,
    },
    repository::Store,
};

#[derive(Clone)]
pub struct UsersService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    audit: AuditLogger,
}

fn parse_role(raw: &str) -> AppResult<UserRole> {
    raw.parse().map_err(AppError::Validation)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl UsersService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, audit: AuditLogger) -> Self {
        Self { store, clock, audit }
    }

    pub async fn list(&self) -> AppResult<Vec<User>> {
        self.store.list_users().await
    }

    pub async fn get(&self, id: &str) -> AppResult<User> {
        self.store
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }

    pub async fn create(&self, request: CreateUser) -> AppResult<User> {
        request.validate()?;
        let (Some(id), Some(name), Some(role)) = (request.id, request.name, request.role) else {
            return Err(AppError::Validation("id, name and role are required".to_string()));
        };

        let user = User {
            id: id.trim().to_string(),
            name: name.trim().to_string(),
            role: parse_role(&role)?,
            contact_channel: non_empty(request.contact_channel),
            nfc_tag: request.nfc_tag.as_deref().map(normalize_tag).transpose()?,
            created_at: self.clock.now(),
        };

        let mut tx = self.store.begin().await?;
        tx.insert_user(&user).await?;
        tx.commit().await?;

        tracing::info!(user = %user.id, role = %user.role, "user created");
        self.audit
            .record(
                SYSTEM_ACTOR,
                AuditAction::UserCreated,
                json!({ "user_id": user.id, "name": user.name, "role": user.role }),
            )
            .await;
        Ok(user)
    }

    pub async fn update(&self, id: &str, request: UpdateUser) -> AppResult<User> {
        request.validate()?;
        let role = request.role.as_deref().map(parse_role).transpose()?;

        let mut tx = self.store.begin().await?;
        let mut user = tx
            .lock_user(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;
        if let Some(name) = non_empty(request.name) {
            user.name = name;
        }
        if let Some(role) = role {
            user.role = role;
        }
        if request.contact_channel.is_some() {
            user.contact_channel = non_empty(request.contact_channel);
        }
        tx.save_user(&user).await?;
        tx.commit().await?;

        self.audit
            .record(
                SYSTEM_ACTOR,
                AuditAction::UserUpdated,
                json!({ "user_id": user.id, "name": user.name, "role": user.role }),
            )
            .await;
        Ok(user)
    }

    /// Remove a user who holds no tools
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        let mut tx = self.store.begin().await?;
        let user = tx
            .lock_user(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;
        if tx.user_holds_tools(id).await? {
            return Err(AppError::UserHoldsTools(id.to_string()));
        }
        tx.delete_user(id).await?;
        tx.commit().await?;

        tracing::info!(user = %id, "user deleted");
        self.audit
            .record(
                SYSTEM_ACTOR,
                AuditAction::UserDeleted,
                json!({ "user_id": id, "name": user.name }),
            )
            .await;
        Ok(())
    }

    /// Tools currently checked out to a user
    pub async fn tools_held(&self, id: &str) -> AppResult<Vec<Tool>> {
        self.get(id).await?;
        self.store.tools_held_by(id).await
    }

    /// Attach an NFC badge to a user
    pub async fn assign_tag(&self, id: &str, raw_tag: &str) -> AppResult<User> {
        let tag = normalize_tag(raw_tag)?;

        let mut tx = self.store.begin().await?;
        let mut user = tx
            .lock_user(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;
        user.nfc_tag = Some(tag.clone());
        tx.save_user(&user).await?;
        tx.commit().await?;

        self.audit
            .record(SYSTEM_ACTOR, AuditAction::UserTagAssigned, json!({ "user_id": id, "tag": tag }))
            .await;
        Ok(user)
    }
}
