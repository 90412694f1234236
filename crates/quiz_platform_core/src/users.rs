//! crates/quiz_platform_core/src/users.rs
//!
//! Registration, caller resolution and account administration.

use crate::access::{ensure_active, ensure_role};
use crate::audit::AuditService;
use crate::domain::{Identity, NewUser, Role, User};
use crate::error::{upstream, CoreError, CoreResult};
use crate::ports::{DatabaseService, IdentityProvider, PortError};
use std::sync::Arc;
use tracing::{info, warn};

/// Tier every new account starts on.
pub const DEFAULT_SUBSCRIPTION_ID: &str = "SB001";

#[derive(Clone)]
pub struct UserService {
    db: Arc<dyn DatabaseService>,
    identity: Arc<dyn IdentityProvider>,
    audit: AuditService,
}

impl UserService {
    pub fn new(db: Arc<dyn DatabaseService>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            audit: AuditService::new(db.clone()),
            db,
            identity,
        }
    }

    /// Verifies a bearer credential without requiring a local account.
    pub async fn identify(&self, bearer: &str) -> CoreResult<Identity> {
        self.identity.verify_token(bearer).await.map_err(|e| match e {
            PortError::Unauthorized => CoreError::Forbidden("Invalid credentials".to_string()),
            other => upstream(other),
        })
    }

    /// Resolves a bearer credential to an active local user.
    pub async fn authenticate(&self, bearer: &str) -> CoreResult<User> {
        let identity = self.identify(bearer).await?;
        let user = self
            .db
            .get_user_by_external_id(&identity.external_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("You have not registered yet".to_string()))?;
        ensure_active(&user)?;
        Ok(user)
    }

    /// Creates the local account for a verified identity. Calling it again for
    /// the same identity returns the existing account.
    pub async fn register_user(&self, identity: &Identity, role: Role) -> CoreResult<User> {
        if let Some(existing) = self.db.get_user_by_external_id(&identity.external_id).await? {
            return Ok(existing);
        }
        if role == Role::Admin {
            return Err(CoreError::Forbidden(
                "Admin accounts cannot be self-registered".to_string(),
            ));
        }
        if identity.name.trim().is_empty() {
            return Err(CoreError::Validation("A display name is required".to_string()));
        }

        let user = self
            .db
            .create_user(NewUser {
                external_id: identity.external_id.clone(),
                name: identity.name.trim().to_string(),
                email: identity.email.clone(),
                role,
                subscription_id: DEFAULT_SUBSCRIPTION_ID.to_string(),
            })
            .await
            .map_err(|e| match e {
                PortError::Conflict(_) => {
                    CoreError::Conflict("This identity is already registered".to_string())
                }
                other => other.into(),
            })?;
        info!("Registered {} {} for identity {}", user.role, user.id, user.external_id);

        if identity.role != Some(role) {
            self.sync_role_claim(&user).await;
        }
        self.audit
            .record(Some(&user.id), "user.register", "user", &user.id, Some(role.to_string()))
            .await;
        Ok(user)
    }

    pub async fn current_user(&self, user_id: &str) -> CoreResult<User> {
        Ok(self.db.get_user(user_id).await?)
    }

    /// Admin-only role change, mirrored to the identity provider best-effort.
    pub async fn change_user_role(&self, admin: &User, user_id: &str, role: Role) -> CoreResult<User> {
        ensure_role(admin, Role::Admin)?;
        if admin.id == user_id && role != Role::Admin {
            return Err(CoreError::Conflict("Admins cannot demote themselves".to_string()));
        }
        let user = self.db.update_user_role(user_id, role).await?;
        self.sync_role_claim(&user).await;
        self.audit
            .record(Some(&admin.id), "user.role", "user", &user.id, Some(role.to_string()))
            .await;
        Ok(user)
    }

    /// Admin-only soft delete and restore.
    pub async fn set_user_active(&self, admin: &User, user_id: &str, is_active: bool) -> CoreResult<()> {
        ensure_role(admin, Role::Admin)?;
        if admin.id == user_id {
            return Err(CoreError::Conflict("Admins cannot deactivate themselves".to_string()));
        }
        self.db.set_user_active(user_id, is_active).await?;
        let action = if is_active { "user.restore" } else { "user.deactivate" };
        self.audit.record(Some(&admin.id), action, "user", user_id, None).await;
        Ok(())
    }

    /// Equips an avatar the user owns.
    pub async fn equip_avatar(&self, user: &User, avatar_id: &str) -> CoreResult<User> {
        ensure_active(user)?;
        if !self.db.user_owns_avatar(&user.id, avatar_id).await? {
            return Err(CoreError::Forbidden("You do not own this avatar".to_string()));
        }
        self.db.set_active_avatar(&user.id, avatar_id).await?;
        Ok(self.db.get_user(&user.id).await?)
    }

    async fn sync_role_claim(&self, user: &User) {
        if let Err(e) = self.identity.update_role_claim(&user.external_id, user.role).await {
            warn!("Failed to sync role claim for {}: {:?}", user.id, e);
        }
    }
}
