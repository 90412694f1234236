//! crates/quiz_platform_core/src/audit.rs
//!
//! Admin audit trail. Writes are best-effort: a failed audit insert is logged
//! and never fails the operation being audited.

use crate::access::ensure_role;
use crate::domain::{AuditFilter, AuditLog, Role, User};
use crate::error::CoreResult;
use crate::ports::DatabaseService;
use chrono::Utc;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

const MAX_SEARCH_LIMIT: i64 = 500;

#[derive(Clone)]
pub struct AuditService {
    db: Arc<dyn DatabaseService>,
}

impl AuditService {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    pub async fn record(
        &self,
        actor_id: Option<&str>,
        action: &str,
        entity: &str,
        entity_id: &str,
        detail: Option<String>,
    ) {
        let log = AuditLog {
            id: Uuid::new_v4(),
            actor_id: actor_id.map(str::to_string),
            action: action.to_string(),
            entity: entity.to_string(),
            entity_id: entity_id.to_string(),
            detail,
            created_at: Utc::now(),
        };
        if let Err(e) = self.db.insert_audit_log(log).await {
            warn!("Failed to record audit log '{}' for {} {}: {:?}", action, entity, entity_id, e);
        }
    }

    /// Admin-only search, newest first.
    pub async fn search(&self, admin: &User, mut filter: AuditFilter) -> CoreResult<Vec<AuditLog>> {
        ensure_role(admin, Role::Admin)?;
        filter.limit = Some(filter.limit.unwrap_or(100).clamp(1, MAX_SEARCH_LIMIT));
        Ok(self.db.search_audit_logs(&filter).await?)
    }
}
