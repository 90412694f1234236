//! services/api/src/web/admin.rs
//!
//! Administrative endpoints: account management, the avatar catalog and the
//! audit trail. Every handler is checked against the admin role by the
//! services themselves.

use crate::web::{
    account::parse_role,
    reject,
    rest::{respond_all, AuditLogResponse, AvatarResponse, UserResponse},
    state::AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use quiz_platform_core::domain::{AuditFilter, NewAvatar, Rarity, User};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct ChangeRoleRequest {
    pub role: String,
}

#[derive(Deserialize, ToSchema)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateAvatarRequest {
    pub name: String,
    /// Decimal string; also the price in points when bought with points.
    pub price: String,
    /// `common`, `rare`, `epic` or `legendary`.
    pub rarity: String,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditQuery {
    pub actor_id: Option<String>,
    pub action: Option<String>,
    pub entity: Option<String>,
    pub entity_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Defaults to 100, capped by the service.
    pub limit: Option<i64>,
}

impl From<AuditQuery> for AuditFilter {
    fn from(q: AuditQuery) -> Self {
        AuditFilter {
            actor_id: q.actor_id,
            action: q.action,
            entity: q.entity,
            entity_id: q.entity_id,
            from: q.from,
            to: q.to,
            limit: q.limit,
        }
    }
}

impl CreateAvatarRequest {
    fn into_new_avatar(self) -> Result<NewAvatar, (StatusCode, String)> {
        let price = Decimal::from_str(self.price.trim()).map_err(|_| {
            (
                StatusCode::BAD_REQUEST,
                format!("'{}' is not a valid price", self.price),
            )
        })?;
        let rarity = Rarity::from_str(&self.rarity.trim().to_lowercase())
            .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
        Ok(NewAvatar {
            name: self.name,
            price,
            rarity,
        })
    }
}

/// PUT /admin/users/{user_id}/role - Change a user's role
#[utoipa::path(
    put,
    path = "/admin/users/{user_id}/role",
    params(("user_id" = String, Path, description = "User id")),
    request_body = ChangeRoleRequest,
    responses(
        (status = 200, description = "Role changed", body = UserResponse),
        (status = 403, description = "Admins only"),
        (status = 409, description = "Admins cannot demote themselves")
    ),
    security(("bearer" = []))
)]
pub async fn change_role_handler(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<User>,
    Path(user_id): Path<String>,
    Json(req): Json<ChangeRoleRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let role = parse_role(&req.role)?;
    let user = state
        .users
        .change_user_role(&admin, &user_id, role)
        .await
        .map_err(reject)?;
    Ok(Json(UserResponse::from(user)))
}

/// PUT /admin/users/{user_id}/active - Deactivate or restore an account
#[utoipa::path(
    put,
    path = "/admin/users/{user_id}/active",
    params(("user_id" = String, Path, description = "User id")),
    request_body = SetActiveRequest,
    responses(
        (status = 204, description = "Updated"),
        (status = 403, description = "Admins only")
    ),
    security(("bearer" = []))
)]
pub async fn set_user_active_handler(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<User>,
    Path(user_id): Path<String>,
    Json(req): Json<SetActiveRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .users
        .set_user_active(&admin, &user_id, req.is_active)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /admin/avatars - Add an avatar to the catalog
#[utoipa::path(
    post,
    path = "/admin/avatars",
    request_body = CreateAvatarRequest,
    responses(
        (status = 201, description = "Avatar created", body = AvatarResponse),
        (status = 400, description = "Invalid avatar"),
        (status = 403, description = "Admins only")
    ),
    security(("bearer" = []))
)]
pub async fn create_avatar_handler(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<User>,
    Json(req): Json<CreateAvatarRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let avatar = state
        .shop
        .create_avatar(&admin, req.into_new_avatar()?)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(AvatarResponse::from(avatar))))
}

/// PUT /admin/avatars/{avatar_id}/active - Retire or restore an avatar
#[utoipa::path(
    put,
    path = "/admin/avatars/{avatar_id}/active",
    params(("avatar_id" = String, Path, description = "Avatar id")),
    request_body = SetActiveRequest,
    responses((status = 200, description = "Avatar updated", body = AvatarResponse)),
    security(("bearer" = []))
)]
pub async fn set_avatar_active_handler(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<User>,
    Path(avatar_id): Path<String>,
    Json(req): Json<SetActiveRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let avatar = state
        .shop
        .set_avatar_active(&admin, &avatar_id, req.is_active)
        .await
        .map_err(reject)?;
    Ok(Json(AvatarResponse::from(avatar)))
}

/// GET /admin/audit-logs - Search the audit trail, newest first
#[utoipa::path(
    get,
    path = "/admin/audit-logs",
    params(AuditQuery),
    responses(
        (status = 200, description = "Matching entries", body = [AuditLogResponse]),
        (status = 403, description = "Admins only")
    ),
    security(("bearer" = []))
)]
pub async fn search_audit_handler(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<User>,
    Query(query): Query<AuditQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let logs = state
        .audit
        .search(&admin, AuditFilter::from(query))
        .await
        .map_err(reject)?;
    Ok(Json(respond_all::<_, AuditLogResponse>(logs)))
}
