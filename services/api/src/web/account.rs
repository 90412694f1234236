//! services/api/src/web/account.rs
//!
//! Registration, the caller's own profile, and the shop catalog.

use crate::web::{
    reject,
    rest::{respond_all, AvatarResponse, OwnedAvatarResponse, TierResponse, UserResponse},
    state::AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use quiz_platform_core::domain::{Identity, Role, User};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;

//=========================================================================================
// Request Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    /// `teacher` or `student`.
    pub role: String,
}

#[derive(Deserialize, ToSchema)]
pub struct EquipAvatarRequest {
    pub avatar_id: String,
}

/// Parses a role name coming from a request body.
pub(crate) fn parse_role(value: &str) -> Result<Role, (StatusCode, String)> {
    value
        .trim()
        .to_lowercase()
        .parse()
        .map_err(|e: String| (StatusCode::BAD_REQUEST, e))
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /users/register - Create the local account for the verified caller
#[utoipa::path(
    post,
    path = "/users/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account ready (created or already present)", body = UserResponse),
        (status = 400, description = "Unknown role"),
        (status = 403, description = "Role cannot be self-assigned")
    ),
    security(("bearer" = []))
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let role = parse_role(&req.role)?;
    let user = state.users.register_user(&identity, role).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// GET /users/me - The caller's profile
#[utoipa::path(
    get,
    path = "/users/me",
    responses((status = 200, description = "Current user", body = UserResponse)),
    security(("bearer" = []))
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user = state.users.current_user(&user.id).await.map_err(reject)?;
    Ok(Json(UserResponse::from(user)))
}

/// PUT /users/me/avatars - Equip an owned avatar
#[utoipa::path(
    put,
    path = "/users/me/avatars",
    request_body = EquipAvatarRequest,
    responses(
        (status = 200, description = "Avatar equipped", body = UserResponse),
        (status = 403, description = "Avatar not owned")
    ),
    security(("bearer" = []))
)]
pub async fn equip_avatar_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(req): Json<EquipAvatarRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user = state.users.equip_avatar(&user, &req.avatar_id).await.map_err(reject)?;
    Ok(Json(UserResponse::from(user)))
}

/// GET /users/me/avatars - Avatars the caller owns
#[utoipa::path(
    get,
    path = "/users/me/avatars",
    responses((status = 200, description = "Owned avatars", body = [OwnedAvatarResponse])),
    security(("bearer" = []))
)]
pub async fn owned_avatars_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let owned = state.shop.list_owned_avatars(&user).await.map_err(reject)?;
    Ok(Json(respond_all::<_, OwnedAvatarResponse>(owned)))
}

/// GET /subscriptions - Subscription tiers
#[utoipa::path(
    get,
    path = "/subscriptions",
    responses((status = 200, description = "All tiers", body = [TierResponse])),
    security(("bearer" = []))
)]
pub async fn list_tiers_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let tiers = state.shop.list_subscription_tiers().await.map_err(reject)?;
    Ok(Json(respond_all::<_, TierResponse>(tiers)))
}

/// GET /avatars - The avatar catalog
#[utoipa::path(
    get,
    path = "/avatars",
    responses((status = 200, description = "Avatars for sale; admins also see retired ones", body = [AvatarResponse])),
    security(("bearer" = []))
)]
pub async fn list_avatars_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let avatars = state.shop.list_avatars(&user).await.map_err(reject)?;
    Ok(Json(respond_all::<_, AvatarResponse>(avatars)))
}

/// POST /avatars/{avatar_id}/purchase - Buy an avatar with points
#[utoipa::path(
    post,
    path = "/avatars/{avatar_id}/purchase",
    params(("avatar_id" = String, Path, description = "Avatar id, e.g. AV001")),
    responses(
        (status = 200, description = "Purchased; returns the updated balance", body = UserResponse),
        (status = 409, description = "Already owned or insufficient points")
    ),
    security(("bearer" = []))
)]
pub async fn buy_avatar_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(avatar_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user = state
        .shop
        .buy_avatar_with_points(&user, &avatar_id)
        .await
        .map_err(reject)?;
    Ok(Json(UserResponse::from(user)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_are_case_insensitive() {
        assert_eq!(parse_role(" Teacher ").unwrap(), Role::Teacher);
        assert_eq!(parse_role("bogus").unwrap_err().0, StatusCode::BAD_REQUEST);
    }
}
