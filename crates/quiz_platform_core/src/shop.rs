//! crates/quiz_platform_core/src/shop.rs
//!
//! The avatar shop catalog and points purchases. Paid purchases go through
//! [`crate::payments::PaymentService`].

use crate::access::{ensure_active, ensure_role};
use crate::audit::AuditService;
use crate::domain::{Avatar, NewAvatar, PointsPurchase, Role, SubscriptionTier, User, UserAvatar};
use crate::error::{CoreError, CoreResult};
use crate::ports::DatabaseService;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct ShopService {
    db: Arc<dyn DatabaseService>,
    audit: AuditService,
}

impl ShopService {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self {
            audit: AuditService::new(db.clone()),
            db,
        }
    }

    pub async fn list_subscription_tiers(&self) -> CoreResult<Vec<SubscriptionTier>> {
        Ok(self.db.list_subscription_tiers().await?)
    }

    /// Active avatars; admins also see retired ones.
    pub async fn list_avatars(&self, viewer: &User) -> CoreResult<Vec<Avatar>> {
        Ok(self.db.list_avatars(viewer.role == Role::Admin).await?)
    }

    pub async fn list_owned_avatars(&self, user: &User) -> CoreResult<Vec<UserAvatar>> {
        Ok(self.db.list_user_avatars(&user.id).await?)
    }

    pub async fn create_avatar(&self, admin: &User, avatar: NewAvatar) -> CoreResult<Avatar> {
        ensure_role(admin, Role::Admin)?;
        let name = avatar.name.trim().to_string();
        if name.is_empty() {
            return Err(CoreError::Validation("An avatar needs a name".to_string()));
        }
        if avatar.price < Decimal::ZERO {
            return Err(CoreError::Validation("Prices must not be negative".to_string()));
        }
        // The gateway settles whole rupiah and points are whole numbers.
        points_price(avatar.price).map_err(|_| {
            CoreError::Validation(format!(
                "Price {} must be a whole number of rupiah",
                avatar.price
            ))
        })?;
        let avatar = self
            .db
            .create_avatar(NewAvatar { name, ..avatar })
            .await?;
        self.audit
            .record(Some(&admin.id), "avatar.create", "avatar", &avatar.id, None)
            .await;
        Ok(avatar)
    }

    /// Soft delete (`false`) or restore (`true`).
    pub async fn set_avatar_active(&self, admin: &User, avatar_id: &str, is_active: bool) -> CoreResult<Avatar> {
        ensure_role(admin, Role::Admin)?;
        let avatar = self.db.set_avatar_active(avatar_id, is_active).await?;
        let action = if is_active { "avatar.restore" } else { "avatar.deactivate" };
        self.audit
            .record(Some(&admin.id), action, "avatar", avatar_id, None)
            .await;
        Ok(avatar)
    }

    /// Buys an avatar with points. All rejections happen before any mutation;
    /// the debit and the ownership row are written atomically by the store.
    pub async fn buy_avatar_with_points(&self, user: &User, avatar_id: &str) -> CoreResult<User> {
        ensure_active(user)?;
        let avatar = self.db.get_avatar(avatar_id).await?;
        if !avatar.is_active {
            return Err(CoreError::NotFound(format!("Avatar {} is not available", avatar_id)));
        }
        let price = points_price(avatar.price)?;

        let user = self.db.get_user(&user.id).await?;
        if self.db.user_owns_avatar(&user.id, avatar_id).await? {
            return Err(CoreError::Conflict("You already own this avatar".to_string()));
        }
        if user.points < price {
            return Err(CoreError::Conflict(format!(
                "Insufficient points: {} needed, {} available",
                price, user.points
            )));
        }

        match self.db.spend_points_for_avatar(&user.id, avatar_id, price).await? {
            PointsPurchase::Purchased => {
                info!("User {} bought avatar {} for {} points", user.id, avatar_id, price);
                self.audit
                    .record(
                        Some(&user.id),
                        "avatar.purchase_points",
                        "avatar",
                        avatar_id,
                        Some(price.to_string()),
                    )
                    .await;
                Ok(self.db.get_user(&user.id).await?)
            }
            PointsPurchase::InsufficientPoints => {
                Err(CoreError::Conflict("Insufficient points".to_string()))
            }
            PointsPurchase::AlreadyOwned => {
                Err(CoreError::Conflict("You already own this avatar".to_string()))
            }
        }
    }
}

/// Avatar prices double as point prices and must be whole numbers for that.
fn points_price(price: Decimal) -> CoreResult<i64> {
    if price.fract() != Decimal::ZERO {
        return Err(CoreError::Validation(
            "This avatar cannot be bought with points".to_string(),
        ));
    }
    price
        .to_i64()
        .ok_or_else(|| CoreError::Validation("Price is out of range".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn whole_prices_convert_to_points() {
        assert_eq!(points_price(dec!(100.00)).unwrap(), 100);
        assert!(points_price(dec!(99.50)).is_err());
    }
}
