//! crates/quiz_platform_core/src/payments.rs
//!
//! The payment & entitlement reconciler.
//!
//! A purchase starts as a `pending` transaction. Completion can be reported
//! through three channels (the gateway webhook, a client-initiated force poll,
//! and the check-on-read in `check_payment`); all of them funnel into
//! [`PaymentService::reconcile_payment`], whose store-level conditional update
//! guarantees the entitlement is granted at most once.

use crate::access::ensure_active;
use crate::audit::AuditService;
use crate::domain::{
    CheckoutRequest, Entitlement, GatewayStatus, NewTransaction, PaymentNotification,
    PurchaseIntent, PurchaseTarget, Role, Transaction, TransactionStatus, User,
};
use crate::error::{upstream, CoreError, CoreResult};
use crate::ports::{DatabaseService, PaymentGateway, PortError};
use rust_decimal::Decimal;
use sha2::{Digest, Sha512};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Settings for talking to the payment gateway.
#[derive(Clone, Debug)]
pub struct PaymentSettings {
    /// Shared secret used in notification signatures.
    pub server_key: String,
    /// How long a hosted checkout stays payable.
    pub expiry_minutes: u32,
}

/// Lowercase hex SHA-512 over `order_id + status_code + gross_amount + server_key`.
///
/// `gross_amount` is hashed exactly as received; reformatting it breaks the
/// signature.
pub fn notification_signature(
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    server_key: &str,
) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Renders an amount the way the gateway expects it: two decimals.
pub fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

#[derive(Clone)]
pub struct PaymentService {
    db: Arc<dyn DatabaseService>,
    gateway: Arc<dyn PaymentGateway>,
    audit: AuditService,
    settings: PaymentSettings,
}

impl PaymentService {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        gateway: Arc<dyn PaymentGateway>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            audit: AuditService::new(db.clone()),
            db,
            gateway,
            settings,
        }
    }

    /// Creates a pending transaction and a hosted checkout for it.
    ///
    /// The row is persisted before the gateway call so every attempt is
    /// auditable. If the gateway refuses, the row is settled as `failed`
    /// instead of being left pending without a usable token.
    pub async fn create_purchase_intent(
        &self,
        user: &User,
        target: PurchaseTarget,
    ) -> CoreResult<PurchaseIntent> {
        ensure_active(user)?;

        let (item_name, price) = match &target {
            PurchaseTarget::Subscription(tier_id) => {
                let tier = self.db.get_subscription_tier(tier_id).await?;
                if user.subscription_id == tier.id {
                    return Err(CoreError::Conflict(format!(
                        "You are already subscribed to {}",
                        tier.name
                    )));
                }
                (tier.name, tier.price)
            }
            PurchaseTarget::Item(avatar_id) => {
                let avatar = self.db.get_avatar(avatar_id).await?;
                if !avatar.is_active {
                    return Err(CoreError::NotFound(format!(
                        "Avatar {} is not available",
                        avatar_id
                    )));
                }
                if self.db.user_owns_avatar(&user.id, avatar_id).await? {
                    return Err(CoreError::Conflict("You already own this avatar".to_string()));
                }
                (avatar.name, avatar.price)
            }
        };
        if price <= Decimal::ZERO {
            return Err(CoreError::Validation(format!(
                "{} is free and cannot be purchased",
                item_name
            )));
        }
        if price.fract() != Decimal::ZERO {
            return Err(CoreError::Validation(format!(
                "{} has a fractional price and cannot be charged",
                item_name
            )));
        }

        let tx = self
            .db
            .create_pending_transaction(NewTransaction {
                user_id: user.id.clone(),
                target: target.clone(),
                amount: price.round_dp(2),
            })
            .await
            .map_err(|e| match e {
                PortError::Conflict(_) => CoreError::Conflict(
                    "You already have a pending transaction for this item".to_string(),
                ),
                other => other.into(),
            })?;
        info!(
            "Created pending transaction {} for user {} ({} {})",
            tx.id,
            user.id,
            target.category(),
            target.target_id()
        );

        let request = CheckoutRequest {
            order_id: tx.id.clone(),
            gross_amount: tx.amount,
            item_id: target.target_id().to_string(),
            item_name,
            buyer_name: user.name.clone(),
            buyer_email: user.email.clone(),
            expiry_minutes: self.settings.expiry_minutes,
        };

        match self.gateway.create_checkout(&request).await {
            Ok(checkout) => {
                self.audit
                    .record(
                        Some(&user.id),
                        "transaction.create",
                        "transaction",
                        &tx.id,
                        Some(format!("{} {}", target.category(), format_amount(tx.amount))),
                    )
                    .await;
                Ok(PurchaseIntent { transaction: tx, checkout })
            }
            Err(e) => {
                error!("Gateway refused checkout for {}: {:?}", tx.id, e);
                if let Err(settle_err) = self
                    .db
                    .settle_transaction(&tx.id, TransactionStatus::Failed, None, None)
                    .await
                {
                    error!("Failed to mark transaction {} as failed: {:?}", tx.id, settle_err);
                }
                Err(upstream(e))
            }
        }
    }

    /// The single state-transition function for transactions.
    ///
    /// Terminal transactions are returned unchanged. A pending transaction
    /// moves to the status the report maps to; only the caller whose
    /// conditional update wins applies the entitlement.
    pub async fn reconcile_payment(
        &self,
        transaction_id: &str,
        report: &GatewayStatus,
    ) -> CoreResult<TransactionStatus> {
        let tx = self.db.get_transaction(transaction_id).await?;
        if tx.status.is_terminal() {
            debug!("Transaction {} already {}, ignoring report", tx.id, tx.status.as_str());
            return Ok(tx.status);
        }

        let next = TransactionStatus::from_gateway(&report.transaction_status);
        if next == TransactionStatus::Pending {
            return Ok(TransactionStatus::Pending);
        }

        let grant = (next == TransactionStatus::Success).then(|| Entitlement::for_transaction(&tx));
        let applied = self
            .db
            .settle_transaction(&tx.id, next, report.payment_type.as_deref(), grant)
            .await?;

        if !applied {
            // Another channel settled it between our read and our update.
            let current = self.db.get_transaction(&tx.id).await?;
            debug!("Transaction {} was settled concurrently as {}", tx.id, current.status.as_str());
            return Ok(current.status);
        }

        info!("Transaction {} settled as {}", tx.id, next.as_str());
        self.audit
            .record(
                Some(&tx.user_id),
                "transaction.settle",
                "transaction",
                &tx.id,
                Some(format!("{} via {}", next.as_str(), report.transaction_status)),
            )
            .await;
        Ok(next)
    }

    /// Authenticates a gateway notification and reconciles it.
    pub async fn handle_payment_webhook(
        &self,
        notification: &PaymentNotification,
    ) -> CoreResult<TransactionStatus> {
        let status = &notification.status;
        let expected = notification_signature(
            &status.order_id,
            &status.status_code,
            &status.gross_amount,
            &self.settings.server_key,
        );
        if !expected.eq_ignore_ascii_case(notification.signature_key.trim()) {
            warn!("Rejected notification for {} with a bad signature", status.order_id);
            return Err(CoreError::SignatureInvalid);
        }

        let tx = self.db.get_transaction(&status.order_id).await?;
        let reported = Decimal::from_str(status.gross_amount.trim()).map_err(|_| {
            CoreError::Validation(format!("Malformed gross amount '{}'", status.gross_amount))
        })?;
        if reported != tx.amount {
            warn!(
                "Notification amount {} does not match transaction {} amount {}",
                status.gross_amount,
                tx.id,
                format_amount(tx.amount)
            );
            return Err(CoreError::Validation(
                "Notification amount does not match the transaction".to_string(),
            ));
        }

        self.reconcile_payment(&tx.id, status).await
    }

    /// Asks the gateway for the current status when the client suspects a
    /// missed webhook. Gateway failure falls back to the local status.
    pub async fn force_poll_payment(
        &self,
        requester: &User,
        transaction_id: &str,
    ) -> CoreResult<TransactionStatus> {
        let tx = self.owned_transaction(requester, transaction_id).await?;
        self.refresh(&tx).await
    }

    /// Check-on-read: returns the transaction, first reconciling it against the
    /// gateway if it is still pending.
    pub async fn check_payment(
        &self,
        requester: &User,
        transaction_id: &str,
    ) -> CoreResult<Transaction> {
        let tx = self.owned_transaction(requester, transaction_id).await?;
        if tx.status.is_terminal() {
            return Ok(tx);
        }
        self.refresh(&tx).await?;
        Ok(self.db.get_transaction(transaction_id).await?)
    }

    /// Cancels a pending purchase. The gateway is informed best-effort; the
    /// local cancellation happens regardless.
    pub async fn cancel_purchase(
        &self,
        requester: &User,
        transaction_id: &str,
    ) -> CoreResult<Transaction> {
        let tx = self.db.get_transaction(transaction_id).await?;
        if tx.user_id != requester.id {
            return Err(CoreError::Forbidden(
                "Only the buyer can cancel this transaction".to_string(),
            ));
        }
        if tx.status.is_terminal() {
            return Err(CoreError::Conflict(format!(
                "Transaction is already {} and cannot be cancelled",
                tx.status.as_str()
            )));
        }

        if let Err(e) = self.gateway.cancel(&tx.id).await {
            warn!("Gateway did not acknowledge cancellation of {}: {:?}", tx.id, e);
        }

        let applied = self
            .db
            .settle_transaction(&tx.id, TransactionStatus::Failed, None, None)
            .await?;
        if !applied {
            return Err(CoreError::Conflict(
                "Transaction was settled before it could be cancelled".to_string(),
            ));
        }

        info!("Transaction {} cancelled by {}", tx.id, requester.id);
        self.audit
            .record(Some(&requester.id), "transaction.cancel", "transaction", &tx.id, None)
            .await;
        Ok(self.db.get_transaction(&tx.id).await?)
    }

    pub async fn list_transactions(&self, user: &User) -> CoreResult<Vec<Transaction>> {
        Ok(self.db.list_transactions_for_user(&user.id).await?)
    }

    async fn owned_transaction(&self, requester: &User, transaction_id: &str) -> CoreResult<Transaction> {
        let tx = self.db.get_transaction(transaction_id).await?;
        if tx.user_id != requester.id && requester.role != Role::Admin {
            return Err(CoreError::Forbidden(
                "This transaction does not belong to you".to_string(),
            ));
        }
        Ok(tx)
    }

    /// Polls the gateway for a pending transaction and reconciles the result.
    async fn refresh(&self, tx: &Transaction) -> CoreResult<TransactionStatus> {
        if tx.status.is_terminal() {
            return Ok(tx.status);
        }
        match self.gateway.fetch_status(&tx.id).await {
            Ok(report) => self.reconcile_payment(&tx.id, &report).await,
            Err(e) => {
                warn!("Status poll for {} failed, keeping local status: {:?}", tx.id, e);
                Ok(tx.status)
            }
        }
    }
}
