//! services/api/src/web/payments.rs
//!
//! Purchase intents, the gateway webhook and transaction status endpoints.

use crate::web::{
    reject,
    rest::{respond_all, TransactionResponse},
    state::AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use quiz_platform_core::domain::{GatewayStatus, PaymentNotification, PurchaseTarget, User};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateIntentRequest {
    /// `subscription` or `item`.
    pub category: String,
    /// Subscription tier id (SB...) or avatar id (AV...).
    pub target_id: String,
}

impl CreateIntentRequest {
    fn target(self) -> Result<PurchaseTarget, (StatusCode, String)> {
        let target_id = self.target_id.trim().to_string();
        if target_id.is_empty() {
            return Err((StatusCode::BAD_REQUEST, "target_id is required".to_string()));
        }
        match self.category.trim() {
            "subscription" => Ok(PurchaseTarget::Subscription(target_id)),
            "item" => Ok(PurchaseTarget::Item(target_id)),
            other => Err((
                StatusCode::BAD_REQUEST,
                format!("Unknown purchase category '{}'", other),
            )),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct IntentResponse {
    pub transaction: TransactionResponse,
    /// Token for the hosted checkout widget.
    pub token: String,
    pub redirect_url: String,
}

/// The gateway's HTTP notification body.
#[derive(Deserialize, ToSchema)]
pub struct NotificationPayload {
    pub order_id: String,
    pub status_code: String,
    /// Exactly as sent; it is part of the signed string.
    pub gross_amount: String,
    pub transaction_status: String,
    pub signature_key: String,
    #[serde(default)]
    pub payment_type: Option<String>,
    #[serde(default)]
    pub fraud_status: Option<String>,
}

impl From<NotificationPayload> for PaymentNotification {
    fn from(p: NotificationPayload) -> Self {
        PaymentNotification {
            status: GatewayStatus {
                order_id: p.order_id,
                status_code: p.status_code,
                gross_amount: p.gross_amount,
                transaction_status: p.transaction_status,
                payment_type: p.payment_type,
                fraud_status: p.fraud_status,
            },
            signature_key: p.signature_key,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct StatusResponse {
    /// The transaction id, which doubles as the gateway order id.
    pub order_id: String,
    /// Local status after reconciliation.
    pub status: String,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /payments - Start a purchase and obtain a checkout token
#[utoipa::path(
    post,
    path = "/payments",
    request_body = CreateIntentRequest,
    responses(
        (status = 201, description = "Pending transaction with checkout token", body = IntentResponse),
        (status = 404, description = "Unknown tier or avatar"),
        (status = 409, description = "A purchase for this target is already pending, or nothing to buy"),
        (status = 502, description = "Payment gateway unavailable")
    ),
    security(("bearer" = []))
)]
pub async fn create_intent_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(req): Json<CreateIntentRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let target = req.target()?;
    let intent = state
        .payments
        .create_purchase_intent(&user, target)
        .await
        .map_err(reject)?;
    let response = IntentResponse {
        transaction: intent.transaction.into(),
        token: intent.checkout.token,
        redirect_url: intent.checkout.redirect_url,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /payments - The caller's transactions, newest first
#[utoipa::path(
    get,
    path = "/payments",
    responses((status = 200, description = "Transactions", body = [TransactionResponse])),
    security(("bearer" = []))
)]
pub async fn list_transactions_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let transactions = state.payments.list_transactions(&user).await.map_err(reject)?;
    Ok(Json(respond_all::<_, TransactionResponse>(transactions)))
}

/// GET /payments/{transaction_id} - Transaction status, refreshed from the gateway while pending
#[utoipa::path(
    get,
    path = "/payments/{transaction_id}",
    params(("transaction_id" = String, Path, description = "Transaction id, e.g. TR000001")),
    responses(
        (status = 200, description = "Transaction", body = TransactionResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Unknown transaction")
    ),
    security(("bearer" = []))
)]
pub async fn check_payment_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(transaction_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let tx = state
        .payments
        .check_payment(&user, &transaction_id)
        .await
        .map_err(reject)?;
    Ok(Json(TransactionResponse::from(tx)))
}

/// POST /payments/{transaction_id}/poll - Force a status pull from the gateway
#[utoipa::path(
    post,
    path = "/payments/{transaction_id}/poll",
    params(("transaction_id" = String, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Status after the poll; unchanged if the gateway is unreachable", body = StatusResponse),
        (status = 403, description = "Not the owner")
    ),
    security(("bearer" = []))
)]
pub async fn poll_payment_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(transaction_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let status = state
        .payments
        .force_poll_payment(&user, &transaction_id)
        .await
        .map_err(reject)?;
    Ok(Json(StatusResponse {
        order_id: transaction_id,
        status: status.as_str().to_string(),
    }))
}

/// POST /payments/{transaction_id}/cancel - Abandon a pending purchase
#[utoipa::path(
    post,
    path = "/payments/{transaction_id}/cancel",
    params(("transaction_id" = String, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Cancelled transaction", body = TransactionResponse),
        (status = 403, description = "Not the owner"),
        (status = 409, description = "Transaction is no longer pending")
    ),
    security(("bearer" = []))
)]
pub async fn cancel_payment_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(transaction_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let tx = state
        .payments
        .cancel_purchase(&user, &transaction_id)
        .await
        .map_err(reject)?;
    Ok(Json(TransactionResponse::from(tx)))
}

/// POST /payments/notifications - Gateway webhook (signed, unauthenticated)
#[utoipa::path(
    post,
    path = "/payments/notifications",
    request_body = NotificationPayload,
    responses(
        (status = 200, description = "Notification reconciled", body = StatusResponse),
        (status = 400, description = "Amount does not match the transaction"),
        (status = 401, description = "Invalid signature"),
        (status = 404, description = "Unknown order")
    )
)]
pub async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NotificationPayload>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let notification = PaymentNotification::from(payload);
    let status = state
        .payments
        .handle_payment_webhook(&notification)
        .await
        .map_err(reject)?;
    info!(
        "Webhook for {} reconciled to {}",
        notification.status.order_id,
        status.as_str()
    );
    Ok(Json(StatusResponse {
        order_id: notification.status.order_id,
        status: status.as_str().to_string(),
    }))
}
