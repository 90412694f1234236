//! services/api/src/adapters/payment_gateway.rs
//!
//! This module contains the adapter for the Midtrans payment gateway.
//! It implements the `PaymentGateway` port from the `core` crate: hosted
//! checkout creation through the Snap API and status polling / cancellation
//! through the core API.

use async_trait::async_trait;
use quiz_platform_core::{
    domain::{CheckoutRequest, CheckoutToken, GatewayStatus},
    ports::{PaymentGateway, PortError, PortResult},
};
use reqwest::{Client, StatusCode};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

//=========================================================================================
// Wire Payloads
//=========================================================================================

#[derive(Serialize)]
struct SnapRequest<'a> {
    transaction_details: TransactionDetails<'a>,
    item_details: Vec<ItemDetails<'a>>,
    customer_details: CustomerDetails<'a>,
    expiry: Expiry,
}

#[derive(Serialize)]
struct TransactionDetails<'a> {
    order_id: &'a str,
    gross_amount: i64,
}

#[derive(Serialize)]
struct ItemDetails<'a> {
    id: &'a str,
    price: i64,
    quantity: u32,
    name: &'a str,
}

#[derive(Serialize)]
struct CustomerDetails<'a> {
    first_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
}

#[derive(Serialize)]
struct Expiry {
    unit: &'static str,
    duration: u32,
}

#[derive(Deserialize)]
struct SnapResponse {
    token: String,
    redirect_url: String,
}

/// The core API answers unknown orders with HTTP 200 and a `404` status code
/// in the body, so the body is inspected before it is trusted as a status.
#[derive(Deserialize)]
struct StatusEnvelope {
    status_code: String,
    #[serde(default)]
    status_message: Option<String>,
    #[serde(flatten)]
    rest: serde_json::Value,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `PaymentGateway` against Midtrans.
#[derive(Clone)]
pub struct MidtransGateway {
    client: Client,
    server_key: String,
    snap_url: String,
    api_url: String,
}

impl MidtransGateway {
    /// Creates a new `MidtransGateway`. The client should already carry the
    /// request timeout.
    pub fn new(client: Client, server_key: String, snap_url: String, api_url: String) -> Self {
        Self {
            client,
            server_key,
            snap_url,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    fn order_url(&self, order_id: &str, action: &str) -> String {
        format!("{}/{}/{}", self.api_url, order_id, action)
    }
}

/// Rupiah amounts are whole numbers on the wire.
fn rupiah(amount: Decimal) -> PortResult<i64> {
    if amount.fract() != Decimal::ZERO {
        return Err(PortError::Unexpected(format!(
            "amount {} is not a whole number of rupiah",
            amount
        )));
    }
    amount
        .to_i64()
        .ok_or_else(|| PortError::Unexpected(format!("amount {} does not fit the gateway", amount)))
}

fn transport(e: reqwest::Error) -> PortError {
    PortError::Unexpected(format!("payment gateway request failed: {}", e))
}

async fn rejected(action: &str, resp: reqwest::Response) -> PortError {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    error!("Midtrans {} error: {} - {}", action, status, text);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PortError::Unauthorized,
        StatusCode::NOT_FOUND => PortError::NotFound(format!("gateway has no such order ({})", action)),
        other => PortError::Unexpected(format!("payment gateway returned {} on {}", other, action)),
    }
}

fn parse_status(order_id: &str, envelope: StatusEnvelope) -> PortResult<GatewayStatus> {
    match envelope.status_code.as_str() {
        "404" => Err(PortError::NotFound(format!("gateway has no order {}", order_id))),
        "401" => Err(PortError::Unauthorized),
        _ => {
            let mut body = envelope.rest;
            if let serde_json::Value::Object(map) = &mut body {
                map.insert(
                    "status_code".to_string(),
                    serde_json::Value::String(envelope.status_code.clone()),
                );
            }
            serde_json::from_value(body).map_err(|e| {
                PortError::Unexpected(format!(
                    "unreadable gateway status for {} ({}): {}",
                    order_id,
                    envelope.status_message.unwrap_or_default(),
                    e
                ))
            })
        }
    }
}

//=========================================================================================
// `PaymentGateway` Trait Implementation
//=========================================================================================

#[async_trait]
impl PaymentGateway for MidtransGateway {
    async fn create_checkout(&self, request: &CheckoutRequest) -> PortResult<CheckoutToken> {
        let amount = rupiah(request.gross_amount)?;
        let body = SnapRequest {
            transaction_details: TransactionDetails {
                order_id: &request.order_id,
                gross_amount: amount,
            },
            item_details: vec![ItemDetails {
                id: &request.item_id,
                price: amount,
                quantity: 1,
                name: &request.item_name,
            }],
            customer_details: CustomerDetails {
                first_name: &request.buyer_name,
                email: request.buyer_email.as_deref(),
            },
            expiry: Expiry {
                unit: "minutes",
                duration: request.expiry_minutes,
            },
        };

        let resp = self
            .client
            .post(&self.snap_url)
            .basic_auth(&self.server_key, Some(""))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        if !resp.status().is_success() {
            return Err(rejected("checkout", resp).await);
        }

        let snap: SnapResponse = resp.json().await.map_err(transport)?;
        debug!("Checkout token issued for order {}", request.order_id);
        Ok(CheckoutToken {
            token: snap.token,
            redirect_url: snap.redirect_url,
        })
    }

    async fn fetch_status(&self, order_id: &str) -> PortResult<GatewayStatus> {
        let resp = self
            .client
            .get(self.order_url(order_id, "status"))
            .basic_auth(&self.server_key, Some(""))
            .send()
            .await
            .map_err(transport)?;
        if !resp.status().is_success() {
            return Err(rejected("status", resp).await);
        }
        let envelope: StatusEnvelope = resp.json().await.map_err(transport)?;
        parse_status(order_id, envelope)
    }

    async fn cancel(&self, order_id: &str) -> PortResult<()> {
        let resp = self
            .client
            .post(self.order_url(order_id, "cancel"))
            .basic_auth(&self.server_key, Some(""))
            .send()
            .await
            .map_err(transport)?;
        if !resp.status().is_success() {
            return Err(rejected("cancel", resp).await);
        }
        Ok(())
    }
}
