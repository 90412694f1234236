//! services/api/src/adapters/identity.rs
//!
//! This module contains the adapter for the external identity provider.
//! It implements the `IdentityProvider` port: bearer credentials are verified
//! through a token-introspection endpoint and role changes are pushed back as
//! public metadata through the provider's admin API.

use async_trait::async_trait;
use quiz_platform_core::{
    domain::{Identity, Role},
    ports::{IdentityProvider, PortError, PortResult},
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

#[derive(Deserialize)]
struct Introspection {
    #[serde(default = "active_by_default")]
    active: bool,
    sub: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    public_metadata: Option<PublicMetadata>,
}

fn active_by_default() -> bool {
    true
}

#[derive(Deserialize, Serialize)]
struct PublicMetadata {
    #[serde(default)]
    role: Option<Role>,
}

/// An adapter that implements `IdentityProvider` over HTTP.
#[derive(Clone)]
pub struct HttpIdentityProvider {
    client: Client,
    introspection_url: String,
    admin_url: String,
    secret_key: Option<String>,
}

impl HttpIdentityProvider {
    pub fn new(
        client: Client,
        introspection_url: String,
        admin_url: String,
        secret_key: Option<String>,
    ) -> Self {
        Self {
            client,
            introspection_url,
            admin_url: admin_url.trim_end_matches('/').to_string(),
            secret_key,
        }
    }
}

fn transport(e: reqwest::Error) -> PortError {
    PortError::Unexpected(format!("identity provider request failed: {}", e))
}

fn to_identity(body: Introspection) -> PortResult<Identity> {
    if !body.active {
        return Err(PortError::Unauthorized);
    }
    let external_id = body.sub.filter(|s| !s.is_empty()).ok_or(PortError::Unauthorized)?;
    let name = body
        .name
        .filter(|n| !n.trim().is_empty())
        .or_else(|| body.email.clone())
        .unwrap_or_else(|| external_id.clone());
    Ok(Identity {
        external_id,
        name,
        email: body.email,
        role: body.public_metadata.and_then(|m| m.role),
    })
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn verify_token(&self, bearer: &str) -> PortResult<Identity> {
        let resp = self
            .client
            .get(&self.introspection_url)
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(transport)?;

        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Err(PortError::Unauthorized),
            status if !status.is_success() => {
                let text = resp.text().await.unwrap_or_default();
                error!("Identity introspection error: {} - {}", status, text);
                return Err(PortError::Unexpected(format!(
                    "identity provider returned {}",
                    status
                )));
            }
            _ => {}
        }

        let body: Introspection = resp.json().await.map_err(transport)?;
        to_identity(body)
    }

    async fn update_role_claim(&self, external_id: &str, role: Role) -> PortResult<()> {
        let mut request = self
            .client
            .patch(format!("{}/users/{}/metadata", self.admin_url, external_id))
            .json(&json!({ "public_metadata": PublicMetadata { role: Some(role) } }));
        if let Some(key) = &self.secret_key {
            request = request.bearer_auth(key);
        }

        let resp = request.send().await.map_err(transport)?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            error!("Identity role sync error for {}: {} - {}", external_id, status, text);
            return Err(match status {
                StatusCode::NOT_FOUND => {
                    PortError::NotFound(format!("identity {} not found", external_id))
                }
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PortError::Unauthorized,
                other => PortError::Unexpected(format!("identity provider returned {}", other)),
            });
        }
        Ok(())
    }
}
