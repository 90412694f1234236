//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::web::{reject, state::AppState};

fn bearer_token(headers: &HeaderMap) -> Result<&str, (StatusCode, String)> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                "A bearer token is required".to_string(),
            )
        })
}

/// Middleware that resolves the bearer token to an active, registered user.
///
/// If valid, inserts the `User` into request extensions for handlers to use.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, (StatusCode, String)> {
    let token = bearer_token(req.headers())?.to_string();
    let user = state.users.authenticate(&token).await.map_err(reject)?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Like [`require_auth`] but only verifies the credential, for callers that
/// have no local account yet.
pub async fn require_identity(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, (StatusCode, String)> {
    let token = bearer_token(req.headers())?.to_string();
    let identity = state.users.identify(&token).await.map_err(reject)?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_prefix_is_required() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers).unwrap_err().0, StatusCode::UNAUTHORIZED);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer tok-1"));
        assert_eq!(bearer_token(&headers).unwrap(), "tok-1");
    }
}
