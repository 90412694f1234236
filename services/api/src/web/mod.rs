pub mod account;
pub mod admin;
pub mod middleware;
pub mod payments;
pub mod quizzes;
pub mod rest;
pub mod sessions;
pub mod state;

pub use middleware::{require_auth, require_identity};

use axum::{
    http::StatusCode,
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use quiz_platform_core::CoreError;
use state::AppState;
use std::sync::Arc;
use tracing::{error, warn};

/// Maps a service error onto the status code and message returned to clients.
pub fn reject(e: CoreError) -> (StatusCode, String) {
    match e {
        CoreError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
        CoreError::UpstreamUnavailable(msg) => {
            warn!("Upstream dependency unavailable: {}", msg);
            (StatusCode::BAD_GATEWAY, "An upstream service is unavailable".to_string())
        }
        e @ CoreError::SignatureInvalid => (StatusCode::UNAUTHORIZED, e.to_string()),
        CoreError::Internal(msg) => {
            error!("Internal error: {}", msg);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An unexpected internal error occurred".to_string(),
            )
        }
    }
}

/// Builds every API route. Authentication layers are applied per group; CORS
/// and the Swagger UI are added by the binary.
pub fn router(state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new().route("/payments/notifications", post(payments::webhook_handler));

    // Verified identity without a local account
    let identity_routes = Router::new()
        .route("/users/register", post(account::register_handler))
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_identity));

    // Protected routes (registered, active user required)
    let protected_routes = Router::new()
        .route("/users/me", get(account::me_handler))
        .route(
            "/users/me/avatars",
            get(account::owned_avatars_handler).put(account::equip_avatar_handler),
        )
        .route("/subscriptions", get(account::list_tiers_handler))
        .route("/avatars", get(account::list_avatars_handler))
        .route("/avatars/{avatar_id}/purchase", post(account::buy_avatar_handler))
        .route(
            "/payments",
            get(payments::list_transactions_handler).post(payments::create_intent_handler),
        )
        .route("/payments/{transaction_id}", get(payments::check_payment_handler))
        .route("/payments/{transaction_id}/poll", post(payments::poll_payment_handler))
        .route("/payments/{transaction_id}/cancel", post(payments::cancel_payment_handler))
        .route(
            "/quizzes",
            get(quizzes::list_quizzes_handler).post(quizzes::create_quiz_handler),
        )
        .route("/quizzes/code/{code}", get(quizzes::find_by_code_handler))
        .route(
            "/quizzes/{quiz_id}",
            put(quizzes::update_quiz_handler).delete(quizzes::delete_quiz_handler),
        )
        .route(
            "/quizzes/{quiz_id}/questions",
            get(quizzes::list_questions_handler).post(quizzes::add_question_handler),
        )
        .route(
            "/quizzes/{quiz_id}/questions/generate",
            post(quizzes::generate_question_handler),
        )
        .route(
            "/questions/{question_id}",
            put(quizzes::update_question_handler).delete(quizzes::delete_question_handler),
        )
        .route("/quizzes/{quiz_id}/sessions", post(sessions::start_session_handler))
        .route("/quizzes/{quiz_id}/review", get(sessions::latest_review_handler))
        .route(
            "/sessions/{session_id}/questions",
            get(sessions::session_questions_handler),
        )
        .route("/sessions/{session_id}/answers", post(sessions::submit_answer_handler))
        .route(
            "/sessions/{session_id}/answers/{question_id}",
            put(sessions::revise_answer_handler),
        )
        .route("/sessions/{session_id}/complete", post(sessions::complete_session_handler))
        .route(
            "/sessions/{session_id}/force-complete",
            post(sessions::force_complete_handler),
        )
        .route("/admin/users/{user_id}/role", put(admin::change_role_handler))
        .route("/admin/users/{user_id}/active", put(admin::set_user_active_handler))
        .route("/admin/avatars", post(admin::create_avatar_handler))
        .route(
            "/admin/avatars/{avatar_id}/active",
            put(admin::set_avatar_active_handler),
        )
        .route("/admin/audit-logs", get(admin::search_audit_handler))
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(identity_routes)
        .merge(protected_routes)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_distinct_statuses() {
        let cases = [
            (CoreError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (CoreError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (CoreError::Conflict("x".into()), StatusCode::CONFLICT),
            (CoreError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (CoreError::UpstreamUnavailable("x".into()), StatusCode::BAD_GATEWAY),
            (CoreError::SignatureInvalid, StatusCode::UNAUTHORIZED),
            (CoreError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(reject(error).0, status);
        }
    }

    #[test]
    fn internal_details_are_not_leaked() {
        let (_, message) = reject(CoreError::Internal("connection refused at 10.0.0.3".into()));
        assert!(!message.contains("10.0.0.3"));
    }
}
