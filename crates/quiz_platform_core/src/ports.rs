//! crates/quiz_platform_core/src/ports.rs
//!
//! Defines the service contracts (traits) the core logic depends on.
//! These traits form the boundary of the hexagonal architecture: the core never
//! talks to a database, payment gateway or identity provider directly.

use crate::domain::{
    AuditFilter, AuditLog, Avatar, CheckoutRequest, CheckoutToken, Entitlement, GatewayStatus,
    GeneratedQuestion, GenerationParams, Identity, NewAvatar, NewTransaction, NewUser,
    PointsPurchase, Question, QuestionDraft, Quiz, QuizDraft, QuizSession, Role, SessionStart,
    SubmissionAnswer, SubscriptionTier, Transaction, TransactionStatus, User, UserAvatar,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A uniqueness invariant other than the primary key was violated.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// The freshly allocated primary key already exists; the caller may retry.
    #[error("Id collision on {0}")]
    IdCollision(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Relational Store
//=========================================================================================

/// The relational store. Every invariant the services rely on (one pending
/// transaction per target, one in-progress session per quiz, one answer per
/// question) is enforced here atomically, not by check-then-insert in callers.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Users ---
    async fn create_user(&self, user: NewUser) -> PortResult<User>;

    async fn get_user(&self, user_id: &str) -> PortResult<User>;

    async fn get_user_by_external_id(&self, external_id: &str) -> PortResult<Option<User>>;

    async fn update_user_role(&self, user_id: &str, role: Role) -> PortResult<User>;

    async fn set_user_active(&self, user_id: &str, is_active: bool) -> PortResult<()>;

    async fn set_active_avatar(&self, user_id: &str, avatar_id: &str) -> PortResult<()>;

    // --- Catalog ---
    async fn get_subscription_tier(&self, tier_id: &str) -> PortResult<SubscriptionTier>;

    async fn list_subscription_tiers(&self) -> PortResult<Vec<SubscriptionTier>>;

    async fn create_avatar(&self, avatar: NewAvatar) -> PortResult<Avatar>;

    async fn get_avatar(&self, avatar_id: &str) -> PortResult<Avatar>;

    async fn list_avatars(&self, include_inactive: bool) -> PortResult<Vec<Avatar>>;

    async fn set_avatar_active(&self, avatar_id: &str, is_active: bool) -> PortResult<Avatar>;

    async fn user_owns_avatar(&self, user_id: &str, avatar_id: &str) -> PortResult<bool>;

    async fn list_user_avatars(&self, user_id: &str) -> PortResult<Vec<UserAvatar>>;

    /// Debits `price` points and records ownership in one atomic step,
    /// guarded by `points >= price` and the (user, avatar) uniqueness.
    async fn spend_points_for_avatar(
        &self,
        user_id: &str,
        avatar_id: &str,
        price: i64,
    ) -> PortResult<PointsPurchase>;

    // --- Transactions ---
    /// Persists a pending transaction. Fails with `Conflict` when the user
    /// already has a pending transaction for the same target.
    async fn create_pending_transaction(&self, tx: NewTransaction) -> PortResult<Transaction>;

    async fn get_transaction(&self, transaction_id: &str) -> PortResult<Transaction>;

    async fn list_transactions_for_user(&self, user_id: &str) -> PortResult<Vec<Transaction>>;

    /// Moves a transaction out of `pending` with a conditional update and, in
    /// the same store transaction, applies `grant` when present. Returns
    /// `false` (and changes nothing) if the transaction was no longer pending.
    async fn settle_transaction(
        &self,
        transaction_id: &str,
        status: TransactionStatus,
        payment_method: Option<&str>,
        grant: Option<Entitlement>,
    ) -> PortResult<bool>;

    // --- Quizzes & Questions ---
    async fn create_quiz(&self, owner_id: &str, draft: QuizDraft) -> PortResult<Quiz>;

    async fn get_quiz(&self, quiz_id: &str) -> PortResult<Quiz>;

    async fn get_quiz_by_code(&self, code: &str) -> PortResult<Quiz>;

    async fn list_visible_quizzes(&self, viewer_id: &str) -> PortResult<Vec<Quiz>>;

    async fn update_quiz(&self, quiz_id: &str, draft: QuizDraft) -> PortResult<Quiz>;

    async fn delete_quiz(&self, quiz_id: &str) -> PortResult<()>;

    async fn create_question(
        &self,
        quiz_id: &str,
        draft: QuestionDraft,
        generated: bool,
    ) -> PortResult<Question>;

    async fn get_question(&self, question_id: &str) -> PortResult<Question>;

    async fn list_questions(&self, quiz_id: &str) -> PortResult<Vec<Question>>;

    async fn count_questions(&self, quiz_id: &str) -> PortResult<i64>;

    async fn update_question(&self, question_id: &str, draft: QuestionDraft) -> PortResult<Question>;

    async fn delete_question(&self, question_id: &str) -> PortResult<()>;

    // --- Quiz Sessions ---
    /// Atomic find-or-create of the caller's in-progress session for a quiz.
    async fn start_session(&self, user_id: &str, quiz_id: &str) -> PortResult<SessionStart>;

    async fn get_session(&self, session_id: Uuid) -> PortResult<QuizSession>;

    /// Conditionally completes an in-progress session. Returns `false` if the
    /// session was no longer in progress.
    async fn complete_session(
        &self,
        session_id: Uuid,
        score: i32,
        ended_at: DateTime<Utc>,
    ) -> PortResult<bool>;

    async fn latest_completed_session(
        &self,
        user_id: &str,
        quiz_id: &str,
    ) -> PortResult<Option<QuizSession>>;

    // --- Answers ---
    /// Fails with `Conflict` if the (session, question) pair already has an
    /// answer or the session is no longer in progress. The status check and
    /// the write are atomic.
    async fn insert_answer(&self, answer: SubmissionAnswer) -> PortResult<SubmissionAnswer>;

    /// Overwrites an existing answer; `NotFound` if there is none, `Conflict`
    /// if the session is no longer in progress.
    async fn update_answer(
        &self,
        session_id: Uuid,
        question_id: &str,
        selected_answer: &str,
        is_correct: bool,
        answered_at: DateTime<Utc>,
    ) -> PortResult<SubmissionAnswer>;

    async fn list_answers(&self, session_id: Uuid) -> PortResult<Vec<SubmissionAnswer>>;

    // --- Audit ---
    async fn insert_audit_log(&self, log: AuditLog) -> PortResult<()>;

    async fn search_audit_logs(&self, filter: &AuditFilter) -> PortResult<Vec<AuditLog>>;
}

//=========================================================================================
// External Collaborators
//=========================================================================================

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verifies a bearer credential and returns the caller's identity.
    async fn verify_token(&self, bearer: &str) -> PortResult<Identity>;

    /// Pushes the local role back into the provider's claims.
    async fn update_role_claim(&self, external_id: &str, role: Role) -> PortResult<()>;
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Requests a hosted-checkout token for an order.
    async fn create_checkout(&self, request: &CheckoutRequest) -> PortResult<CheckoutToken>;

    /// Pulls the current status of an order.
    async fn fetch_status(&self, order_id: &str) -> PortResult<GatewayStatus>;

    async fn cancel(&self, order_id: &str) -> PortResult<()>;
}

#[async_trait]
pub trait QuestionGenerationService: Send + Sync {
    /// Produces one question for the given topic and difficulty.
    async fn generate_question(&self, params: &GenerationParams) -> PortResult<GeneratedQuestion>;
}
