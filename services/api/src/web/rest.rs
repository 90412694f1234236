//! services/api/src/web/rest.rs
//!
//! Contains the response payloads shared by the REST handlers and the master
//! definition for the OpenAPI specification.

use crate::web::{account, admin, payments, quizzes, sessions};
use chrono::{DateTime, Utc};
use quiz_platform_core::domain::{
    AuditLog, Avatar, PresentedQuestion, Question, Quiz, QuizSession, ReviewItem, SessionReview,
    SubmissionAnswer, SubscriptionTier, Transaction, User, UserAvatar,
};
use quiz_platform_core::payments::format_amount;
use serde::Serialize;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi, ToSchema,
};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        account::register_handler,
        account::me_handler,
        account::equip_avatar_handler,
        account::owned_avatars_handler,
        account::list_tiers_handler,
        account::list_avatars_handler,
        account::buy_avatar_handler,
        payments::create_intent_handler,
        payments::list_transactions_handler,
        payments::check_payment_handler,
        payments::poll_payment_handler,
        payments::cancel_payment_handler,
        payments::webhook_handler,
        quizzes::list_quizzes_handler,
        quizzes::create_quiz_handler,
        quizzes::find_by_code_handler,
        quizzes::update_quiz_handler,
        quizzes::delete_quiz_handler,
        quizzes::list_questions_handler,
        quizzes::add_question_handler,
        quizzes::generate_question_handler,
        quizzes::update_question_handler,
        quizzes::delete_question_handler,
        sessions::start_session_handler,
        sessions::session_questions_handler,
        sessions::submit_answer_handler,
        sessions::revise_answer_handler,
        sessions::complete_session_handler,
        sessions::force_complete_handler,
        sessions::latest_review_handler,
        admin::change_role_handler,
        admin::set_user_active_handler,
        admin::create_avatar_handler,
        admin::set_avatar_active_handler,
        admin::search_audit_handler,
    ),
    components(schemas(
        UserResponse,
        TierResponse,
        AvatarResponse,
        OwnedAvatarResponse,
        TransactionResponse,
        QuizResponse,
        QuestionResponse,
        PresentedQuestionResponse,
        SessionResponse,
        AnswerResponse,
        ReviewResponse,
        ReviewItemResponse,
        AuditLogResponse,
        account::RegisterRequest,
        account::EquipAvatarRequest,
        payments::CreateIntentRequest,
        payments::IntentResponse,
        payments::NotificationPayload,
        payments::StatusResponse,
        quizzes::QuizPayload,
        quizzes::QuestionPayload,
        quizzes::GeneratePayload,
        sessions::SubmitAnswerRequest,
        sessions::ReviseAnswerRequest,
        admin::ChangeRoleRequest,
        admin::SetActiveRequest,
        admin::CreateAvatarRequest,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "Quiz Platform API", description = "Quizzes, quiz sessions, the shop and payments.")
    )
)]
pub struct ApiDoc;

/// Registers the bearer scheme referenced by the protected paths.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

//=========================================================================================
// API Response Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub role: String,
    pub subscription_id: String,
    pub points: i64,
    pub active_avatar_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            role: u.role.as_str().to_string(),
            id: u.id,
            name: u.name,
            email: u.email,
            subscription_id: u.subscription_id,
            points: u.points,
            active_avatar_id: u.active_avatar_id,
            is_active: u.is_active,
            created_at: u.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct TierResponse {
    pub id: String,
    pub name: String,
    /// Two-decimal string, e.g. "49000.00".
    pub price: String,
}

impl From<SubscriptionTier> for TierResponse {
    fn from(t: SubscriptionTier) -> Self {
        Self {
            price: format_amount(t.price),
            id: t.id,
            name: t.name,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct AvatarResponse {
    pub id: String,
    pub name: String,
    pub price: String,
    pub rarity: String,
    pub is_active: bool,
}

impl From<Avatar> for AvatarResponse {
    fn from(a: Avatar) -> Self {
        Self {
            price: format_amount(a.price),
            rarity: a.rarity.as_str().to_string(),
            id: a.id,
            name: a.name,
            is_active: a.is_active,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct OwnedAvatarResponse {
    pub avatar_id: String,
    pub purchased_at: DateTime<Utc>,
}

impl From<UserAvatar> for OwnedAvatarResponse {
    fn from(a: UserAvatar) -> Self {
        Self {
            avatar_id: a.avatar_id,
            purchased_at: a.purchased_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct TransactionResponse {
    pub id: String,
    pub user_id: String,
    /// `subscription` or `item`.
    pub category: String,
    pub target_id: String,
    pub amount: String,
    pub status: String,
    pub payment_method: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionResponse {
    fn from(t: Transaction) -> Self {
        Self {
            category: t.target.category().to_string(),
            target_id: t.target.target_id().to_string(),
            amount: format_amount(t.amount),
            status: t.status.as_str().to_string(),
            id: t.id,
            user_id: t.user_id,
            payment_method: t.payment_method,
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct QuizResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub code: Option<String>,
    pub visibility: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
}

impl From<Quiz> for QuizResponse {
    fn from(q: Quiz) -> Self {
        Self {
            visibility: q.visibility.as_str().to_string(),
            id: q.id,
            title: q.title,
            description: q.description,
            category: q.category,
            code: q.code,
            owner_id: q.owner_id,
            created_at: q.created_at,
        }
    }
}

/// A question with its answers, as seen by the owning teacher.
#[derive(Serialize, ToSchema)]
pub struct QuestionResponse {
    pub id: String,
    pub quiz_id: String,
    pub kind: String,
    pub difficulty: String,
    pub text: String,
    pub correct_answer: String,
    pub incorrect_answers: Vec<String>,
    pub explanation: Option<String>,
    pub generated: bool,
}

impl From<Question> for QuestionResponse {
    fn from(q: Question) -> Self {
        Self {
            kind: q.kind.as_str().to_string(),
            difficulty: q.difficulty.as_str().to_string(),
            id: q.id,
            quiz_id: q.quiz_id,
            text: q.text,
            correct_answer: q.correct_answer,
            incorrect_answers: q.incorrect_answers,
            explanation: q.explanation,
            generated: q.generated,
        }
    }
}

/// A question as shown during an attempt; the correct answer is not revealed.
#[derive(Serialize, ToSchema)]
pub struct PresentedQuestionResponse {
    pub id: String,
    pub kind: String,
    pub difficulty: String,
    pub text: String,
    pub options: Vec<String>,
}

impl From<PresentedQuestion> for PresentedQuestionResponse {
    fn from(q: PresentedQuestion) -> Self {
        Self {
            kind: q.kind.as_str().to_string(),
            difficulty: q.difficulty.as_str().to_string(),
            id: q.id,
            text: q.text,
            options: q.options,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SessionResponse {
    pub id: Uuid,
    pub quiz_id: String,
    pub user_id: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Percentage 0..=100, present once completed.
    pub score: Option<i32>,
}

impl From<QuizSession> for SessionResponse {
    fn from(s: QuizSession) -> Self {
        Self {
            status: s.status.as_str().to_string(),
            id: s.id,
            quiz_id: s.quiz_id,
            user_id: s.user_id,
            started_at: s.started_at,
            ended_at: s.ended_at,
            score: s.score,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct AnswerResponse {
    pub id: Uuid,
    pub session_id: Uuid,
    pub question_id: String,
    pub selected_answer: String,
    pub answered_at: DateTime<Utc>,
}

impl From<SubmissionAnswer> for AnswerResponse {
    fn from(a: SubmissionAnswer) -> Self {
        Self {
            id: a.id,
            session_id: a.session_id,
            question_id: a.question_id,
            selected_answer: a.selected_answer,
            answered_at: a.answered_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ReviewItemResponse {
    pub question_id: String,
    pub question_text: String,
    pub selected_answer: String,
    pub correct_answer: String,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

impl From<ReviewItem> for ReviewItemResponse {
    fn from(i: ReviewItem) -> Self {
        Self {
            question_id: i.question_id,
            question_text: i.question_text,
            selected_answer: i.selected_answer,
            correct_answer: i.correct_answer,
            is_correct: i.is_correct,
            answered_at: i.answered_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ReviewResponse {
    pub session: SessionResponse,
    pub items: Vec<ReviewItemResponse>,
}

impl From<SessionReview> for ReviewResponse {
    fn from(r: SessionReview) -> Self {
        Self {
            session: r.session.into(),
            items: r.items.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct AuditLogResponse {
    pub id: Uuid,
    pub actor_id: Option<String>,
    pub action: String,
    pub entity: String,
    pub entity_id: String,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<AuditLog> for AuditLogResponse {
    fn from(l: AuditLog) -> Self {
        Self {
            id: l.id,
            actor_id: l.actor_id,
            action: l.action,
            entity: l.entity,
            entity_id: l.entity_id,
            detail: l.detail,
            created_at: l.created_at,
        }
    }
}

/// Converts a list of domain values into their response shape.
pub fn respond_all<T, R: From<T>>(items: Vec<T>) -> Vec<R> {
    items.into_iter().map(R::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_platform_core::domain::{PurchaseTarget, TransactionStatus};
    use rust_decimal_macros::dec;

    #[test]
    fn transactions_render_amounts_as_two_decimal_strings() {
        let now = Utc::now();
        let response = TransactionResponse::from(Transaction {
            id: "TR000001".to_string(),
            user_id: "ST001".to_string(),
            target: PurchaseTarget::Subscription("SB002".to_string()),
            amount: dec!(49000),
            status: TransactionStatus::Success,
            payment_method: Some("qris".to_string()),
            created_at: now,
            updated_at: now,
        });
        assert_eq!(response.amount, "49000.00");
        assert_eq!(response.category, "subscription");
        assert_eq!(response.target_id, "SB002");
        assert_eq!(response.status, "success");
    }

    #[test]
    fn openapi_document_lists_the_webhook() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/payments/notifications"));
        assert!(doc.paths.paths.contains_key("/sessions/{session_id}/answers"));
    }
}
