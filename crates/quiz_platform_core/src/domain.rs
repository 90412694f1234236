//! crates/quiz_platform_core/src/domain.rs
//!
//! Defines the pure, core data structures for the quiz platform.
//! These structs are independent of any database or HTTP representation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Users & Catalog
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Teacher,
    Student,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Student => "student",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "teacher" => Ok(Role::Teacher),
            "student" => Ok(Role::Student),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// A platform user. `id` is the local role-prefixed code, `external_id` the
/// subject issued by the identity provider.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub external_id: String,
    pub name: String,
    pub email: Option<String>,
    pub role: Role,
    pub subscription_id: String,
    pub points: i64,
    pub active_avatar_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a user; the store allocates the id.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub external_id: String,
    pub name: String,
    pub email: Option<String>,
    pub role: Role,
    pub subscription_id: String,
}

/// Verified caller identity as reported by the identity provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub external_id: String,
    pub name: String,
    pub email: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionTier {
    pub id: String,
    pub name: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rarity::Common => "common",
            Rarity::Rare => "rare",
            Rarity::Epic => "epic",
            Rarity::Legendary => "legendary",
        }
    }
}

impl FromStr for Rarity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "common" => Ok(Rarity::Common),
            "rare" => Ok(Rarity::Rare),
            "epic" => Ok(Rarity::Epic),
            "legendary" => Ok(Rarity::Legendary),
            other => Err(format!("unknown rarity '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Avatar {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    pub rarity: Rarity,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct NewAvatar {
    pub name: String,
    pub price: Decimal,
    pub rarity: Rarity,
}

/// Ownership fact: presence of the row means the user owns the avatar.
#[derive(Debug, Clone, PartialEq)]
pub struct UserAvatar {
    pub user_id: String,
    pub avatar_id: String,
    pub purchased_at: DateTime<Utc>,
}

//=========================================================================================
// Payments
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Maps the gateway's status vocabulary onto the local tri-state.
    pub fn from_gateway(transaction_status: &str) -> Self {
        match transaction_status {
            "capture" | "settlement" => TransactionStatus::Success,
            "cancel" | "deny" | "expire" => TransactionStatus::Failed,
            _ => TransactionStatus::Pending,
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "success" => Ok(TransactionStatus::Success),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(format!("unknown transaction status '{}'", other)),
        }
    }
}

/// What a transaction pays for. The category and the populated target field
/// cannot disagree because they are the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PurchaseTarget {
    Subscription(String),
    Item(String),
}

impl PurchaseTarget {
    pub fn category(&self) -> &'static str {
        match self {
            PurchaseTarget::Subscription(_) => "subscription",
            PurchaseTarget::Item(_) => "item",
        }
    }

    pub fn target_id(&self) -> &str {
        match self {
            PurchaseTarget::Subscription(id) | PurchaseTarget::Item(id) => id,
        }
    }

    pub fn subscription_id(&self) -> Option<&str> {
        match self {
            PurchaseTarget::Subscription(id) => Some(id),
            PurchaseTarget::Item(_) => None,
        }
    }

    pub fn item_id(&self) -> Option<&str> {
        match self {
            PurchaseTarget::Item(id) => Some(id),
            PurchaseTarget::Subscription(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub target: PurchaseTarget,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub payment_method: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: String,
    pub target: PurchaseTarget,
    pub amount: Decimal,
}

/// The durable effect applied when a transaction settles successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entitlement {
    Subscription { user_id: String, subscription_id: String },
    Avatar { user_id: String, avatar_id: String },
}

impl Entitlement {
    pub fn for_transaction(tx: &Transaction) -> Self {
        match &tx.target {
            PurchaseTarget::Subscription(id) => Entitlement::Subscription {
                user_id: tx.user_id.clone(),
                subscription_id: id.clone(),
            },
            PurchaseTarget::Item(id) => Entitlement::Avatar {
                user_id: tx.user_id.clone(),
                avatar_id: id.clone(),
            },
        }
    }
}

/// Line item and buyer details sent to the hosted checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub order_id: String,
    pub gross_amount: Decimal,
    pub item_id: String,
    pub item_name: String,
    pub buyer_name: String,
    pub buyer_email: Option<String>,
    pub expiry_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutToken {
    pub token: String,
    pub redirect_url: String,
}

/// A status report about one order, either pushed (webhook) or pulled (poll).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GatewayStatus {
    pub order_id: String,
    pub status_code: String,
    pub gross_amount: String,
    pub transaction_status: String,
    #[serde(default)]
    pub payment_type: Option<String>,
    #[serde(default)]
    pub fraud_status: Option<String>,
}

/// The signed server-to-server notification delivered to the webhook.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PaymentNotification {
    #[serde(flatten)]
    pub status: GatewayStatus,
    pub signature_key: String,
}

/// Returned from a successful `create_purchase_intent`.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseIntent {
    pub transaction: Transaction,
    pub checkout: CheckoutToken,
}

/// Atomic outcome of spending points on an avatar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointsPurchase {
    Purchased,
    InsufficientPoints,
    AlreadyOwned,
}

//=========================================================================================
// Quizzes & Questions
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(format!("unknown visibility '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quiz {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub code: Option<String>,
    pub visibility: Visibility,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
}

/// Fields a teacher supplies when creating or editing a quiz.
#[derive(Debug, Clone)]
pub struct QuizDraft {
    pub title: String,
    pub description: String,
    pub category: String,
    pub code: Option<String>,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    Multiple,
    Boolean,
}

impl QuestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::Multiple => "multiple",
            QuestionKind::Boolean => "boolean",
        }
    }
}

impl FromStr for QuestionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "multiple" => Ok(QuestionKind::Multiple),
            "boolean" => Ok(QuestionKind::Boolean),
            other => Err(format!("unknown question type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub id: String,
    pub quiz_id: String,
    pub kind: QuestionKind,
    pub difficulty: Difficulty,
    pub text: String,
    pub correct_answer: String,
    pub incorrect_answers: Vec<String>,
    pub explanation: Option<String>,
    pub generated: bool,
}

impl Question {
    /// The correct and incorrect answers together, in storage order.
    pub fn options(&self) -> Vec<String> {
        std::iter::once(self.correct_answer.clone())
            .chain(self.incorrect_answers.iter().cloned())
            .collect()
    }

    pub fn has_option(&self, answer: &str) -> bool {
        let answer = answer.trim();
        self.correct_answer.trim() == answer
            || self.incorrect_answers.iter().any(|a| a.trim() == answer)
    }

    /// Exact-match grading on trimmed strings; case-sensitive.
    pub fn is_correct(&self, answer: &str) -> bool {
        answer.trim() == self.correct_answer.trim()
    }
}

#[derive(Debug, Clone)]
pub struct QuestionDraft {
    pub kind: QuestionKind,
    pub difficulty: Difficulty,
    pub text: String,
    pub correct_answer: String,
    pub incorrect_answers: Vec<String>,
    pub explanation: Option<String>,
}

/// Parameters handed to the question generator.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub topic: String,
    pub kind: QuestionKind,
    pub difficulty: Difficulty,
    pub style: Option<String>,
}

/// A question as returned by the generator, before validation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneratedQuestion {
    pub question: String,
    pub correct_answer: String,
    pub incorrect_answers: Vec<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

//=========================================================================================
// Quiz Sessions
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Expired => "expired",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(SessionStatus::InProgress),
            "completed" => Ok(SessionStatus::Completed),
            "expired" => Ok(SessionStatus::Expired),
            other => Err(format!("unknown session status '{}'", other)),
        }
    }
}

/// One student's attempt at a quiz.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizSession {
    pub id: Uuid,
    pub quiz_id: String,
    pub user_id: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub score: Option<i32>,
}

/// Result of the atomic find-or-create used when starting a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStart {
    Created(QuizSession),
    Existing(QuizSession),
}

impl SessionStart {
    pub fn session(&self) -> &QuizSession {
        match self {
            SessionStart::Created(s) | SessionStart::Existing(s) => s,
        }
    }

    pub fn into_session(self) -> QuizSession {
        match self {
            SessionStart::Created(s) | SessionStart::Existing(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionAnswer {
    pub id: Uuid,
    pub session_id: Uuid,
    pub question_id: String,
    pub selected_answer: String,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

/// A question as presented to a student: no correctness information, options
/// shuffled per request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresentedQuestion {
    pub id: String,
    pub kind: QuestionKind,
    pub difficulty: Difficulty,
    pub text: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewItem {
    pub question_id: String,
    pub question_text: String,
    pub selected_answer: String,
    pub correct_answer: String,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

/// The latest completed attempt of a student at a quiz, with every answer.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReview {
    pub session: QuizSession,
    pub items: Vec<ReviewItem>,
}

//=========================================================================================
// Audit
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct AuditLog {
    pub id: Uuid,
    pub actor_id: Option<String>,
    pub action: String,
    pub entity: String,
    pub entity_id: String,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Optional filters for the admin log search; each present field narrows the
/// result (conjunction).
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub actor_id: Option<String>,
    pub action: Option<String>,
    pub entity: Option<String>,
    pub entity_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl AuditFilter {
    pub fn matches(&self, log: &AuditLog) -> bool {
        self.actor_id
            .as_ref()
            .is_none_or(|a| log.actor_id.as_deref() == Some(a.as_str()))
            && self.action.as_ref().is_none_or(|a| &log.action == a)
            && self.entity.as_ref().is_none_or(|e| &log.entity == e)
            && self.entity_id.as_ref().is_none_or(|e| &log.entity_id == e)
            && self.from.is_none_or(|from| log.created_at >= from)
            && self.to.is_none_or(|to| log.created_at <= to)
    }
}
