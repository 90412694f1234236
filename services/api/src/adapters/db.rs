//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Uniqueness invariants live in the schema (partial unique indexes, composite
//! keys); multi-row effects run inside one database transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quiz_platform_core::domain::{
    AuditFilter, AuditLog, Avatar, Entitlement, NewAvatar, NewTransaction, NewUser,
    PointsPurchase, PurchaseTarget, Question, QuestionDraft, Quiz, QuizDraft, QuizSession, Role,
    SessionStart, SubmissionAnswer, SubscriptionTier, Transaction, TransactionStatus, User,
    UserAvatar,
};
use quiz_platform_core::ids::{self, IdCandidate, IdSequence};
use quiz_platform_core::ports::{DatabaseService, PortError, PortResult};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use std::fmt::Display;
use std::str::FromStr;
use uuid::Uuid;

type PgTx<'a> = sqlx::Transaction<'a, Postgres>;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn begin(&self) -> PortResult<PgTx<'static>> {
        self.pool.begin().await.map_err(unexpected)
    }
}

/// Computes the id for one insert attempt. Concurrent allocations for the same
/// prefix are serialised by a transaction-scoped advisory lock.
async fn next_id(
    tx: &mut PgTx<'_>,
    seq: IdSequence,
    table: &str,
    candidate: IdCandidate,
) -> PortResult<String> {
    match candidate {
        IdCandidate::Fixed(id) => Ok(id),
        IdCandidate::Next => {
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
                .bind(seq.prefix)
                .execute(&mut **tx)
                .await
                .map_err(unexpected)?;
            let sql = format!(
                "SELECT COALESCE(MAX(CAST(SUBSTRING(id FROM {}) AS BIGINT)), 0) FROM {} WHERE id ~ $1",
                seq.prefix.len() + 1,
                table
            );
            let max: i64 = sqlx::query_scalar(&sql)
                .bind(format!("^{}[0-9]+$", seq.prefix))
                .fetch_one(&mut **tx)
                .await
                .map_err(unexpected)?;
            Ok(seq.format(max.max(0) as u64 + 1))
        }
    }
}

/// Share-locks the session row until the transaction ends, so a concurrent
/// completion waits for the answer write (or the write sees the completion).
async fn lock_open_session(tx: &mut PgTx<'_>, session_id: Uuid) -> PortResult<()> {
    let status: Option<String> =
        sqlx::query_scalar("SELECT status FROM quiz_sessions WHERE id = $1 FOR SHARE")
            .bind(session_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(unexpected)?;
    match status.as_deref() {
        None => Err(PortError::NotFound(format!("Session {} not found", session_id))),
        Some("in_progress") => Ok(()),
        Some(other) => Err(PortError::Conflict(format!("session {} is {}", session_id, other))),
    }
}

//=========================================================================================
// Error Mapping
//=========================================================================================

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn read_error(e: sqlx::Error, what: &str, id: impl Display) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(format!("{} {} not found", what, id)),
        other => unexpected(other),
    }
}

/// Primary-key clashes are retryable id collisions; any other unique
/// violation is a domain conflict.
fn write_error(e: sqlx::Error) -> PortError {
    if let Some(db) = e.as_database_error() {
        let constraint = db.constraint().unwrap_or_default().to_string();
        if db.is_unique_violation() {
            return if constraint.ends_with("_pkey") {
                PortError::IdCollision(constraint)
            } else {
                PortError::Conflict(constraint)
            };
        }
        if db.is_foreign_key_violation() {
            return PortError::NotFound(format!("referenced row is missing ({})", constraint));
        }
    }
    unexpected(e)
}

fn parse<T: FromStr<Err = String>>(value: &str) -> PortResult<T> {
    value.parse().map_err(PortError::Unexpected)
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const USER_COLUMNS: &str = "id, external_id, name, email, role, subscription_id, points, \
                            active_avatar_id, is_active, created_at";

#[derive(FromRow)]
struct UserRecord {
    id: String,
    external_id: String,
    name: String,
    email: Option<String>,
    role: String,
    subscription_id: String,
    points: i64,
    active_avatar_id: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> PortResult<User> {
        Ok(User {
            role: parse(&self.role)?,
            id: self.id,
            external_id: self.external_id,
            name: self.name,
            email: self.email,
            subscription_id: self.subscription_id,
            points: self.points,
            active_avatar_id: self.active_avatar_id,
            is_active: self.is_active,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct TierRecord {
    id: String,
    name: String,
    price: Decimal,
}
impl TierRecord {
    fn to_domain(self) -> SubscriptionTier {
        SubscriptionTier {
            id: self.id,
            name: self.name,
            price: self.price,
        }
    }
}

const AVATAR_COLUMNS: &str = "id, name, price, rarity, is_active";

#[derive(FromRow)]
struct AvatarRecord {
    id: String,
    name: String,
    price: Decimal,
    rarity: String,
    is_active: bool,
}
impl AvatarRecord {
    fn to_domain(self) -> PortResult<Avatar> {
        Ok(Avatar {
            rarity: parse(&self.rarity)?,
            id: self.id,
            name: self.name,
            price: self.price,
            is_active: self.is_active,
        })
    }
}

#[derive(FromRow)]
struct UserAvatarRecord {
    user_id: String,
    avatar_id: String,
    purchased_at: DateTime<Utc>,
}
impl UserAvatarRecord {
    fn to_domain(self) -> UserAvatar {
        UserAvatar {
            user_id: self.user_id,
            avatar_id: self.avatar_id,
            purchased_at: self.purchased_at,
        }
    }
}

const TRANSACTION_COLUMNS: &str = "id, user_id, category, subscription_id, item_id, amount, \
                                   status, payment_method, created_at, updated_at";

#[derive(FromRow)]
struct TransactionRecord {
    id: String,
    user_id: String,
    category: String,
    subscription_id: Option<String>,
    item_id: Option<String>,
    amount: Decimal,
    status: String,
    payment_method: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl TransactionRecord {
    fn to_domain(self) -> PortResult<Transaction> {
        let target = match (self.category.as_str(), self.subscription_id, self.item_id) {
            ("subscription", Some(id), None) => PurchaseTarget::Subscription(id),
            ("item", None, Some(id)) => PurchaseTarget::Item(id),
            _ => {
                return Err(PortError::Unexpected(format!(
                    "transaction {} has an inconsistent target",
                    self.id
                )))
            }
        };
        Ok(Transaction {
            status: parse(&self.status)?,
            id: self.id,
            user_id: self.user_id,
            target,
            amount: self.amount,
            payment_method: self.payment_method,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const QUIZ_COLUMNS: &str = "id, title, description, category, code, visibility, owner_id, created_at";

#[derive(FromRow)]
struct QuizRecord {
    id: String,
    title: String,
    description: String,
    category: String,
    code: Option<String>,
    visibility: String,
    owner_id: String,
    created_at: DateTime<Utc>,
}
impl QuizRecord {
    fn to_domain(self) -> PortResult<Quiz> {
        Ok(Quiz {
            visibility: parse(&self.visibility)?,
            id: self.id,
            title: self.title,
            description: self.description,
            category: self.category,
            code: self.code,
            owner_id: self.owner_id,
            created_at: self.created_at,
        })
    }
}

const QUESTION_COLUMNS: &str = "id, quiz_id, kind, difficulty, text, correct_answer, \
                                incorrect_answers, explanation, generated";

#[derive(FromRow)]
struct QuestionRecord {
    id: String,
    quiz_id: String,
    kind: String,
    difficulty: String,
    text: String,
    correct_answer: String,
    incorrect_answers: Vec<String>,
    explanation: Option<String>,
    generated: bool,
}
impl QuestionRecord {
    fn to_domain(self) -> PortResult<Question> {
        Ok(Question {
            kind: parse(&self.kind)?,
            difficulty: parse(&self.difficulty)?,
            id: self.id,
            quiz_id: self.quiz_id,
            text: self.text,
            correct_answer: self.correct_answer,
            incorrect_answers: self.incorrect_answers,
            explanation: self.explanation,
            generated: self.generated,
        })
    }
}

const SESSION_COLUMNS: &str = "id, quiz_id, user_id, status, started_at, ended_at, score";

#[derive(FromRow)]
struct SessionRecord {
    id: Uuid,
    quiz_id: String,
    user_id: String,
    status: String,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    score: Option<i32>,
}
impl SessionRecord {
    fn to_domain(self) -> PortResult<QuizSession> {
        Ok(QuizSession {
            status: parse(&self.status)?,
            id: self.id,
            quiz_id: self.quiz_id,
            user_id: self.user_id,
            started_at: self.started_at,
            ended_at: self.ended_at,
            score: self.score,
        })
    }
}

const ANSWER_COLUMNS: &str = "id, session_id, question_id, selected_answer, is_correct, answered_at";

#[derive(FromRow)]
struct AnswerRecord {
    id: Uuid,
    session_id: Uuid,
    question_id: String,
    selected_answer: String,
    is_correct: bool,
    answered_at: DateTime<Utc>,
}
impl AnswerRecord {
    fn to_domain(self) -> SubmissionAnswer {
        SubmissionAnswer {
            id: self.id,
            session_id: self.session_id,
            question_id: self.question_id,
            selected_answer: self.selected_answer,
            is_correct: self.is_correct,
            answered_at: self.answered_at,
        }
    }
}

const AUDIT_COLUMNS: &str = "id, actor_id, action, entity, entity_id, detail, created_at";

#[derive(FromRow)]
struct AuditRecord {
    id: Uuid,
    actor_id: Option<String>,
    action: String,
    entity: String,
    entity_id: String,
    detail: Option<String>,
    created_at: DateTime<Utc>,
}
impl AuditRecord {
    fn to_domain(self) -> AuditLog {
        AuditLog {
            id: self.id,
            actor_id: self.actor_id,
            action: self.action,
            entity: self.entity,
            entity_id: self.entity_id,
            detail: self.detail,
            created_at: self.created_at,
        }
    }
}

fn all<R, T>(records: Vec<R>, f: impl Fn(R) -> PortResult<T>) -> PortResult<Vec<T>> {
    records.into_iter().map(f).collect()
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    // --- Users ---

    async fn create_user(&self, user: NewUser) -> PortResult<User> {
        let seq = IdSequence::for_role(user.role);
        ids::allocate(seq, |candidate| {
            let user = user.clone();
            async move {
                let mut tx = self.begin().await?;
                let id = next_id(&mut tx, seq, "users", candidate).await?;
                let record = sqlx::query_as::<_, UserRecord>(&format!(
                    "INSERT INTO users (id, external_id, name, email, role, subscription_id) \
                     VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
                    USER_COLUMNS
                ))
                .bind(&id)
                .bind(&user.external_id)
                .bind(&user.name)
                .bind(&user.email)
                .bind(user.role.as_str())
                .bind(&user.subscription_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(write_error)?;
                tx.commit().await.map_err(unexpected)?;
                record.to_domain()
            }
        })
        .await
    }

    async fn get_user(&self, user_id: &str) -> PortResult<User> {
        sqlx::query_as::<_, UserRecord>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| read_error(e, "User", user_id))?
            .to_domain()
    }

    async fn get_user_by_external_id(&self, external_id: &str) -> PortResult<Option<User>> {
        sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE external_id = $1",
            USER_COLUMNS
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .map(UserRecord::to_domain)
        .transpose()
    }

    async fn update_user_role(&self, user_id: &str, role: Role) -> PortResult<User> {
        sqlx::query_as::<_, UserRecord>(&format!(
            "UPDATE users SET role = $2 WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| read_error(e, "User", user_id))?
        .to_domain()
    }

    async fn set_user_active(&self, user_id: &str, is_active: bool) -> PortResult<()> {
        let result = sqlx::query("UPDATE users SET is_active = $2 WHERE id = $1")
            .bind(user_id)
            .bind(is_active)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }

    async fn set_active_avatar(&self, user_id: &str, avatar_id: &str) -> PortResult<()> {
        let result = sqlx::query("UPDATE users SET active_avatar_id = $2 WHERE id = $1")
            .bind(user_id)
            .bind(avatar_id)
            .execute(&self.pool)
            .await
            .map_err(write_error)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }

    // --- Catalog ---

    async fn get_subscription_tier(&self, tier_id: &str) -> PortResult<SubscriptionTier> {
        let record = sqlx::query_as::<_, TierRecord>(
            "SELECT id, name, price FROM subscriptions WHERE id = $1",
        )
        .bind(tier_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| read_error(e, "Subscription tier", tier_id))?;
        Ok(record.to_domain())
    }

    async fn list_subscription_tiers(&self) -> PortResult<Vec<SubscriptionTier>> {
        let records =
            sqlx::query_as::<_, TierRecord>("SELECT id, name, price FROM subscriptions ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(unexpected)?;
        Ok(records.into_iter().map(TierRecord::to_domain).collect())
    }

    async fn create_avatar(&self, avatar: NewAvatar) -> PortResult<Avatar> {
        ids::allocate(IdSequence::AVATAR, |candidate| {
            let avatar = avatar.clone();
            async move {
                let mut tx = self.begin().await?;
                let id = next_id(&mut tx, IdSequence::AVATAR, "avatars", candidate).await?;
                let record = sqlx::query_as::<_, AvatarRecord>(&format!(
                    "INSERT INTO avatars (id, name, price, rarity) VALUES ($1, $2, $3, $4) RETURNING {}",
                    AVATAR_COLUMNS
                ))
                .bind(&id)
                .bind(&avatar.name)
                .bind(avatar.price)
                .bind(avatar.rarity.as_str())
                .fetch_one(&mut *tx)
                .await
                .map_err(write_error)?;
                tx.commit().await.map_err(unexpected)?;
                record.to_domain()
            }
        })
        .await
    }

    async fn get_avatar(&self, avatar_id: &str) -> PortResult<Avatar> {
        sqlx::query_as::<_, AvatarRecord>(&format!(
            "SELECT {} FROM avatars WHERE id = $1",
            AVATAR_COLUMNS
        ))
        .bind(avatar_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| read_error(e, "Avatar", avatar_id))?
        .to_domain()
    }

    async fn list_avatars(&self, include_inactive: bool) -> PortResult<Vec<Avatar>> {
        let records = sqlx::query_as::<_, AvatarRecord>(&format!(
            "SELECT {} FROM avatars WHERE is_active OR $1 ORDER BY id",
            AVATAR_COLUMNS
        ))
        .bind(include_inactive)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        all(records, AvatarRecord::to_domain)
    }

    async fn set_avatar_active(&self, avatar_id: &str, is_active: bool) -> PortResult<Avatar> {
        sqlx::query_as::<_, AvatarRecord>(&format!(
            "UPDATE avatars SET is_active = $2 WHERE id = $1 RETURNING {}",
            AVATAR_COLUMNS
        ))
        .bind(avatar_id)
        .bind(is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| read_error(e, "Avatar", avatar_id))?
        .to_domain()
    }

    async fn user_owns_avatar(&self, user_id: &str, avatar_id: &str) -> PortResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM user_avatars WHERE user_id = $1 AND avatar_id = $2)",
        )
        .bind(user_id)
        .bind(avatar_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)
    }

    async fn list_user_avatars(&self, user_id: &str) -> PortResult<Vec<UserAvatar>> {
        let records = sqlx::query_as::<_, UserAvatarRecord>(
            "SELECT user_id, avatar_id, purchased_at FROM user_avatars \
             WHERE user_id = $1 ORDER BY purchased_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(UserAvatarRecord::to_domain).collect())
    }

    async fn spend_points_for_avatar(
        &self,
        user_id: &str,
        avatar_id: &str,
        price: i64,
    ) -> PortResult<PointsPurchase> {
        let mut tx = self.begin().await?;

        let debited = sqlx::query("UPDATE users SET points = points - $2 WHERE id = $1 AND points >= $2")
            .bind(user_id)
            .bind(price)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        if debited.rows_affected() == 0 {
            let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(unexpected)?;
            return if exists {
                Ok(PointsPurchase::InsufficientPoints)
            } else {
                Err(PortError::NotFound(format!("User {} not found", user_id)))
            };
        }

        let granted = sqlx::query(
            "INSERT INTO user_avatars (user_id, avatar_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(avatar_id)
        .execute(&mut *tx)
        .await
        .map_err(write_error)?;
        if granted.rows_affected() == 0 {
            // Dropping the transaction rolls the debit back.
            return Ok(PointsPurchase::AlreadyOwned);
        }

        tx.commit().await.map_err(unexpected)?;
        Ok(PointsPurchase::Purchased)
    }

    // --- Transactions ---

    async fn create_pending_transaction(&self, new_tx: NewTransaction) -> PortResult<Transaction> {
        ids::allocate(IdSequence::TRANSACTION, |candidate| {
            let new_tx = new_tx.clone();
            async move {
                let mut tx = self.begin().await?;
                let id = next_id(&mut tx, IdSequence::TRANSACTION, "transactions", candidate).await?;
                let record = sqlx::query_as::<_, TransactionRecord>(&format!(
                    "INSERT INTO transactions (id, user_id, category, subscription_id, item_id, amount) \
                     VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
                    TRANSACTION_COLUMNS
                ))
                .bind(&id)
                .bind(&new_tx.user_id)
                .bind(new_tx.target.category())
                .bind(new_tx.target.subscription_id())
                .bind(new_tx.target.item_id())
                .bind(new_tx.amount)
                .fetch_one(&mut *tx)
                .await
                .map_err(write_error)?;
                tx.commit().await.map_err(unexpected)?;
                record.to_domain()
            }
        })
        .await
    }

    async fn get_transaction(&self, transaction_id: &str) -> PortResult<Transaction> {
        sqlx::query_as::<_, TransactionRecord>(&format!(
            "SELECT {} FROM transactions WHERE id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(transaction_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| read_error(e, "Transaction", transaction_id))?
        .to_domain()
    }

    async fn list_transactions_for_user(&self, user_id: &str) -> PortResult<Vec<Transaction>> {
        let records = sqlx::query_as::<_, TransactionRecord>(&format!(
            "SELECT {} FROM transactions WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
            TRANSACTION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        all(records, TransactionRecord::to_domain)
    }

    async fn settle_transaction(
        &self,
        transaction_id: &str,
        status: TransactionStatus,
        payment_method: Option<&str>,
        grant: Option<Entitlement>,
    ) -> PortResult<bool> {
        let mut tx = self.begin().await?;

        let updated = sqlx::query(
            "UPDATE transactions \
             SET status = $2, payment_method = COALESCE($3, payment_method), updated_at = now() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(transaction_id)
        .bind(status.as_str())
        .bind(payment_method)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        if updated.rows_affected() == 0 {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM transactions WHERE id = $1)")
                    .bind(transaction_id)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(unexpected)?;
            return if exists {
                Ok(false)
            } else {
                Err(PortError::NotFound(format!("Transaction {} not found", transaction_id)))
            };
        }

        match grant {
            Some(Entitlement::Subscription { user_id, subscription_id }) => {
                sqlx::query("UPDATE users SET subscription_id = $2 WHERE id = $1")
                    .bind(&user_id)
                    .bind(&subscription_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(write_error)?;
            }
            Some(Entitlement::Avatar { user_id, avatar_id }) => {
                sqlx::query(
                    "INSERT INTO user_avatars (user_id, avatar_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
                )
                .bind(&user_id)
                .bind(&avatar_id)
                .execute(&mut *tx)
                .await
                .map_err(write_error)?;
            }
            None => {}
        }

        tx.commit().await.map_err(unexpected)?;
        Ok(true)
    }

    // --- Quizzes & Questions ---

    async fn create_quiz(&self, owner_id: &str, draft: QuizDraft) -> PortResult<Quiz> {
        ids::allocate(IdSequence::QUIZ, |candidate| {
            let draft = draft.clone();
            async move {
                let mut tx = self.begin().await?;
                let id = next_id(&mut tx, IdSequence::QUIZ, "quizzes", candidate).await?;
                let record = sqlx::query_as::<_, QuizRecord>(&format!(
                    "INSERT INTO quizzes (id, title, description, category, code, visibility, owner_id) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
                    QUIZ_COLUMNS
                ))
                .bind(&id)
                .bind(&draft.title)
                .bind(&draft.description)
                .bind(&draft.category)
                .bind(&draft.code)
                .bind(draft.visibility.as_str())
                .bind(owner_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(write_error)?;
                tx.commit().await.map_err(unexpected)?;
                record.to_domain()
            }
        })
        .await
    }

    async fn get_quiz(&self, quiz_id: &str) -> PortResult<Quiz> {
        sqlx::query_as::<_, QuizRecord>(&format!("SELECT {} FROM quizzes WHERE id = $1", QUIZ_COLUMNS))
            .bind(quiz_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| read_error(e, "Quiz", quiz_id))?
            .to_domain()
    }

    async fn get_quiz_by_code(&self, code: &str) -> PortResult<Quiz> {
        sqlx::query_as::<_, QuizRecord>(&format!(
            "SELECT {} FROM quizzes WHERE code = $1",
            QUIZ_COLUMNS
        ))
        .bind(code)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| read_error(e, "Quiz with code", code))?
        .to_domain()
    }

    async fn list_visible_quizzes(&self, viewer_id: &str) -> PortResult<Vec<Quiz>> {
        let records = sqlx::query_as::<_, QuizRecord>(&format!(
            "SELECT {} FROM quizzes WHERE visibility = 'public' OR owner_id = $1 ORDER BY created_at, id",
            QUIZ_COLUMNS
        ))
        .bind(viewer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        all(records, QuizRecord::to_domain)
    }

    async fn update_quiz(&self, quiz_id: &str, draft: QuizDraft) -> PortResult<Quiz> {
        sqlx::query_as::<_, QuizRecord>(&format!(
            "UPDATE quizzes SET title = $2, description = $3, category = $4, code = $5, visibility = $6 \
             WHERE id = $1 RETURNING {}",
            QUIZ_COLUMNS
        ))
        .bind(quiz_id)
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(&draft.category)
        .bind(&draft.code)
        .bind(draft.visibility.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(write_error)?
        .ok_or_else(|| PortError::NotFound(format!("Quiz {} not found", quiz_id)))?
        .to_domain()
    }

    async fn delete_quiz(&self, quiz_id: &str) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM quizzes WHERE id = $1")
            .bind(quiz_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Quiz {} not found", quiz_id)));
        }
        Ok(())
    }

    async fn create_question(
        &self,
        quiz_id: &str,
        draft: QuestionDraft,
        generated: bool,
    ) -> PortResult<Question> {
        ids::allocate(IdSequence::QUESTION, |candidate| {
            let draft = draft.clone();
            async move {
                let mut tx = self.begin().await?;
                let id = next_id(&mut tx, IdSequence::QUESTION, "questions", candidate).await?;
                let record = sqlx::query_as::<_, QuestionRecord>(&format!(
                    "INSERT INTO questions \
                     (id, quiz_id, kind, difficulty, text, correct_answer, incorrect_answers, explanation, generated) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {}",
                    QUESTION_COLUMNS
                ))
                .bind(&id)
                .bind(quiz_id)
                .bind(draft.kind.as_str())
                .bind(draft.difficulty.as_str())
                .bind(&draft.text)
                .bind(&draft.correct_answer)
                .bind(&draft.incorrect_answers)
                .bind(&draft.explanation)
                .bind(generated)
                .fetch_one(&mut *tx)
                .await
                .map_err(write_error)?;
                tx.commit().await.map_err(unexpected)?;
                record.to_domain()
            }
        })
        .await
    }

    async fn get_question(&self, question_id: &str) -> PortResult<Question> {
        sqlx::query_as::<_, QuestionRecord>(&format!(
            "SELECT {} FROM questions WHERE id = $1",
            QUESTION_COLUMNS
        ))
        .bind(question_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| read_error(e, "Question", question_id))?
        .to_domain()
    }

    async fn list_questions(&self, quiz_id: &str) -> PortResult<Vec<Question>> {
        let records = sqlx::query_as::<_, QuestionRecord>(&format!(
            "SELECT {} FROM questions WHERE quiz_id = $1 ORDER BY created_at, id",
            QUESTION_COLUMNS
        ))
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        all(records, QuestionRecord::to_domain)
    }

    async fn count_questions(&self, quiz_id: &str) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM questions WHERE quiz_id = $1")
            .bind(quiz_id)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)
    }

    async fn update_question(&self, question_id: &str, draft: QuestionDraft) -> PortResult<Question> {
        sqlx::query_as::<_, QuestionRecord>(&format!(
            "UPDATE questions SET kind = $2, difficulty = $3, text = $4, correct_answer = $5, \
             incorrect_answers = $6, explanation = $7 WHERE id = $1 RETURNING {}",
            QUESTION_COLUMNS
        ))
        .bind(question_id)
        .bind(draft.kind.as_str())
        .bind(draft.difficulty.as_str())
        .bind(&draft.text)
        .bind(&draft.correct_answer)
        .bind(&draft.incorrect_answers)
        .bind(&draft.explanation)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| read_error(e, "Question", question_id))?
        .to_domain()
    }

    async fn delete_question(&self, question_id: &str) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM questions WHERE id = $1")
            .bind(question_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Question {} not found", question_id)));
        }
        Ok(())
    }

    // --- Quiz Sessions ---

    async fn start_session(&self, user_id: &str, quiz_id: &str) -> PortResult<SessionStart> {
        let inserted = sqlx::query_as::<_, SessionRecord>(&format!(
            "INSERT INTO quiz_sessions (id, quiz_id, user_id, status) \
             VALUES ($1, $2, $3, 'in_progress') \
             ON CONFLICT (user_id, quiz_id) WHERE status = 'in_progress' DO NOTHING \
             RETURNING {}",
            SESSION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(quiz_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(write_error)?;

        if let Some(record) = inserted {
            return Ok(SessionStart::Created(record.to_domain()?));
        }

        sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {} FROM quiz_sessions WHERE user_id = $1 AND quiz_id = $2 AND status = 'in_progress'",
            SESSION_COLUMNS
        ))
        .bind(user_id)
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| {
            PortError::Conflict("the in-progress session ended while starting".to_string())
        })?
        .to_domain()
        .map(SessionStart::Existing)
    }

    async fn get_session(&self, session_id: Uuid) -> PortResult<QuizSession> {
        sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {} FROM quiz_sessions WHERE id = $1",
            SESSION_COLUMNS
        ))
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| read_error(e, "Session", session_id))?
        .to_domain()
    }

    async fn complete_session(
        &self,
        session_id: Uuid,
        score: i32,
        ended_at: DateTime<Utc>,
    ) -> PortResult<bool> {
        let result = sqlx::query(
            "UPDATE quiz_sessions SET status = 'completed', score = $2, ended_at = $3 \
             WHERE id = $1 AND status = 'in_progress'",
        )
        .bind(session_id)
        .bind(score)
        .bind(ended_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        if result.rows_affected() == 1 {
            return Ok(true);
        }
        // Distinguish "already completed" from "never existed".
        self.get_session(session_id).await.map(|_| false)
    }

    async fn latest_completed_session(
        &self,
        user_id: &str,
        quiz_id: &str,
    ) -> PortResult<Option<QuizSession>> {
        sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {} FROM quiz_sessions \
             WHERE user_id = $1 AND quiz_id = $2 AND status = 'completed' \
             ORDER BY ended_at DESC NULLS LAST LIMIT 1",
            SESSION_COLUMNS
        ))
        .bind(user_id)
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .map(SessionRecord::to_domain)
        .transpose()
    }

    // --- Answers ---

    async fn insert_answer(&self, answer: SubmissionAnswer) -> PortResult<SubmissionAnswer> {
        let mut tx = self.begin().await?;
        lock_open_session(&mut tx, answer.session_id).await?;
        let record = sqlx::query_as::<_, AnswerRecord>(&format!(
            "INSERT INTO submission_answers \
             (id, session_id, question_id, selected_answer, is_correct, answered_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            ANSWER_COLUMNS
        ))
        .bind(answer.id)
        .bind(answer.session_id)
        .bind(&answer.question_id)
        .bind(&answer.selected_answer)
        .bind(answer.is_correct)
        .bind(answer.answered_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(write_error)?;
        tx.commit().await.map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn update_answer(
        &self,
        session_id: Uuid,
        question_id: &str,
        selected_answer: &str,
        is_correct: bool,
        answered_at: DateTime<Utc>,
    ) -> PortResult<SubmissionAnswer> {
        let mut tx = self.begin().await?;
        lock_open_session(&mut tx, session_id).await?;
        let record = sqlx::query_as::<_, AnswerRecord>(&format!(
            "UPDATE submission_answers SET selected_answer = $3, is_correct = $4, answered_at = $5 \
             WHERE session_id = $1 AND question_id = $2 RETURNING {}",
            ANSWER_COLUMNS
        ))
        .bind(session_id)
        .bind(question_id)
        .bind(selected_answer)
        .bind(is_correct)
        .bind(answered_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| read_error(e, "Answer for question", question_id))?;
        tx.commit().await.map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn list_answers(&self, session_id: Uuid) -> PortResult<Vec<SubmissionAnswer>> {
        let records = sqlx::query_as::<_, AnswerRecord>(&format!(
            "SELECT {} FROM submission_answers WHERE session_id = $1 ORDER BY answered_at",
            ANSWER_COLUMNS
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(AnswerRecord::to_domain).collect())
    }

    // --- Audit ---

    async fn insert_audit_log(&self, log: AuditLog) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO audit_logs (id, actor_id, action, entity, entity_id, detail, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(log.id)
        .bind(&log.actor_id)
        .bind(&log.action)
        .bind(&log.entity)
        .bind(&log.entity_id)
        .bind(&log.detail)
        .bind(log.created_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn search_audit_logs(&self, filter: &AuditFilter) -> PortResult<Vec<AuditLog>> {
        let mut query =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM audit_logs WHERE TRUE", AUDIT_COLUMNS));
        if let Some(actor_id) = &filter.actor_id {
            query.push(" AND actor_id = ").push_bind(actor_id.clone());
        }
        if let Some(action) = &filter.action {
            query.push(" AND action = ").push_bind(action.clone());
        }
        if let Some(entity) = &filter.entity {
            query.push(" AND entity = ").push_bind(entity.clone());
        }
        if let Some(entity_id) = &filter.entity_id {
            query.push(" AND entity_id = ").push_bind(entity_id.clone());
        }
        if let Some(from) = filter.from {
            query.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            query.push(" AND created_at <= ").push_bind(to);
        }
        query.push(" ORDER BY created_at DESC");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(limit);
        }

        let records = query
            .build_query_as::<AuditRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(AuditRecord::to_domain).collect())
    }
}
