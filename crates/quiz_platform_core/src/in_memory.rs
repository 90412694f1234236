//! crates/quiz_platform_core/src/in_memory.rs
//!
//! A thread-safe in-memory implementation of `DatabaseService`.
//!
//! All state sits behind one `RwLock`; every mutating operation holds the
//! write lock for its whole duration, which gives it the same atomicity the
//! Postgres adapter gets from transactions and unique indexes. Used by the
//! test suite and for running the API without a database.

use crate::domain::{
    AuditFilter, AuditLog, Avatar, Entitlement, NewAvatar, NewTransaction, NewUser,
    PointsPurchase, Question, QuestionDraft, Quiz, QuizDraft, QuizSession, Role, SessionStart,
    SessionStatus, SubmissionAnswer, SubscriptionTier, Transaction, TransactionStatus, User,
    UserAvatar, Visibility,
};
use crate::ids::{self, IdCandidate, IdSequence};
use crate::ports::{DatabaseService, PortError, PortResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct State {
    users: BTreeMap<String, User>,
    tiers: BTreeMap<String, SubscriptionTier>,
    avatars: BTreeMap<String, Avatar>,
    user_avatars: Vec<UserAvatar>,
    transactions: BTreeMap<String, Transaction>,
    quizzes: BTreeMap<String, Quiz>,
    questions: Vec<Question>,
    sessions: HashMap<Uuid, QuizSession>,
    answers: Vec<SubmissionAnswer>,
    audit_logs: Vec<AuditLog>,
}

/// Picks the id for one insert attempt from the ids already present.
fn pick_id<'a, I>(seq: IdSequence, candidate: IdCandidate, existing: I) -> PortResult<String>
where
    I: IntoIterator<Item = &'a str>,
{
    match candidate {
        IdCandidate::Next => Ok(seq.next_after(existing)),
        IdCandidate::Fixed(id) => {
            if existing.into_iter().any(|e| e == id) {
                Err(PortError::IdCollision(id))
            } else {
                Ok(id)
            }
        }
    }
}

fn not_found(what: &str, id: impl std::fmt::Display) -> PortError {
    PortError::NotFound(format!("{} {} not found", what, id))
}

impl State {
    fn user_mut(&mut self, user_id: &str) -> PortResult<&mut User> {
        self.users.get_mut(user_id).ok_or_else(|| not_found("User", user_id))
    }

    fn owns(&self, user_id: &str, avatar_id: &str) -> bool {
        self.user_avatars
            .iter()
            .any(|ua| ua.user_id == user_id && ua.avatar_id == avatar_id)
    }

    fn code_taken(&self, code: Option<&str>, except_quiz: Option<&str>) -> bool {
        let Some(code) = code else { return false };
        self.quizzes
            .values()
            .any(|q| q.code.as_deref() == Some(code) && Some(q.id.as_str()) != except_quiz)
    }

    fn apply(&mut self, grant: Entitlement, now: DateTime<Utc>) -> PortResult<()> {
        match grant {
            Entitlement::Subscription { user_id, subscription_id } => {
                self.user_mut(&user_id)?.subscription_id = subscription_id;
            }
            Entitlement::Avatar { user_id, avatar_id } => {
                if !self.owns(&user_id, &avatar_id) {
                    self.user_avatars.push(UserAvatar {
                        user_id,
                        avatar_id,
                        purchased_at: now,
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates a store seeded with the default subscription tiers.
    pub fn new() -> Self {
        let mut state = State::default();
        for (id, name, price) in [
            ("SB001", "Free", Decimal::ZERO),
            ("SB002", "Premium", Decimal::new(4_900_000, 2)),
        ] {
            state.tiers.insert(
                id.to_string(),
                SubscriptionTier {
                    id: id.to_string(),
                    name: name.to_string(),
                    price,
                },
            );
        }
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Credits points to a user; there is no port operation for earning points.
    pub async fn add_points(&self, user_id: &str, points: i64) -> PortResult<()> {
        let mut state = self.state.write().await;
        state.user_mut(user_id)?.points += points;
        Ok(())
    }

    /// Forces a session into `expired`, as an external sweeper would.
    pub async fn expire_session(&self, session_id: Uuid) -> PortResult<()> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| not_found("Session", session_id))?;
        session.status = SessionStatus::Expired;
        Ok(())
    }
}

#[async_trait]
impl DatabaseService for InMemoryStore {
    async fn create_user(&self, user: NewUser) -> PortResult<User> {
        let seq = IdSequence::for_role(user.role);
        ids::allocate(seq, |candidate| {
            let user = user.clone();
            async move {
                let mut state = self.state.write().await;
                if state.users.values().any(|u| u.external_id == user.external_id) {
                    return Err(PortError::Conflict(format!(
                        "identity {} already registered",
                        user.external_id
                    )));
                }
                let id = pick_id(seq, candidate, state.users.keys().map(String::as_str))?;
                let created = User {
                    id: id.clone(),
                    external_id: user.external_id,
                    name: user.name,
                    email: user.email,
                    role: user.role,
                    subscription_id: user.subscription_id,
                    points: 0,
                    active_avatar_id: None,
                    is_active: true,
                    created_at: Utc::now(),
                };
                state.users.insert(id, created.clone());
                Ok(created)
            }
        })
        .await
    }

    async fn get_user(&self, user_id: &str) -> PortResult<User> {
        let state = self.state.read().await;
        state.users.get(user_id).cloned().ok_or_else(|| not_found("User", user_id))
    }

    async fn get_user_by_external_id(&self, external_id: &str) -> PortResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.external_id == external_id).cloned())
    }

    async fn update_user_role(&self, user_id: &str, role: Role) -> PortResult<User> {
        let mut state = self.state.write().await;
        let user = state.user_mut(user_id)?;
        user.role = role;
        Ok(user.clone())
    }

    async fn set_user_active(&self, user_id: &str, is_active: bool) -> PortResult<()> {
        let mut state = self.state.write().await;
        state.user_mut(user_id)?.is_active = is_active;
        Ok(())
    }

    async fn set_active_avatar(&self, user_id: &str, avatar_id: &str) -> PortResult<()> {
        let mut state = self.state.write().await;
        state.user_mut(user_id)?.active_avatar_id = Some(avatar_id.to_string());
        Ok(())
    }

    async fn get_subscription_tier(&self, tier_id: &str) -> PortResult<SubscriptionTier> {
        let state = self.state.read().await;
        state
            .tiers
            .get(tier_id)
            .cloned()
            .ok_or_else(|| not_found("Subscription tier", tier_id))
    }

    async fn list_subscription_tiers(&self) -> PortResult<Vec<SubscriptionTier>> {
        let state = self.state.read().await;
        Ok(state.tiers.values().cloned().collect())
    }

    async fn create_avatar(&self, avatar: NewAvatar) -> PortResult<Avatar> {
        ids::allocate(IdSequence::AVATAR, |candidate| {
            let avatar = avatar.clone();
            async move {
                let mut state = self.state.write().await;
                let id = pick_id(
                    IdSequence::AVATAR,
                    candidate,
                    state.avatars.keys().map(String::as_str),
                )?;
                let created = Avatar {
                    id: id.clone(),
                    name: avatar.name,
                    price: avatar.price,
                    rarity: avatar.rarity,
                    is_active: true,
                };
                state.avatars.insert(id, created.clone());
                Ok(created)
            }
        })
        .await
    }

    async fn get_avatar(&self, avatar_id: &str) -> PortResult<Avatar> {
        let state = self.state.read().await;
        state
            .avatars
            .get(avatar_id)
            .cloned()
            .ok_or_else(|| not_found("Avatar", avatar_id))
    }

    async fn list_avatars(&self, include_inactive: bool) -> PortResult<Vec<Avatar>> {
        let state = self.state.read().await;
        Ok(state
            .avatars
            .values()
            .filter(|a| include_inactive || a.is_active)
            .cloned()
            .collect())
    }

    async fn set_avatar_active(&self, avatar_id: &str, is_active: bool) -> PortResult<Avatar> {
        let mut state = self.state.write().await;
        let avatar = state
            .avatars
            .get_mut(avatar_id)
            .ok_or_else(|| not_found("Avatar", avatar_id))?;
        avatar.is_active = is_active;
        Ok(avatar.clone())
    }

    async fn user_owns_avatar(&self, user_id: &str, avatar_id: &str) -> PortResult<bool> {
        let state = self.state.read().await;
        Ok(state.owns(user_id, avatar_id))
    }

    async fn list_user_avatars(&self, user_id: &str) -> PortResult<Vec<UserAvatar>> {
        let state = self.state.read().await;
        Ok(state
            .user_avatars
            .iter()
            .filter(|ua| ua.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn spend_points_for_avatar(
        &self,
        user_id: &str,
        avatar_id: &str,
        price: i64,
    ) -> PortResult<PointsPurchase> {
        let mut state = self.state.write().await;
        if state.owns(user_id, avatar_id) {
            return Ok(PointsPurchase::AlreadyOwned);
        }
        let user = state.user_mut(user_id)?;
        if user.points < price {
            return Ok(PointsPurchase::InsufficientPoints);
        }
        user.points -= price;
        state.user_avatars.push(UserAvatar {
            user_id: user_id.to_string(),
            avatar_id: avatar_id.to_string(),
            purchased_at: Utc::now(),
        });
        Ok(PointsPurchase::Purchased)
    }

    async fn create_pending_transaction(&self, tx: NewTransaction) -> PortResult<Transaction> {
        ids::allocate(IdSequence::TRANSACTION, |candidate| {
            let tx = tx.clone();
            async move {
                let mut state = self.state.write().await;
                let duplicate = state.transactions.values().any(|t| {
                    t.status == TransactionStatus::Pending
                        && t.user_id == tx.user_id
                        && t.target == tx.target
                });
                if duplicate {
                    return Err(PortError::Conflict(format!(
                        "pending transaction exists for {} {}",
                        tx.target.category(),
                        tx.target.target_id()
                    )));
                }
                let id = pick_id(
                    IdSequence::TRANSACTION,
                    candidate,
                    state.transactions.keys().map(String::as_str),
                )?;
                let now = Utc::now();
                let created = Transaction {
                    id: id.clone(),
                    user_id: tx.user_id,
                    target: tx.target,
                    amount: tx.amount,
                    status: TransactionStatus::Pending,
                    payment_method: None,
                    created_at: now,
                    updated_at: now,
                };
                state.transactions.insert(id, created.clone());
                Ok(created)
            }
        })
        .await
    }

    async fn get_transaction(&self, transaction_id: &str) -> PortResult<Transaction> {
        let state = self.state.read().await;
        state
            .transactions
            .get(transaction_id)
            .cloned()
            .ok_or_else(|| not_found("Transaction", transaction_id))
    }

    async fn list_transactions_for_user(&self, user_id: &str) -> PortResult<Vec<Transaction>> {
        let state = self.state.read().await;
        let mut txs: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        txs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(txs)
    }

    async fn settle_transaction(
        &self,
        transaction_id: &str,
        status: TransactionStatus,
        payment_method: Option<&str>,
        grant: Option<Entitlement>,
    ) -> PortResult<bool> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let tx = state
            .transactions
            .get_mut(transaction_id)
            .ok_or_else(|| not_found("Transaction", transaction_id))?;
        if tx.status != TransactionStatus::Pending {
            return Ok(false);
        }
        tx.status = status;
        tx.updated_at = now;
        if let Some(method) = payment_method {
            tx.payment_method = Some(method.to_string());
        }
        if let Some(grant) = grant {
            state.apply(grant, now)?;
        }
        Ok(true)
    }

    async fn create_quiz(&self, owner_id: &str, draft: QuizDraft) -> PortResult<Quiz> {
        ids::allocate(IdSequence::QUIZ, |candidate| {
            let draft = draft.clone();
            async move {
                let mut state = self.state.write().await;
                if state.code_taken(draft.code.as_deref(), None) {
                    return Err(PortError::Conflict("quiz code already in use".to_string()));
                }
                let id = pick_id(
                    IdSequence::QUIZ,
                    candidate,
                    state.quizzes.keys().map(String::as_str),
                )?;
                let quiz = Quiz {
                    id: id.clone(),
                    title: draft.title,
                    description: draft.description,
                    category: draft.category,
                    code: draft.code,
                    visibility: draft.visibility,
                    owner_id: owner_id.to_string(),
                    created_at: Utc::now(),
                };
                state.quizzes.insert(id, quiz.clone());
                Ok(quiz)
            }
        })
        .await
    }

    async fn get_quiz(&self, quiz_id: &str) -> PortResult<Quiz> {
        let state = self.state.read().await;
        state.quizzes.get(quiz_id).cloned().ok_or_else(|| not_found("Quiz", quiz_id))
    }

    async fn get_quiz_by_code(&self, code: &str) -> PortResult<Quiz> {
        let state = self.state.read().await;
        state
            .quizzes
            .values()
            .find(|q| q.code.as_deref() == Some(code))
            .cloned()
            .ok_or_else(|| not_found("Quiz with code", code))
    }

    async fn list_visible_quizzes(&self, viewer_id: &str) -> PortResult<Vec<Quiz>> {
        let state = self.state.read().await;
        Ok(state
            .quizzes
            .values()
            .filter(|q| q.visibility == Visibility::Public || q.owner_id == viewer_id)
            .cloned()
            .collect())
    }

    async fn update_quiz(&self, quiz_id: &str, draft: QuizDraft) -> PortResult<Quiz> {
        let mut state = self.state.write().await;
        if state.code_taken(draft.code.as_deref(), Some(quiz_id)) {
            return Err(PortError::Conflict("quiz code already in use".to_string()));
        }
        let quiz = state
            .quizzes
            .get_mut(quiz_id)
            .ok_or_else(|| not_found("Quiz", quiz_id))?;
        quiz.title = draft.title;
        quiz.description = draft.description;
        quiz.category = draft.category;
        quiz.code = draft.code;
        quiz.visibility = draft.visibility;
        Ok(quiz.clone())
    }

    async fn delete_quiz(&self, quiz_id: &str) -> PortResult<()> {
        let mut state = self.state.write().await;
        if state.quizzes.remove(quiz_id).is_none() {
            return Err(not_found("Quiz", quiz_id));
        }
        state.questions.retain(|q| q.quiz_id != quiz_id);
        let removed: Vec<Uuid> = state
            .sessions
            .values()
            .filter(|s| s.quiz_id == quiz_id)
            .map(|s| s.id)
            .collect();
        state.sessions.retain(|_, s| s.quiz_id != quiz_id);
        state.answers.retain(|a| !removed.contains(&a.session_id));
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
                let mut state = self.state.write().await;
                if !state.quizzes.contains_key(quiz_id) {
                    return Err(not_found("Quiz", quiz_id));
                }
                let id = pick_id(
                    IdSequence::QUESTION,
                    candidate,
                    state.questions.iter().map(|q| q.id.as_str()),
                )?;
                let question = Question {
                    id,
                    quiz_id: quiz_id.to_string(),
                    kind: draft.kind,
                    difficulty: draft.difficulty,
                    text: draft.text,
                    correct_answer: draft.correct_answer,
                    incorrect_answers: draft.incorrect_answers,
                    explanation: draft.explanation,
                    generated,
                };
                state.questions.push(question.clone());
                Ok(question)
            }
        })
        .await
    }

    async fn get_question(&self, question_id: &str) -> PortResult<Question> {
        let state = self.state.read().await;
        state
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .cloned()
            .ok_or_else(|| not_found("Question", question_id))
    }

    async fn list_questions(&self, quiz_id: &str) -> PortResult<Vec<Question>> {
        let state = self.state.read().await;
        Ok(state
            .questions
            .iter()
            .filter(|q| q.quiz_id == quiz_id)
            .cloned()
            .collect())
    }

    async fn count_questions(&self, quiz_id: &str) -> PortResult<i64> {
        let state = self.state.read().await;
        Ok(state.questions.iter().filter(|q| q.quiz_id == quiz_id).count() as i64)
    }

    async fn update_question(&self, question_id: &str, draft: QuestionDraft) -> PortResult<Question> {
        let mut state = self.state.write().await;
        let question = state
            .questions
            .iter_mut()
            .find(|q| q.id == question_id)
            .ok_or_else(|| not_found("Question", question_id))?;
        question.kind = draft.kind;
        question.difficulty = draft.difficulty;
        question.text = draft.text;
        question.correct_answer = draft.correct_answer;
        question.incorrect_answers = draft.incorrect_answers;
        question.explanation = draft.explanation;
        Ok(question.clone())
    }

    async fn delete_question(&self, question_id: &str) -> PortResult<()> {
        let mut state = self.state.write().await;
        let before = state.questions.len();
        state.questions.retain(|q| q.id != question_id);
        if state.questions.len() == before {
            return Err(not_found("Question", question_id));
        }
        state.answers.retain(|a| a.question_id != question_id);
        Ok(())
    }

    async fn start_session(&self, user_id: &str, quiz_id: &str) -> PortResult<SessionStart> {
        let mut state = self.state.write().await;
        let existing = state.sessions.values().find(|s| {
            s.user_id == user_id && s.quiz_id == quiz_id && s.status == SessionStatus::InProgress
        });
        if let Some(session) = existing {
            return Ok(SessionStart::Existing(session.clone()));
        }
        let session = QuizSession {
            id: Uuid::new_v4(),
            quiz_id: quiz_id.to_string(),
            user_id: user_id.to_string(),
            status: SessionStatus::InProgress,
            started_at: Utc::now(),
            ended_at: None,
            score: None,
        };
        state.sessions.insert(session.id, session.clone());
        Ok(SessionStart::Created(session))
    }

    async fn get_session(&self, session_id: Uuid) -> PortResult<QuizSession> {
        let state = self.state.read().await;
        state
            .sessions
            .get(&session_id)
            .cloned()
            .ok_or_else(|| not_found("Session", session_id))
    }

    async fn complete_session(
        &self,
        session_id: Uuid,
        score: i32,
        ended_at: DateTime<Utc>,
    ) -> PortResult<bool> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| not_found("Session", session_id))?;
        if session.status != SessionStatus::InProgress {
            return Ok(false);
        }
        session.status = SessionStatus::Completed;
        session.score = Some(score);
        session.ended_at = Some(ended_at);
        Ok(true)
    }

    async fn latest_completed_session(
        &self,
        user_id: &str,
        quiz_id: &str,
    ) -> PortResult<Option<QuizSession>> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .values()
            .filter(|s| {
                s.user_id == user_id
                    && s.quiz_id == quiz_id
                    && s.status == SessionStatus::Completed
            })
            .max_by_key(|s| s.ended_at)
            .cloned())
    }

    async fn insert_answer(&self, answer: SubmissionAnswer) -> PortResult<SubmissionAnswer> {
        let mut state = self.state.write().await;
        ensure_open(&state, answer.session_id)?;
        let duplicate = state
            .answers
            .iter()
            .any(|a| a.session_id == answer.session_id && a.question_id == answer.question_id);
        if duplicate {
            return Err(PortError::Conflict(format!(
                "answer exists for question {}",
                answer.question_id
            )));
        }
        state.answers.push(answer.clone());
        Ok(answer)
    }

    async fn update_answer(
        &self,
        session_id: Uuid,
        question_id: &str,
        selected_answer: &str,
        is_correct: bool,
        answered_at: DateTime<Utc>,
    ) -> PortResult<SubmissionAnswer> {
        let mut state = self.state.write().await;
        ensure_open(&state, session_id)?;
        let answer = state
            .answers
            .iter_mut()
            .find(|a| a.session_id == session_id && a.question_id == question_id)
            .ok_or_else(|| not_found("Answer for question", question_id))?;
        answer.selected_answer = selected_answer.to_string();
        answer.is_correct = is_correct;
        answer.answered_at = answered_at;
        Ok(answer.clone())
    }

    async fn list_answers(&self, session_id: Uuid) -> PortResult<Vec<SubmissionAnswer>> {
        let state = self.state.read().await;
        Ok(state
            .answers
            .iter()
            .filter(|a| a.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn insert_audit_log(&self, log: AuditLog) -> PortResult<()> {
        let mut state = self.state.write().await;
        state.audit_logs.push(log);
        Ok(())
    }

    async fn search_audit_logs(&self, filter: &AuditFilter) -> PortResult<Vec<AuditLog>> {
        let state = self.state.read().await;
        let limit = filter.limit.unwrap_or(i64::MAX).max(0) as usize;
        Ok(state
            .audit_logs
            .iter()
            .rev()
            .filter(|log| filter.matches(log))
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Answers may only be written while their session is in progress.
fn ensure_open(state: &State, session_id: Uuid) -> PortResult<()> {
    let session = state
        .sessions
        .get(&session_id)
        .ok_or_else(|| not_found("Session", session_id))?;
    if session.status != SessionStatus::InProgress {
        return Err(PortError::Conflict(format!(
            "session {} is {}",
            session_id,
            session.status.as_str()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PurchaseTarget, Rarity};
    use rust_decimal_macros::dec;

    fn new_user(external_id: &str, role: Role) -> NewUser {
        NewUser {
            external_id: external_id.to_string(),
            name: "Ada".to_string(),
            email: None,
            role,
            subscription_id: "SB001".to_string(),
        }
    }

    #[tokio::test]
    async fn user_ids_follow_role_sequences() {
        let store = InMemoryStore::new();
        let t1 = store.create_user(new_user("ext-1", Role::Teacher)).await.unwrap();
        let s1 = store.create_user(new_user("ext-2", Role::Student)).await.unwrap();
        let t2 = store.create_user(new_user("ext-3", Role::Teacher)).await.unwrap();
        assert_eq!(t1.id, "TE001");
        assert_eq!(s1.id, "ST001");
        assert_eq!(t2.id, "TE002");

        let dup = store.create_user(new_user("ext-1", Role::Student)).await;
        assert!(matches!(dup, Err(PortError::Conflict(_))));
    }

    #[tokio::test]
    async fn settle_only_moves_pending_transactions_once() {
        let store = InMemoryStore::new();
        let user = store.create_user(new_user("ext-1", Role::Student)).await.unwrap();
        let avatar = store
            .create_avatar(NewAvatar {
                name: "Fox".to_string(),
                price: dec!(15000.00),
                rarity: Rarity::Rare,
            })
            .await
            .unwrap();
        let tx = store
            .create_pending_transaction(NewTransaction {
                user_id: user.id.clone(),
                target: PurchaseTarget::Item(avatar.id.clone()),
                amount: avatar.price,
            })
            .await
            .unwrap();
        assert_eq!(tx.id, "TR000001");

        let grant = Entitlement::Avatar {
            user_id: user.id.clone(),
            avatar_id: avatar.id.clone(),
        };
        let first = store
            .settle_transaction(&tx.id, TransactionStatus::Success, Some("qris"), Some(grant.clone()))
            .await
            .unwrap();
        let second = store
            .settle_transaction(&tx.id, TransactionStatus::Success, None, Some(grant))
            .await
            .unwrap();
        assert!(first);
        assert!(!second);
        assert_eq!(store.list_user_avatars(&user.id).await.unwrap().len(), 1);
        let stored = store.get_transaction(&tx.id).await.unwrap();
        assert_eq!(stored.payment_method.as_deref(), Some("qris"));
    }

    #[tokio::test]
    async fn answers_are_refused_once_the_session_ends() {
        let store = InMemoryStore::new();
        let user = store.create_user(new_user("ext-1", Role::Student)).await.unwrap();
        let session = store.start_session(&user.id, "QZ001").await.unwrap().into_session();
        let answer = |question_id: &str| SubmissionAnswer {
            id: Uuid::new_v4(),
            session_id: session.id,
            question_id: question_id.to_string(),
            selected_answer: "4".to_string(),
            is_correct: true,
            answered_at: Utc::now(),
        };
        store.insert_answer(answer("QU001")).await.unwrap();

        assert!(store.complete_session(session.id, 100, Utc::now()).await.unwrap());

        let late = store.insert_answer(answer("QU002")).await;
        assert!(matches!(late, Err(PortError::Conflict(_))));
        let revised = store
            .update_answer(session.id, "QU001", "5", false, Utc::now())
            .await;
        assert!(matches!(revised, Err(PortError::Conflict(_))));

        let answers = store.list_answers(session.id).await.unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].selected_answer, "4");
    }

    #[tokio::test]
    async fn fixed_id_collision_is_reported() {
        let store = InMemoryStore::new();
        let err = pick_id(
            IdSequence::SUBSCRIPTION,
            IdCandidate::Fixed("SB001".to_string()),
            store.state.read().await.tiers.keys().map(String::as_str),
        );
        assert!(matches!(err, Err(PortError::IdCollision(_))));
    }
}
