//! crates/quiz_platform_core/src/sessions.rs
//!
//! The quiz-session state machine.
//!
//! ```text
//! start ──> in_progress ──submit/end──> completed
//!                └──────────────────────> expired
//! ```
//!
//! Every transition validates ownership and state first and then applies a
//! single atomic store operation, so a rejected call leaves nothing behind.

use crate::access::{ensure_role, ensure_session_owner, owned_quiz};
use crate::domain::{
    PresentedQuestion, Question, QuizSession, ReviewItem, Role, SessionReview, SessionStart,
    SessionStatus, SubmissionAnswer, User,
};
use crate::error::{CoreError, CoreResult};
use crate::ports::{DatabaseService, PortError};
use chrono::Utc;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Percentage of correct answers, rounded half up. A quiz without questions
/// scores zero.
pub fn compute_score(correct: usize, total: usize) -> i32 {
    if total == 0 {
        return 0;
    }
    let correct = correct.min(total);
    ((200 * correct + total) / (2 * total)) as i32
}

#[derive(Clone)]
pub struct QuizSessionService {
    db: Arc<dyn DatabaseService>,
}

impl QuizSessionService {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    /// Starts an attempt, or hands back the student's attempt that is already
    /// in progress for this quiz.
    pub async fn start_quiz_session(&self, student: &User, quiz_id: &str) -> CoreResult<SessionStart> {
        ensure_role(student, Role::Student)?;
        let quiz = self.db.get_quiz(quiz_id).await?;

        let start = self.db.start_session(&student.id, &quiz.id).await?;
        match &start {
            SessionStart::Created(s) => {
                info!("Student {} started session {} for quiz {}", student.id, s.id, quiz.id)
            }
            SessionStart::Existing(s) => {
                info!("Student {} resumed session {} for quiz {}", student.id, s.id, quiz.id)
            }
        }
        Ok(start)
    }

    /// The quiz's questions with correct and incorrect answers merged and
    /// shuffled. The order is not stored and differs between calls.
    pub async fn list_session_questions(
        &self,
        student: &User,
        session_id: Uuid,
    ) -> CoreResult<Vec<PresentedQuestion>> {
        let session = self.db.get_session(session_id).await?;
        ensure_session_owner(student, &session)?;
        ensure_in_progress(&session)?;

        let questions = self.db.list_questions(&session.quiz_id).await?;
        let mut rng = rand::thread_rng();
        Ok(questions
            .into_iter()
            .map(|q| {
                let mut options = q.options();
                options.shuffle(&mut rng);
                PresentedQuestion {
                    id: q.id,
                    kind: q.kind,
                    difficulty: q.difficulty,
                    text: q.text,
                    options,
                }
            })
            .collect())
    }

    /// Records the first answer to a question. A second answer to the same
    /// question is a conflict; use [`Self::revise_answer`] instead.
    pub async fn submit_answer(
        &self,
        student: &User,
        session_id: Uuid,
        question_id: &str,
        selected_answer: &str,
    ) -> CoreResult<SubmissionAnswer> {
        let (session, question) = self
            .answerable(student, session_id, question_id, selected_answer)
            .await?;

        let answer = SubmissionAnswer {
            id: Uuid::new_v4(),
            session_id: session.id,
            question_id: question.id.clone(),
            selected_answer: selected_answer.trim().to_string(),
            is_correct: question.is_correct(selected_answer),
            answered_at: Utc::now(),
        };
        match self.db.insert_answer(answer).await {
            Ok(answer) => Ok(answer),
            Err(PortError::Conflict(_)) => {
                self.still_open(session.id).await?;
                Err(CoreError::Conflict(
                    "This question has already been answered; update the answer instead"
                        .to_string(),
                ))
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Overwrites an existing answer and refreshes its `answered_at`.
    pub async fn revise_answer(
        &self,
        student: &User,
        session_id: Uuid,
        question_id: &str,
        selected_answer: &str,
    ) -> CoreResult<SubmissionAnswer> {
        let (session, question) = self
            .answerable(student, session_id, question_id, selected_answer)
            .await?;

        let revised = self
            .db
            .update_answer(
                session.id,
                &question.id,
                selected_answer.trim(),
                question.is_correct(selected_answer),
                Utc::now(),
            )
            .await;
        match revised {
            Ok(answer) => Ok(answer),
            Err(PortError::NotFound(_)) => Err(CoreError::NotFound(
                "No answer has been recorded for this question yet".to_string(),
            )),
            Err(PortError::Conflict(_)) => {
                self.still_open(session.id).await?;
                Err(CoreError::Conflict("This session is no longer in progress".to_string()))
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Re-reads the session after a refused write and reports it if it ended.
    async fn still_open(&self, session_id: Uuid) -> CoreResult<()> {
        let session = self.db.get_session(session_id).await?;
        ensure_in_progress(&session)
    }

    /// Student-initiated submission of their own attempt.
    pub async fn complete_session(&self, student: &User, session_id: Uuid) -> CoreResult<QuizSession> {
        let session = self.db.get_session(session_id).await?;
        ensure_session_owner(student, &session)?;
        self.finish(session).await
    }

    /// Teacher-initiated end of a student's attempt at one of their quizzes.
    pub async fn force_complete_session(
        &self,
        teacher: &User,
        session_id: Uuid,
    ) -> CoreResult<QuizSession> {
        let session = self.db.get_session(session_id).await?;
        owned_quiz(self.db.as_ref(), teacher, &session.quiz_id).await?;
        let finished = self.finish(session).await?;
        info!("Teacher {} ended session {}", teacher.id, finished.id);
        Ok(finished)
    }

    /// The student's most recently completed attempt at a quiz with every
    /// recorded answer and the correct answers.
    pub async fn get_latest_review(&self, student: &User, quiz_id: &str) -> CoreResult<SessionReview> {
        let session = self
            .db
            .latest_completed_session(&student.id, quiz_id)
            .await?
            .ok_or_else(|| {
                CoreError::NotFound("You have no completed attempt for this quiz".to_string())
            })?;

        let answers = self.db.list_answers(session.id).await?;
        let mut by_question: HashMap<String, SubmissionAnswer> = answers
            .into_iter()
            .map(|a| (a.question_id.clone(), a))
            .collect();

        let items = self
            .db
            .list_questions(quiz_id)
            .await?
            .into_iter()
            .filter_map(|q| {
                by_question.remove(&q.id).map(|a| ReviewItem {
                    question_id: q.id,
                    question_text: q.text,
                    selected_answer: a.selected_answer,
                    correct_answer: q.correct_answer,
                    is_correct: a.is_correct,
                    answered_at: a.answered_at,
                })
            })
            .collect();

        Ok(SessionReview { session, items })
    }

    async fn answerable(
        &self,
        student: &User,
        session_id: Uuid,
        question_id: &str,
        selected_answer: &str,
    ) -> CoreResult<(QuizSession, Question)> {
        let session = self.db.get_session(session_id).await?;
        ensure_session_owner(student, &session)?;
        ensure_in_progress(&session)?;

        let question = self.db.get_question(question_id).await?;
        if question.quiz_id != session.quiz_id {
            return Err(CoreError::NotFound(format!(
                "Question {} is not part of this quiz",
                question_id
            )));
        }
        if selected_answer.trim().is_empty() {
            return Err(CoreError::Validation("An answer must be selected".to_string()));
        }
        if !question.has_option(selected_answer) {
            return Err(CoreError::Validation(
                "The selected answer is not one of this question's options".to_string(),
            ));
        }
        Ok((session, question))
    }

    async fn finish(&self, session: QuizSession) -> CoreResult<QuizSession> {
        ensure_in_progress(&session)?;

        let total = self.db.count_questions(&session.quiz_id).await?;
        let answers = self.db.list_answers(session.id).await?;
        let correct = answers.iter().filter(|a| a.is_correct).count();
        let score = compute_score(correct, total.max(0) as usize);

        if !self.db.complete_session(session.id, score, Utc::now()).await? {
            return Err(CoreError::Conflict("This session has already been completed".to_string()));
        }
        info!("Session {} completed with score {}", session.id, score);
        Ok(self.db.get_session(session.id).await?)
    }
}

fn ensure_in_progress(session: &QuizSession) -> CoreResult<()> {
    match session.status {
        SessionStatus::InProgress => Ok(()),
        SessionStatus::Completed => Err(CoreError::Conflict(
            "This session has already been completed".to_string(),
        )),
        SessionStatus::Expired => Err(CoreError::Conflict("This session has expired".to_string())),
    }
}
