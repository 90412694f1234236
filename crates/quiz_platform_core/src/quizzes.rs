//! crates/quiz_platform_core/src/quizzes.rs
//!
//! Quiz and question authoring for teachers, including AI-assisted question
//! generation.

use crate::access::{ensure_active, ensure_role, owned_quiz};
use crate::audit::AuditService;
use crate::domain::{
    GenerationParams, Question, QuestionDraft, QuestionKind, Quiz, QuizDraft, Role, User,
};
use crate::error::{upstream, CoreError, CoreResult};
use crate::ports::{DatabaseService, PortError, QuestionGenerationService};
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::info;

const MAX_INCORRECT_ANSWERS: usize = 5;

fn join_code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z0-9]{4,12}$").expect("static pattern"))
}

/// Trims the draft and upper-cases its join code.
pub fn validate_quiz(draft: QuizDraft) -> CoreResult<QuizDraft> {
    let title = draft.title.trim().to_string();
    if title.is_empty() {
        return Err(CoreError::Validation("A quiz needs a title".to_string()));
    }
    let code = match draft.code.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(code) => {
            let code = code.to_ascii_uppercase();
            if !join_code_pattern().is_match(&code) {
                return Err(CoreError::Validation(
                    "Join codes are 4 to 12 letters or digits".to_string(),
                ));
            }
            Some(code)
        }
    };
    Ok(QuizDraft {
        title,
        description: draft.description.trim().to_string(),
        category: draft.category.trim().to_string(),
        code,
        visibility: draft.visibility,
    })
}

/// Normalises a question draft. Boolean questions always end up with the
/// opposite literal as their only incorrect answer.
pub fn validate_question(draft: QuestionDraft) -> CoreResult<QuestionDraft> {
    let text = draft.text.trim().to_string();
    let correct = draft.correct_answer.trim().to_string();
    if text.is_empty() {
        return Err(CoreError::Validation("Question text is required".to_string()));
    }

    let incorrect = match draft.kind {
        QuestionKind::Boolean => match correct.as_str() {
            "True" => vec!["False".to_string()],
            "False" => vec!["True".to_string()],
            _ => {
                return Err(CoreError::Validation(
                    "True/false questions must be answered \"True\" or \"False\"".to_string(),
                ))
            }
        },
        QuestionKind::Multiple => {
            if correct.is_empty() {
                return Err(CoreError::Validation("A correct answer is required".to_string()));
            }
            let mut incorrect: Vec<String> = Vec::new();
            for answer in draft.incorrect_answers.iter().map(|a| a.trim()) {
                if answer.is_empty() {
                    return Err(CoreError::Validation("Answers cannot be empty".to_string()));
                }
                if answer == correct || incorrect.iter().any(|a| a == answer) {
                    return Err(CoreError::Validation("Answers must be distinct".to_string()));
                }
                incorrect.push(answer.to_string());
            }
            if incorrect.is_empty() || incorrect.len() > MAX_INCORRECT_ANSWERS {
                return Err(CoreError::Validation(format!(
                    "Multiple choice questions need 1 to {} incorrect answers",
                    MAX_INCORRECT_ANSWERS
                )));
            }
            incorrect
        }
    };

    Ok(QuestionDraft {
        kind: draft.kind,
        difficulty: draft.difficulty,
        text,
        correct_answer: correct,
        incorrect_answers: incorrect,
        explanation: draft
            .explanation
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty()),
    })
}

#[derive(Clone)]
pub struct QuizService {
    db: Arc<dyn DatabaseService>,
    generator: Option<Arc<dyn QuestionGenerationService>>,
    audit: AuditService,
}

impl QuizService {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        generator: Option<Arc<dyn QuestionGenerationService>>,
    ) -> Self {
        Self {
            audit: AuditService::new(db.clone()),
            db,
            generator,
        }
    }

    pub async fn create_quiz(&self, teacher: &User, draft: QuizDraft) -> CoreResult<Quiz> {
        ensure_role(teacher, Role::Teacher)?;
        let draft = validate_quiz(draft)?;
        let quiz = self
            .db
            .create_quiz(&teacher.id, draft)
            .await
            .map_err(code_conflict)?;
        info!("Teacher {} created quiz {}", teacher.id, quiz.id);
        self.audit
            .record(Some(&teacher.id), "quiz.create", "quiz", &quiz.id, None)
            .await;
        Ok(quiz)
    }

    pub async fn update_quiz(&self, teacher: &User, quiz_id: &str, draft: QuizDraft) -> CoreResult<Quiz> {
        owned_quiz(self.db.as_ref(), teacher, quiz_id).await?;
        let draft = validate_quiz(draft)?;
        self.db.update_quiz(quiz_id, draft).await.map_err(code_conflict)
    }

    pub async fn delete_quiz(&self, teacher: &User, quiz_id: &str) -> CoreResult<()> {
        owned_quiz(self.db.as_ref(), teacher, quiz_id).await?;
        self.db.delete_quiz(quiz_id).await?;
        self.audit
            .record(Some(&teacher.id), "quiz.delete", "quiz", quiz_id, None)
            .await;
        Ok(())
    }

    /// Public quizzes plus the viewer's own.
    pub async fn list_quizzes(&self, viewer: &User) -> CoreResult<Vec<Quiz>> {
        ensure_active(viewer)?;
        Ok(self.db.list_visible_quizzes(&viewer.id).await?)
    }

    pub async fn find_quiz_by_code(&self, code: &str) -> CoreResult<Quiz> {
        let code = code.trim().to_ascii_uppercase();
        self.db.get_quiz_by_code(&code).await.map_err(|e| match e {
            PortError::NotFound(_) => CoreError::NotFound("No quiz uses this code".to_string()),
            other => other.into(),
        })
    }

    pub async fn add_question(
        &self,
        teacher: &User,
        quiz_id: &str,
        draft: QuestionDraft,
    ) -> CoreResult<Question> {
        owned_quiz(self.db.as_ref(), teacher, quiz_id).await?;
        let draft = validate_question(draft)?;
        Ok(self.db.create_question(quiz_id, draft, false).await?)
    }

    pub async fn update_question(
        &self,
        teacher: &User,
        question_id: &str,
        draft: QuestionDraft,
    ) -> CoreResult<Question> {
        let question = self.db.get_question(question_id).await?;
        owned_quiz(self.db.as_ref(), teacher, &question.quiz_id).await?;
        let draft = validate_question(draft)?;
        Ok(self.db.update_question(question_id, draft).await?)
    }

    pub async fn delete_question(&self, teacher: &User, question_id: &str) -> CoreResult<()> {
        let question = self.db.get_question(question_id).await?;
        owned_quiz(self.db.as_ref(), teacher, &question.quiz_id).await?;
        Ok(self.db.delete_question(question_id).await?)
    }

    /// Full questions including answers; owner only.
    pub async fn list_quiz_questions(&self, teacher: &User, quiz_id: &str) -> CoreResult<Vec<Question>> {
        owned_quiz(self.db.as_ref(), teacher, quiz_id).await?;
        Ok(self.db.list_questions(quiz_id).await?)
    }

    /// Asks the generator for a question and stores it with `generated = true`.
    pub async fn generate_question(
        &self,
        teacher: &User,
        quiz_id: &str,
        params: GenerationParams,
    ) -> CoreResult<Question> {
        owned_quiz(self.db.as_ref(), teacher, quiz_id).await?;
        let generator = self.generator.as_ref().ok_or_else(|| {
            CoreError::UpstreamUnavailable("Question generation is not configured".to_string())
        })?;
        if params.topic.trim().is_empty() {
            return Err(CoreError::Validation("A topic is required".to_string()));
        }

        let generated = generator.generate_question(&params).await.map_err(upstream)?;
        let draft = validate_question(QuestionDraft {
            kind: params.kind,
            difficulty: params.difficulty,
            text: generated.question,
            correct_answer: generated.correct_answer,
            incorrect_answers: generated.incorrect_answers,
            explanation: generated.explanation,
        })
        .map_err(|e| {
            CoreError::UpstreamUnavailable(format!("Generator returned an unusable question: {}", e))
        })?;

        let question = self.db.create_question(quiz_id, draft, true).await?;
        info!("Generated question {} for quiz {}", question.id, quiz_id);
        Ok(question)
    }
}

fn code_conflict(e: PortError) -> CoreError {
    match e {
        PortError::Conflict(_) => CoreError::Conflict("This join code is already in use".to_string()),
        other => other.into(),
    }
}
