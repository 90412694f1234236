//! services/api/src/web/quizzes.rs
//!
//! Quiz and question authoring endpoints.

use crate::web::{
    reject,
    rest::{respond_all, QuestionResponse, QuizResponse},
    state::AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use quiz_platform_core::domain::{GenerationParams, QuestionDraft, QuizDraft, User};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use utoipa::ToSchema;

//=========================================================================================
// Request Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct QuizPayload {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    /// Optional join code; stored uppercase and unique.
    #[serde(default)]
    pub code: Option<String>,
    /// `public` or `private`.
    pub visibility: String,
}

#[derive(Deserialize, ToSchema)]
pub struct QuestionPayload {
    /// `multiple` or `boolean`.
    pub kind: String,
    /// `easy`, `medium` or `hard`.
    pub difficulty: String,
    pub text: String,
    pub correct_answer: String,
    #[serde(default)]
    pub incorrect_answers: Vec<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct GeneratePayload {
    pub topic: String,
    pub kind: String,
    pub difficulty: String,
    #[serde(default)]
    pub style: Option<String>,
}

fn field<T: FromStr<Err = String>>(value: &str) -> Result<T, (StatusCode, String)> {
    value
        .trim()
        .to_lowercase()
        .parse()
        .map_err(|e: String| (StatusCode::BAD_REQUEST, e))
}

impl QuizPayload {
    fn into_draft(self) -> Result<QuizDraft, (StatusCode, String)> {
        Ok(QuizDraft {
            visibility: field(&self.visibility)?,
            title: self.title,
            description: self.description,
            category: self.category,
            code: self.code,
        })
    }
}

impl QuestionPayload {
    fn into_draft(self) -> Result<QuestionDraft, (StatusCode, String)> {
        Ok(QuestionDraft {
            kind: field(&self.kind)?,
            difficulty: field(&self.difficulty)?,
            text: self.text,
            correct_answer: self.correct_answer,
            incorrect_answers: self.incorrect_answers,
            explanation: self.explanation,
        })
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /quizzes - Public quizzes plus the caller's own
#[utoipa::path(
    get,
    path = "/quizzes",
    responses((status = 200, description = "Visible quizzes", body = [QuizResponse])),
    security(("bearer" = []))
)]
pub async fn list_quizzes_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let quizzes = state.quizzes.list_quizzes(&user).await.map_err(reject)?;
    Ok(Json(respond_all::<_, QuizResponse>(quizzes)))
}

/// POST /quizzes - Create a quiz (teachers)
#[utoipa::path(
    post,
    path = "/quizzes",
    request_body = QuizPayload,
    responses(
        (status = 201, description = "Quiz created", body = QuizResponse),
        (status = 400, description = "Invalid quiz"),
        (status = 403, description = "Only teachers create quizzes"),
        (status = 409, description = "Join code already in use")
    ),
    security(("bearer" = []))
)]
pub async fn create_quiz_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(req): Json<QuizPayload>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let quiz = state
        .quizzes
        .create_quiz(&user, req.into_draft()?)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(QuizResponse::from(quiz))))
}

/// GET /quizzes/code/{code} - Find a quiz by join code
#[utoipa::path(
    get,
    path = "/quizzes/code/{code}",
    params(("code" = String, Path, description = "Join code, case-insensitive")),
    responses(
        (status = 200, description = "Quiz", body = QuizResponse),
        (status = 404, description = "No quiz uses this code")
    ),
    security(("bearer" = []))
)]
pub async fn find_by_code_handler(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let quiz = state.quizzes.find_quiz_by_code(&code).await.map_err(reject)?;
    Ok(Json(QuizResponse::from(quiz)))
}

/// PUT /quizzes/{quiz_id} - Replace a quiz's details (owner)
#[utoipa::path(
    put,
    path = "/quizzes/{quiz_id}",
    params(("quiz_id" = String, Path, description = "Quiz id, e.g. QZ001")),
    request_body = QuizPayload,
    responses(
        (status = 200, description = "Quiz updated", body = QuizResponse),
        (status = 403, description = "Not the owner")
    ),
    security(("bearer" = []))
)]
pub async fn update_quiz_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(quiz_id): Path<String>,
    Json(req): Json<QuizPayload>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let quiz = state
        .quizzes
        .update_quiz(&user, &quiz_id, req.into_draft()?)
        .await
        .map_err(reject)?;
    Ok(Json(QuizResponse::from(quiz)))
}

/// DELETE /quizzes/{quiz_id} - Delete a quiz with its questions and sessions (owner)
#[utoipa::path(
    delete,
    path = "/quizzes/{quiz_id}",
    params(("quiz_id" = String, Path, description = "Quiz id")),
    responses(
        (status = 204, description = "Quiz deleted"),
        (status = 403, description = "Not the owner")
    ),
    security(("bearer" = []))
)]
pub async fn delete_quiz_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state.quizzes.delete_quiz(&user, &quiz_id).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /quizzes/{quiz_id}/questions - Questions with answers (owner)
#[utoipa::path(
    get,
    path = "/quizzes/{quiz_id}/questions",
    params(("quiz_id" = String, Path, description = "Quiz id")),
    responses(
        (status = 200, description = "Questions", body = [QuestionResponse]),
        (status = 403, description = "Not the owner")
    ),
    security(("bearer" = []))
)]
pub async fn list_questions_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let questions = state
        .quizzes
        .list_quiz_questions(&user, &quiz_id)
        .await
        .map_err(reject)?;
    Ok(Json(respond_all::<_, QuestionResponse>(questions)))
}

/// POST /quizzes/{quiz_id}/questions - Add a question (owner)
#[utoipa::path(
    post,
    path = "/quizzes/{quiz_id}/questions",
    params(("quiz_id" = String, Path, description = "Quiz id")),
    request_body = QuestionPayload,
    responses(
        (status = 201, description = "Question added", body = QuestionResponse),
        (status = 400, description = "Invalid question")
    ),
    security(("bearer" = []))
)]
pub async fn add_question_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(quiz_id): Path<String>,
    Json(req): Json<QuestionPayload>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let question = state
        .quizzes
        .add_question(&user, &quiz_id, req.into_draft()?)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(QuestionResponse::from(question))))
}

/// POST /quizzes/{quiz_id}/questions/generate - Generate and store a question (owner)
#[utoipa::path(
    post,
    path = "/quizzes/{quiz_id}/questions/generate",
    params(("quiz_id" = String, Path, description = "Quiz id")),
    request_body = GeneratePayload,
    responses(
        (status = 201, description = "Generated question", body = QuestionResponse),
        (status = 502, description = "Generator unavailable or returned an unusable question")
    ),
    security(("bearer" = []))
)]
pub async fn generate_question_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(quiz_id): Path<String>,
    Json(req): Json<GeneratePayload>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let params = GenerationParams {
        kind: field(&req.kind)?,
        difficulty: field(&req.difficulty)?,
        topic: req.topic,
        style: req.style,
    };
    let question = state
        .quizzes
        .generate_question(&user, &quiz_id, params)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(QuestionResponse::from(question))))
}

/// PUT /questions/{question_id} - Replace a question (owner)
#[utoipa::path(
    put,
    path = "/questions/{question_id}",
    params(("question_id" = String, Path, description = "Question id, e.g. QU001")),
    request_body = QuestionPayload,
    responses((status = 200, description = "Question updated", body = QuestionResponse)),
    security(("bearer" = []))
)]
pub async fn update_question_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(question_id): Path<String>,
    Json(req): Json<QuestionPayload>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let question = state
        .quizzes
        .update_question(&user, &question_id, req.into_draft()?)
        .await
        .map_err(reject)?;
    Ok(Json(QuestionResponse::from(question)))
}

/// DELETE /questions/{question_id} - Remove a question (owner)
#[utoipa::path(
    delete,
    path = "/questions/{question_id}",
    params(("question_id" = String, Path, description = "Question id")),
    responses((status = 204, description = "Question deleted")),
    security(("bearer" = []))
)]
pub async fn delete_question_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(question_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .quizzes
        .delete_question(&user, &question_id)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_platform_core::domain::{Difficulty, QuestionKind, Visibility};

    #[test]
    fn enum_fields_are_parsed_leniently() {
        let draft = QuestionPayload {
            kind: "Boolean".to_string(),
            difficulty: " EASY".to_string(),
            text: "The sun is a star.".to_string(),
            correct_answer: "True".to_string(),
            incorrect_answers: vec![],
            explanation: None,
        }
        .into_draft()
        .unwrap();
        assert_eq!(draft.kind, QuestionKind::Boolean);
        assert_eq!(draft.difficulty, Difficulty::Easy);
    }

    #[test]
    fn unknown_visibility_is_a_bad_request() {
        let err = QuizPayload {
            title: "Rivers".to_string(),
            description: String::new(),
            category: String::new(),
            code: None,
            visibility: "hidden".to_string(),
        }
        .into_draft()
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);

        let ok = QuizPayload {
            title: "Rivers".to_string(),
            description: String::new(),
            category: String::new(),
            code: None,
            visibility: "Private".to_string(),
        }
        .into_draft()
        .unwrap();
        assert_eq!(ok.visibility, Visibility::Private);
    }
}
