//! services/api/src/web/sessions.rs
//!
//! Endpoints driving a student's attempt at a quiz.

use crate::web::{
    reject,
    rest::{respond_all, AnswerResponse, PresentedQuestionResponse, ReviewResponse, SessionResponse},
    state::AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use quiz_platform_core::domain::{SessionStart, User};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Deserialize, ToSchema)]
pub struct SubmitAnswerRequest {
    pub question_id: String,
    pub selected_answer: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ReviseAnswerRequest {
    pub selected_answer: String,
}

/// POST /quizzes/{quiz_id}/sessions - Start or resume an attempt (students)
#[utoipa::path(
    post,
    path = "/quizzes/{quiz_id}/sessions",
    params(("quiz_id" = String, Path, description = "Quiz id")),
    responses(
        (status = 201, description = "New attempt started", body = SessionResponse),
        (status = 200, description = "The attempt already in progress", body = SessionResponse),
        (status = 403, description = "Only students take quizzes")
    ),
    security(("bearer" = []))
)]
pub async fn start_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let start = state
        .sessions
        .start_quiz_session(&user, &quiz_id)
        .await
        .map_err(reject)?;
    let status = match start {
        SessionStart::Created(_) => StatusCode::CREATED,
        SessionStart::Existing(_) => StatusCode::OK,
    };
    Ok((status, Json(SessionResponse::from(start.into_session()))))
}

/// GET /sessions/{session_id}/questions - Questions with shuffled options
#[utoipa::path(
    get,
    path = "/sessions/{session_id}/questions",
    params(("session_id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Questions without their answers", body = [PresentedQuestionResponse]),
        (status = 409, description = "Session is not in progress")
    ),
    security(("bearer" = []))
)]
pub async fn session_questions_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let questions = state
        .sessions
        .list_session_questions(&user, session_id)
        .await
        .map_err(reject)?;
    Ok(Json(respond_all::<_, PresentedQuestionResponse>(questions)))
}

/// POST /sessions/{session_id}/answers - Answer a question for the first time
#[utoipa::path(
    post,
    path = "/sessions/{session_id}/answers",
    params(("session_id" = Uuid, Path, description = "Session id")),
    request_body = SubmitAnswerRequest,
    responses(
        (status = 201, description = "Answer recorded", body = AnswerResponse),
        (status = 400, description = "Answer is not one of the options"),
        (status = 409, description = "Already answered, or session not in progress")
    ),
    security(("bearer" = []))
)]
pub async fn submit_answer_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let answer = state
        .sessions
        .submit_answer(&user, session_id, &req.question_id, &req.selected_answer)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(AnswerResponse::from(answer))))
}

/// PUT /sessions/{session_id}/answers/{question_id} - Change an existing answer
#[utoipa::path(
    put,
    path = "/sessions/{session_id}/answers/{question_id}",
    params(
        ("session_id" = Uuid, Path, description = "Session id"),
        ("question_id" = String, Path, description = "Question id")
    ),
    request_body = ReviseAnswerRequest,
    responses(
        (status = 200, description = "Answer replaced", body = AnswerResponse),
        (status = 404, description = "No earlier answer to revise")
    ),
    security(("bearer" = []))
)]
pub async fn revise_answer_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path((session_id, question_id)): Path<(Uuid, String)>,
    Json(req): Json<ReviseAnswerRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let answer = state
        .sessions
        .revise_answer(&user, session_id, &question_id, &req.selected_answer)
        .await
        .map_err(reject)?;
    Ok(Json(AnswerResponse::from(answer)))
}

/// POST /sessions/{session_id}/complete - Finish the attempt and score it
#[utoipa::path(
    post,
    path = "/sessions/{session_id}/complete",
    params(("session_id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Completed session with its score", body = SessionResponse),
        (status = 409, description = "Session already ended")
    ),
    security(("bearer" = []))
)]
pub async fn complete_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = state
        .sessions
        .complete_session(&user, session_id)
        .await
        .map_err(reject)?;
    Ok(Json(SessionResponse::from(session)))
}

/// POST /sessions/{session_id}/force-complete - End a student's attempt (quiz owner)
#[utoipa::path(
    post,
    path = "/sessions/{session_id}/force-complete",
    params(("session_id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Completed session with its score", body = SessionResponse),
        (status = 403, description = "Not the quiz owner")
    ),
    security(("bearer" = []))
)]
pub async fn force_complete_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = state
        .sessions
        .force_complete_session(&user, session_id)
        .await
        .map_err(reject)?;
    Ok(Json(SessionResponse::from(session)))
}

/// GET /quizzes/{quiz_id}/review - The caller's latest completed attempt, answer by answer
#[utoipa::path(
    get,
    path = "/quizzes/{quiz_id}/review",
    params(("quiz_id" = String, Path, description = "Quiz id")),
    responses(
        (status = 200, description = "Review", body = ReviewResponse),
        (status = 404, description = "No completed attempt")
    ),
    security(("bearer" = []))
)]
pub async fn latest_review_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let review = state
        .sessions
        .get_latest_review(&user, &quiz_id)
        .await
        .map_err(reject)?;
    Ok(Json(ReviewResponse::from(review)))
}
