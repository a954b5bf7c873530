//! HTTP endpoint handlers. These are thin wrappers that forward to `AppState`.
//! Each handler is instrumented and logs its parameters and basic result info.

use std::sync::Arc;
use axum::{
  extract::{Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument, warn};

use crate::error::TieError;
use crate::protocol::*;
use crate::state::AppState;

/// Maps core errors onto HTTP status codes.
pub struct ApiError(pub TieError);

impl From<TieError> for ApiError {
  fn from(e: TieError) -> Self { ApiError(e) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = match &self.0 {
      TieError::UnknownQuestion(_) | TieError::UnknownSession(_) => StatusCode::NOT_FOUND,
      TieError::UnsupportedLanguage(_) => StatusCode::BAD_REQUEST,
      TieError::RunnerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
      _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(target: "tie_backend", %status, error = %self.0, "HTTP request failed");
    (status, Json(ErrorOut { message: self.0.to_string() })).into_response()
  }
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state))]
pub async fn http_list_questions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let questions: Vec<QuestionSummary> = state.list_questions().await.iter().map(QuestionSummary::from).collect();
  Json(questions)
}

#[instrument(level = "info", skip(state), fields(%q.question_id))]
pub async fn http_get_question(
  State(state): State<Arc<AppState>>,
  Query(q): Query<QuestionQuery>,
) -> Result<Json<QuestionOut>, ApiError> {
  let question = state.get_question(&q.question_id).await?;
  info!(target: "tie_backend", id = %question.id, "HTTP question served");
  Ok(Json(to_out(&question)))
}

#[instrument(level = "info", skip(state, body), fields(%body.question_id))]
pub async fn http_post_session(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SessionIn>,
) -> Result<Json<SessionOut>, ApiError> {
  let session_id = state.start_session(&body.question_id).await?;
  Ok(Json(SessionOut { session_id }))
}

#[instrument(level = "info", skip(state), fields(%q.session_id))]
pub async fn http_delete_session(
  State(state): State<Arc<AppState>>,
  Query(q): Query<SessionQuery>,
) -> Result<StatusCode, ApiError> {
  state.end_session(&q.session_id).await?;
  Ok(StatusCode::NO_CONTENT)
}

#[instrument(level = "info", skip(state, body), fields(%body.session_id, %body.question_id, %body.language, code_len = body.code.len()))]
pub async fn http_post_submit(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SubmitIn>,
) -> Result<Json<crate::logic::SubmissionResult>, ApiError> {
  let result = state
    .submit(&body.session_id, &body.question_id, &body.language, &body.code, body.reported)
    .await?;
  info!(target: "feedback", id = %body.question_id, category = %result.feedback.category, "HTTP submission evaluated");
  Ok(Json(result))
}

#[instrument(level = "info", skip(state), fields(%q.question_id, %q.language))]
pub async fn http_get_saved(
  State(state): State<Arc<AppState>>,
  Query(q): Query<SavedQuery>,
) -> Result<Json<SavedOut>, ApiError> {
  let (code, feedback) = state.saved_work(&q.question_id, &q.language).await?;
  Ok(Json(SavedOut { code, feedback }))
}

#[instrument(level = "info", skip(state), fields(%q.question_id, %q.language))]
pub async fn http_delete_saved(
  State(state): State<Arc<AppState>>,
  Query(q): Query<SavedQuery>,
) -> Result<Json<SavedOut>, ApiError> {
  let (code, feedback) = state.clear_saved_work(&q.question_id, &q.language).await?;
  Ok(Json(SavedOut { code, feedback }))
}
