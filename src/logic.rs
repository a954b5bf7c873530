//! The submission pipeline shared by the HTTP and WebSocket handlers.
//!
//! compile -> (error feedback) | preprocess -> run with tests -> (error feedback | test feedback)
//!
//! Tip paragraphs are appended to whatever feedback comes out, and the
//! learner state records the raw code and details for the next round.

use serde::Serialize;
use tracing::{info, instrument};

use crate::domain::{Question, ALL_SUPPORTED_LANGUAGES};
use crate::error::{TieError, TieResult};
use crate::eval_result::CodeEvalResult;
use crate::evaluator::{feedback_details_for_error_cases, feedback_details_from_test_results, ExecutionContext};
use crate::feedback::{Feedback, FeedbackDetails};
use crate::learner::LearnerSession;
use crate::preprocess::preprocess;
use crate::runner::CodeRunner;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
  pub feedback: Feedback,
  pub stdout: Option<String>,
}

fn identity_line_indexes(code: &str) -> Vec<Option<usize>> {
  (0..code.split('\n').count()).map(Some).collect()
}

/// Evaluates one submission of `code` for `question`. The session is reset
/// first if it belongs to another question.
#[instrument(level = "info", skip(session, question, code, runner), fields(question = %question.id, code_len = code.len()))]
pub async fn process_submission(
  session: &mut LearnerSession,
  question: &Question,
  language: &str,
  code: &str,
  runner: &dyn CodeRunner,
) -> TieResult<SubmissionResult> {
  if !ALL_SUPPORTED_LANGUAGES.contains(&language) {
    return Err(TieError::UnsupportedLanguage(language.to_string()));
  }
  if session.question_id != question.id {
    session.reset_for_question(question);
  }
  let tasks = question.tasks();

  let compiled = runner.compile(code, language).await?;
  let (details, result, line_indexes): (FeedbackDetails, CodeEvalResult, Vec<Option<usize>>) =
    match feedback_details_for_error_cases(&mut session.state, &compiled, ExecutionContext::Compilation, language) {
      Some(details) => (details, compiled, identity_line_indexes(code)),
      None => {
        let preprocessed = preprocess(code, question.auxiliary_code(language).unwrap_or_default(), tasks);
        let result = runner.run_with_tests(code, &preprocessed, language, tasks).await?;
        let details = match feedback_details_for_error_cases(&mut session.state, &result, ExecutionContext::RunWithTests, language) {
          Some(details) => details,
          None => feedback_details_from_test_results(&session.state, tasks, &result)?,
        };
        let line_indexes = if runner.reports_harness_lines() {
          preprocessed.raw_code_line_indexes
        } else {
          identity_line_indexes(code)
        };
        (details, result, line_indexes)
      }
    };

  let mut feedback = session.generator.generate(&details, &line_indexes)?;
  session.state.record_raw_code(code);
  session.state.record_feedback_details(details);

  let current_task = result.index_of_first_failed_task(tasks).unwrap_or(tasks.len().saturating_sub(1));
  if let Some(task) = tasks.get(current_task) {
    if let Some(paragraphs) = session.tips.run_tips_check(language, code, &task.id) {
      feedback.append_paragraphs(paragraphs);
    }
  }

  info!(target: "feedback", category = %feedback.category, paragraphs = feedback.paragraphs.len(), "Submission evaluated");
  Ok(SubmissionResult {
    stdout: result.stdout_to_display(tasks).map(str::to_string),
    feedback,
  })
}
