//! Error type for programming errors in the feedback core.
//!
//! Learner mistakes (syntax errors, failing tests, timeouts...) are never
//! reported through this type; they are `FeedbackDetails` data.

use thiserror::Error;

pub type TieResult<T> = Result<T, TieError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TieError {
  #[error("Invalid feedback category: {0}")]
  InvalidFeedbackCategory(String),

  #[error("Invalid correctness state: {0}")]
  InvalidCorrectnessState(String),

  #[error("{accessor} is not available for {category} feedback")]
  WrongCategory { accessor: &'static str, category: &'static str },

  #[error("Line number index out of range: {0}")]
  LineOutOfRange(i64),

  #[error("Invalid tip regex '{pattern}': {reason}")]
  InvalidTipRegex { pattern: String, reason: String },

  #[error("Unknown buggy function: {0}")]
  UnknownBuggyFunction(String),

  #[error("Unknown question: {0}")]
  UnknownQuestion(String),

  #[error("Unknown session: {0}")]
  UnknownSession(String),

  #[error("No code runner available: configure a runner URL or submit in-browser results")]
  RunnerUnavailable,

  #[error("Unsupported language: {0}")]
  UnsupportedLanguage(String),

  #[error("Observed outputs do not line up with the task list: {0}")]
  MalformedResults(String),

  #[error("Serialization error: {0}")]
  Serialization(String),
}

impl From<serde_json::Error> for TieError {
  fn from(err: serde_json::Error) -> Self {
    TieError::Serialization(err.to_string())
  }
}
