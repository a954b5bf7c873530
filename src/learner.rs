//! Per-learner state carried between submissions of one question.

use tracing::{debug, info};

use crate::config::FeedbackSettings;
use crate::domain::Question;
use crate::feedback::{FeedbackDetails, FeedbackGenerator, SpecificTestCategory, CORRECTNESS_STATES};
use crate::tips::UnpromptedFeedbackManager;

/// A specific test's identity plus how many hand-written messages it carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpecificTestRef {
  pub category: SpecificTestCategory,
  pub index: usize,
  pub message_count: usize,
}

#[derive(Clone, Debug)]
pub struct LearnerState {
  unfamiliarity_threshold: u32,
  consecutive_language_unfamiliarity_errors: u32,
  consecutive_same_runtime_errors: u32,
  previous_runtime_error: Option<String>,
  previous_raw_code: Option<String>,
  previous_feedback_details: Option<FeedbackDetails>,
}

impl Default for LearnerState {
  fn default() -> Self {
    Self::new(FeedbackSettings::default().unfamiliarity_threshold)
  }
}

impl LearnerState {
  pub fn new(unfamiliarity_threshold: u32) -> Self {
    Self {
      unfamiliarity_threshold,
      consecutive_language_unfamiliarity_errors: 0,
      consecutive_same_runtime_errors: 0,
      previous_runtime_error: None,
      previous_raw_code: None,
      previous_feedback_details: None,
    }
  }

  /// Counts consecutive identical runtime errors. An empty error string
  /// clears the count.
  pub fn record_runtime_error(&mut self, error_string: &str) {
    if error_string.is_empty() {
      self.consecutive_same_runtime_errors = 0;
    } else if self.previous_runtime_error.as_deref() == Some(error_string) {
      self.consecutive_same_runtime_errors += 1;
    } else {
      self.consecutive_same_runtime_errors = 1;
    }
    self.consecutive_language_unfamiliarity_errors = 0;
    self.previous_runtime_error = Some(error_string.to_string());
  }

  pub fn record_syntax_error(&mut self) {
    self.consecutive_language_unfamiliarity_errors += 1;
    self.consecutive_same_runtime_errors = 0;
    self.previous_runtime_error = None;
  }

  pub fn needs_language_unfamiliarity_prompt(&self) -> bool {
    self.consecutive_language_unfamiliarity_errors.max(self.consecutive_same_runtime_errors)
      >= self.unfamiliarity_threshold
  }

  pub fn reset_language_unfamiliarity_counters(&mut self) {
    self.consecutive_language_unfamiliarity_errors = 0;
    self.consecutive_same_runtime_errors = 0;
  }

  /// Checks for the prompt and, if it is due, resets the counters so the
  /// learner is not prompted again on the very next error.
  pub fn take_language_unfamiliarity_prompt(&mut self) -> bool {
    let needed = self.needs_language_unfamiliarity_prompt();
    if needed {
      info!(target: "feedback", "Language unfamiliarity prompt triggered");
      self.reset_language_unfamiliarity_counters();
    }
    needed
  }

  pub fn record_raw_code(&mut self, raw_code: &str) {
    self.previous_raw_code = Some(raw_code.to_string());
  }

  pub fn has_raw_code_changed(&self, raw_code: &str) -> bool {
    self.previous_raw_code.as_deref() != Some(raw_code)
  }

  pub fn record_feedback_details(&mut self, details: FeedbackDetails) {
    self.previous_feedback_details = Some(details);
  }

  pub fn previous_feedback_details(&self) -> Option<&FeedbackDetails> {
    self.previous_feedback_details.as_ref()
  }

  /// Stage of feedback to show for a failure at (task, suite, case).
  ///
  /// Stages `0..message_count` are the specific test's messages; the
  /// following four are `CORRECTNESS_STATES`. Without a specific test, stages
  /// are just the correctness states. The stage restarts at 0 whenever the
  /// failure differs from the previous one and is clamped at the last stage.
  pub fn next_feedback_stage(
    &self,
    task_index: usize,
    test_suite_id: &str,
    test_case_index: usize,
    specific_test: Option<SpecificTestRef>,
  ) -> usize {
    let message_count = specific_test.map_or(0, |s| s.message_count);
    let last_stage = message_count + CORRECTNESS_STATES.len() - 1;

    let Some(previous) = self.previous_feedback_details.as_ref() else {
      return 0;
    };
    if !previous.has_output_related_failure() {
      return 0;
    }
    let same_location = previous.task_index() == Ok(task_index)
      && previous.test_suite_id() == Ok(test_suite_id)
      && previous.test_case_index() == Ok(test_case_index);
    let same_specific_test = previous.specific_test() == Ok(specific_test.map(|s| (s.category, s.index)));
    if !same_location || !same_specific_test {
      return 0;
    }

    let previous_stage = match previous {
      FeedbackDetails::KnownBugFailure { message_index, .. }
      | FeedbackDetails::SuiteLevelFailure { message_index, .. } => *message_index,
      FeedbackDetails::IncorrectOutputFailure { correctness_state, specific_test: Some(_), .. } => {
        message_count + correctness_state.index()
      }
      FeedbackDetails::IncorrectOutputFailure { correctness_state, .. } => correctness_state.index(),
      _ => return 0,
    };
    let stage = (previous_stage + 1).min(last_stage);
    debug!(target: "feedback", task_index, test_suite_id, test_case_index, stage, "Escalating feedback");
    stage
  }
}

/// Everything tied to one learner working on one question. Submissions
/// against a session must be processed one at a time.
#[derive(Debug)]
pub struct LearnerSession {
  pub question_id: String,
  pub state: LearnerState,
  pub tips: UnpromptedFeedbackManager,
  pub generator: FeedbackGenerator,
  settings: FeedbackSettings,
}

impl LearnerSession {
  pub fn new(question: &Question, settings: &FeedbackSettings) -> Self {
    let mut tips = UnpromptedFeedbackManager::new(settings.print_supported);
    tips.reset(question.tasks());
    Self {
      question_id: question.id.clone(),
      state: LearnerState::new(settings.unfamiliarity_threshold),
      tips,
      generator: FeedbackGenerator::new(settings.code_execution_timeout_seconds),
      settings: settings.clone(),
    }
  }

  /// Discards all learner state and tip states for a new question.
  pub fn reset_for_question(&mut self, question: &Question) {
    info!(target: "feedback", from = %self.question_id, to = %question.id, "Resetting learner session");
    let settings = self.settings.clone();
    *self = Self::new(question, &settings);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::TestCase;
  use crate::feedback::CorrectnessState;
  use serde_json::json;

  fn incorrect(suite: &str, case: usize, state: CorrectnessState) -> FeedbackDetails {
    FeedbackDetails::IncorrectOutputFailure {
      task_index: 0,
      test_suite_id: suite.into(),
      test_case_index: case,
      test_case: TestCase { input: json!("x"), allowed_outputs: vec![json!("y")], tag: None },
      observed_output: json!("z"),
      correctness_state: state,
      specific_test: None,
    }
  }

  fn known_bug(message_index: usize) -> FeedbackDetails {
    FeedbackDetails::KnownBugFailure {
      task_index: 0,
      test_suite_id: "GENERAL".into(),
      test_case_index: 0,
      specific_test_index: 0,
      message_index,
      message: "m".into(),
    }
  }

  fn bug_ref(message_count: usize) -> Option<SpecificTestRef> {
    Some(SpecificTestRef { category: SpecificTestCategory::KnownBug, index: 0, message_count })
  }

  #[test]
  fn stage_starts_at_zero_without_history() {
    let state = LearnerState::default();
    assert_eq!(state.next_feedback_stage(0, "GENERAL", 0, None), 0);
  }

  #[test]
  fn stage_advances_for_same_failure_and_clamps() {
    let mut state = LearnerState::default();
    state.record_feedback_details(incorrect("GENERAL", 1, CorrectnessState::InputDisplayed));
    assert_eq!(state.next_feedback_stage(0, "GENERAL", 1, None), 1);
    state.record_feedback_details(incorrect("GENERAL", 1, CorrectnessState::NoMoreFeedback));
    assert_eq!(state.next_feedback_stage(0, "GENERAL", 1, None), 3);
  }

  #[test]
  fn stage_resets_when_location_or_category_changes() {
    let mut state = LearnerState::default();
    state.record_feedback_details(incorrect("GENERAL", 1, CorrectnessState::ExpectedOutputDisplayed));
    assert_eq!(state.next_feedback_stage(0, "GENERAL", 0, None), 0);
    assert_eq!(state.next_feedback_stage(0, "OTHER", 1, None), 0);
    assert_eq!(state.next_feedback_stage(1, "GENERAL", 1, None), 0);
    assert_eq!(state.next_feedback_stage(0, "GENERAL", 1, bug_ref(2)), 0);

    state.record_feedback_details(FeedbackDetails::Successful);
    assert_eq!(state.next_feedback_stage(0, "GENERAL", 1, None), 0);
  }

  #[test]
  fn specific_test_walks_messages_then_correctness_states() {
    let mut state = LearnerState::default();
    state.record_feedback_details(known_bug(0));
    assert_eq!(state.next_feedback_stage(0, "GENERAL", 0, bug_ref(2)), 1);
    state.record_feedback_details(known_bug(1));
    assert_eq!(state.next_feedback_stage(0, "GENERAL", 0, bug_ref(2)), 2);
    assert_eq!(state.next_feedback_stage(0, "GENERAL", 0, None), 0);

    state.record_feedback_details(FeedbackDetails::IncorrectOutputFailure {
      task_index: 0,
      test_suite_id: "GENERAL".into(),
      test_case_index: 0,
      test_case: TestCase { input: json!("x"), allowed_outputs: vec![json!("y")], tag: None },
      observed_output: json!("z"),
      correctness_state: CorrectnessState::NoMoreFeedback,
      specific_test: Some((SpecificTestCategory::KnownBug, 0)),
    });
    assert_eq!(state.next_feedback_stage(0, "GENERAL", 0, bug_ref(2)), 5);
  }

  #[test]
  fn unfamiliarity_counts_syntax_errors() {
    let mut state = LearnerState::default();
    for _ in 0..4 {
      state.record_syntax_error();
      assert!(!state.take_language_unfamiliarity_prompt());
    }
    state.record_syntax_error();
    assert!(state.take_language_unfamiliarity_prompt());
    state.record_syntax_error();
    assert!(!state.needs_language_unfamiliarity_prompt());
  }

  #[test]
  fn unfamiliarity_counts_identical_runtime_errors_only() {
    let mut state = LearnerState::default();
    for _ in 0..4 {
      state.record_runtime_error("NameError: name 'x' is not defined");
    }
    state.record_runtime_error("KeyError: 'a'");
    assert!(!state.needs_language_unfamiliarity_prompt());
    for _ in 0..4 {
      state.record_runtime_error("KeyError: 'a'");
    }
    assert!(state.needs_language_unfamiliarity_prompt());
    state.record_syntax_error();
    assert!(!state.needs_language_unfamiliarity_prompt());
  }

  #[test]
  fn session_reset_discards_history() {
    let question: Question = serde_json::from_value(json!({
      "id": "q2",
      "title": "Q",
      "tasks": [{ "id": "t1", "mainFunctionName": "f" }],
    }))
    .expect("question");
    let mut session = LearnerSession::new(&question, &FeedbackSettings::default());
    session.state.record_raw_code("x");
    session.state.record_feedback_details(FeedbackDetails::Successful);
    session.reset_for_question(&question);
    assert!(session.state.previous_feedback_details().is_none());
    assert!(session.state.has_raw_code_changed("x"));
  }

  #[test]
  fn raw_code_change_detection() {
    let mut state = LearnerState::default();
    assert!(state.has_raw_code_changed("a"));
    state.record_raw_code("a");
    assert!(!state.has_raw_code_changed("a"));
    assert!(state.has_raw_code_changed("a "));
  }
}
