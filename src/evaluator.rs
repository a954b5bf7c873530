//! Turns a `CodeEvalResult` into `FeedbackDetails`.
//!
//! Error outcomes are checked first (time limit, memory, stack, server,
//! then syntax/runtime). Otherwise tasks are walked in order; the first task
//! with a failing case decides the feedback, preferring buggy-output
//! messages, then suite-level messages, then the failing case itself.

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::domain::{Task, TestCase};
use crate::error::{TieError, TieResult};
use crate::eval_result::CodeEvalResult;
use crate::feedback::{CorrectnessState, FeedbackDetails, SpecificTestCategory};
use crate::learner::{LearnerState, SpecificTestRef};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionContext {
  Compilation,
  RunWithTests,
}

/// Details for error outcomes, or `None` if the run finished without error.
/// Syntax and runtime errors update the language-unfamiliarity counters.
#[instrument(level = "debug", skip(state, result))]
pub fn feedback_details_for_error_cases(
  state: &mut LearnerState,
  result: &CodeEvalResult,
  context: ExecutionContext,
  language: &str,
) -> Option<FeedbackDetails> {
  if result.has_time_limit_error() {
    return Some(FeedbackDetails::TimeLimitError);
  }
  if result.has_memory_limit_error() {
    return Some(FeedbackDetails::MemoryLimitError);
  }
  if result.has_stack_exceeded_error() {
    return Some(FeedbackDetails::StackExceededError);
  }
  if result.has_server_error() {
    return Some(FeedbackDetails::ServerError);
  }

  let error_string = result.error_string().filter(|s| !s.is_empty())?;
  match context {
    ExecutionContext::RunWithTests => state.record_runtime_error(&error_string),
    ExecutionContext::Compilation => state.record_syntax_error(),
  }
  let language_unfamiliarity_feedback_needed = state.take_language_unfamiliarity_prompt();
  let error_line_number = result.error_line_number();

  Some(match context {
    ExecutionContext::RunWithTests => FeedbackDetails::RuntimeError {
      language: language.to_string(),
      error_string,
      error_line_number,
      error_input: result.error_input.clone().unwrap_or(Value::Null),
      language_unfamiliarity_feedback_needed,
    },
    ExecutionContext::Compilation => FeedbackDetails::SyntaxError {
      language: language.to_string(),
      error_string,
      error_line_number,
      language_unfamiliarity_feedback_needed,
    },
  })
}

struct FirstFailure<'a> {
  suite_id: &'a str,
  case_index: usize,
  test_case: &'a TestCase,
  observed: &'a Value,
}

fn first_failing_case<'a>(task: &'a Task, task_index: usize, result: &'a CodeEvalResult) -> TieResult<Option<FirstFailure<'a>>> {
  for (si, suite) in task.test_suites.iter().enumerate() {
    for (ci, case) in suite.test_cases.iter().enumerate() {
      let observed = result.observed_output(task_index, si, ci).ok_or_else(|| {
        TieError::MalformedResults(format!("no observed output for task {task_index}, suite {}, case {ci}", suite.id))
      })?;
      if !case.matches_output(observed) {
        return Ok(Some(FirstFailure { suite_id: &suite.id, case_index: ci, test_case: case, observed }));
      }
    }
  }
  Ok(None)
}

/// Maps a stage of a specific test to its details: a message while messages
/// remain, then the correctness states for the failing case.
fn specific_test_details(
  task_index: usize,
  failure: &FirstFailure<'_>,
  specific: SpecificTestRef,
  messages: &[String],
  stage: usize,
) -> FeedbackDetails {
  if stage < messages.len() {
    let test_suite_id = failure.suite_id.to_string();
    let message = messages[stage].clone();
    return match specific.category {
      SpecificTestCategory::KnownBug => FeedbackDetails::KnownBugFailure {
        task_index,
        test_suite_id,
        test_case_index: failure.case_index,
        specific_test_index: specific.index,
        message_index: stage,
        message,
      },
      SpecificTestCategory::SuiteLevel => FeedbackDetails::SuiteLevelFailure {
        task_index,
        test_suite_id,
        test_case_index: failure.case_index,
        specific_test_index: specific.index,
        message_index: stage,
        message,
      },
    };
  }
  incorrect_output(
    task_index,
    failure,
    CorrectnessState::at_clamped(stage - messages.len()),
    Some((specific.category, specific.index)),
  )
}

fn incorrect_output(
  task_index: usize,
  failure: &FirstFailure<'_>,
  correctness_state: CorrectnessState,
  specific_test: Option<(SpecificTestCategory, usize)>,
) -> FeedbackDetails {
  FeedbackDetails::IncorrectOutputFailure {
    task_index,
    test_suite_id: failure.suite_id.to_string(),
    test_case_index: failure.case_index,
    test_case: failure.test_case.clone(),
    observed_output: failure.observed.clone(),
    correctness_state,
    specific_test,
  }
}

/// Details for a run that finished without error. Identical resubmissions
/// get the previous details back unchanged.
#[instrument(level = "debug", skip_all, fields(tasks = tasks.len(), code_len = result.raw_code.len()))]
pub fn feedback_details_from_test_results(
  state: &LearnerState,
  tasks: &[Task],
  result: &CodeEvalResult,
) -> TieResult<FeedbackDetails> {
  if !state.has_raw_code_changed(&result.raw_code) {
    if let Some(previous) = state.previous_feedback_details() {
      debug!(target: "feedback", "Code unchanged; reusing previous feedback");
      return Ok(previous.clone());
    }
  }

  for (ti, task) in tasks.iter().enumerate() {
    if let Some(failure) = first_failing_case(task, ti, result)? {
      for (bi, test) in task.buggy_output_tests.iter().enumerate() {
        if !result.buggy_output_matched(ti, bi) || test.ignored_test_suite_ids.iter().any(|id| id == failure.suite_id) {
          continue;
        }
        let specific = SpecificTestRef {
          category: SpecificTestCategory::KnownBug,
          index: bi,
          message_count: test.messages.len(),
        };
        let stage = state.next_feedback_stage(ti, failure.suite_id, failure.case_index, Some(specific));
        return Ok(specific_test_details(ti, &failure, specific, &test.messages, stage));
      }

      let passing_suite_ids = result.passing_suite_ids(tasks, ti);
      for (li, test) in task.suite_level_tests.iter().enumerate() {
        if !test.are_conditions_met(&passing_suite_ids) {
          continue;
        }
        let specific = SpecificTestRef {
          category: SpecificTestCategory::SuiteLevel,
          index: li,
          message_count: test.messages.len(),
        };
        let stage = state.next_feedback_stage(ti, failure.suite_id, failure.case_index, Some(specific));
        return Ok(specific_test_details(ti, &failure, specific, &test.messages, stage));
      }

      let stage = state.next_feedback_stage(ti, failure.suite_id, failure.case_index, None);
      return Ok(incorrect_output(ti, &failure, CorrectnessState::at_clamped(stage), None));
    }

    for (pi, test) in task.performance_tests.iter().enumerate() {
      match result.observed_performance(ti, pi) {
        Some(observed) if observed == test.expected_performance => {}
        Some(observed) => {
          debug!(target: "feedback", task = %task.id, expected = %test.expected_performance, %observed, "Performance mismatch");
          return Ok(FeedbackDetails::PerformanceTestFailure {
            expected_performance: test.expected_performance.clone(),
          });
        }
        None => {
          warn!(target: "feedback", task = %task.id, test = pi, "No performance result reported; skipping");
        }
      }
    }
  }

  Ok(FeedbackDetails::Successful)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::feedback::FeedbackCategory;
  use crate::traceback::{ErrorTraceback, TracebackCoordinates};
  use serde_json::json;

  fn two_tasks() -> Vec<Task> {
    (1..=2)
      .map(|n| {
        serde_json::from_value(json!({
          "id": format!("task{n}"),
          "mainFunctionName": "mockMainFunction",
          "testSuites": [{
            "id": format!("TASK{n}_SUITE"),
            "testCases": [
              { "input": format!("task_{n}_correctness_test_1"), "allowedOutputs": [true] },
              { "input": format!("task_{n}_correctness_test_2"), "allowedOutputs": [true] },
            ],
          }],
          "buggyOutputTests": [{
            "buggyFunctionName": "AuxiliaryCode.mockFunction",
            "messages": [format!("task {n} buggy message 1"), format!("task {n} buggy message 2")],
          }],
          "performanceTests": [{ "expectedPerformance": "linear" }],
        }))
        .expect("task")
      })
      .collect()
  }

  fn result(code: &str, outputs: [[bool; 2]; 2], buggy: [bool; 2]) -> CodeEvalResult {
    CodeEvalResult {
      raw_code: code.into(),
      preprocessed_code: code.into(),
      observed_outputs: outputs.iter().map(|t| vec![t.iter().map(|b| json!(b)).collect()]).collect(),
      buggy_output_test_results: buggy.iter().map(|b| vec![*b]).collect(),
      performance_test_results: vec![vec!["linear".into()], vec!["linear".into()]],
      ..CodeEvalResult::default()
    }
  }

  #[test]
  fn first_failing_task_decides_and_later_tasks_are_not_evaluated() {
    let state = LearnerState::default();
    let details = feedback_details_from_test_results(&state, &two_tasks(), &result("a", [[true, false], [false, false]], [false, false]))
      .expect("details");
    assert_eq!(details.task_index(), Ok(0));
    assert_eq!(details.test_case_index(), Ok(1));
    assert_eq!(details.correctness_state(), Ok(CorrectnessState::InputDisplayed));
    let FeedbackDetails::IncorrectOutputFailure { test_case, .. } = &details else {
      panic!("expected incorrect output, got {details:?}");
    };
    assert_eq!(test_case.input, json!("task_1_correctness_test_2"));
  }

  #[test]
  fn buggy_message_wins_over_later_task_failures() {
    let state = LearnerState::default();
    let details = feedback_details_from_test_results(&state, &two_tasks(), &result("a", [[false, false], [false, false]], [true, false]))
      .expect("details");
    assert_eq!(details.category(), FeedbackCategory::KnownBugFailure);
    assert_eq!(details.specific_test_message(), Ok("task 1 buggy message 1"));
  }

  #[test]
  fn repeated_failure_escalates_then_clamps() {
    let tasks = two_tasks();
    let mut state = LearnerState::default();
    let mut states = vec![];
    for n in 0..6 {
      let r = result(&format!("code {n}"), [[true, false], [true, true]], [false, false]);
      let details = feedback_details_from_test_results(&state, &tasks, &r).expect("details");
      states.push(details.correctness_state().expect("state"));
      state.record_raw_code(&r.raw_code);
      state.record_feedback_details(details);
    }
    assert_eq!(
      states,
      vec![
        CorrectnessState::InputDisplayed,
        CorrectnessState::ExpectedOutputDisplayed,
        CorrectnessState::ObservedOutputDisplayed,
        CorrectnessState::NoMoreFeedback,
        CorrectnessState::NoMoreFeedback,
        CorrectnessState::NoMoreFeedback,
      ]
    );
  }

  #[test]
  fn buggy_messages_run_out_into_correctness_states() {
    let tasks = two_tasks();
    let mut state = LearnerState::default();
    let mut categories = vec![];
    for n in 0..4 {
      let r = result(&format!("code {n}"), [[false, false], [true, true]], [true, false]);
      let details = feedback_details_from_test_results(&state, &tasks, &r).expect("details");
      categories.push((details.category(), details.correctness_state().ok()));
      state.record_raw_code(&r.raw_code);
      state.record_feedback_details(details);
    }
    assert_eq!(
      categories,
      vec![
        (FeedbackCategory::KnownBugFailure, None),
        (FeedbackCategory::KnownBugFailure, None),
        (FeedbackCategory::IncorrectOutputFailure, Some(CorrectnessState::InputDisplayed)),
        (FeedbackCategory::IncorrectOutputFailure, Some(CorrectnessState::ExpectedOutputDisplayed)),
      ]
    );
  }

  #[test]
  fn unchanged_code_reuses_previous_details() {
    let tasks = two_tasks();
    let mut state = LearnerState::default();
    let r = result("same", [[true, false], [true, true]], [false, false]);
    let first = feedback_details_from_test_results(&state, &tasks, &r).expect("details");
    state.record_raw_code("same");
    state.record_feedback_details(first.clone());
    let second = feedback_details_from_test_results(&state, &tasks, &r).expect("details");
    assert_eq!(first, second);
  }

  #[test]
  fn suite_level_test_applies_when_conditions_hold() {
    let mut tasks = two_tasks();
    tasks[0].buggy_output_tests.clear();
    tasks[0].test_suites.push(serde_json::from_value(json!({
      "id": "EXTRA",
      "testCases": [{ "input": "x", "allowedOutputs": [true] }],
    })).expect("suite"));
    tasks[0].suite_level_tests = vec![serde_json::from_value(json!({
      "testSuiteIdsThatMustPass": ["EXTRA"],
      "testSuiteIdsThatMustFail": ["TASK1_SUITE"],
      "messages": ["suite message"],
    })).expect("suite level")];

    let mut r = result("a", [[true, false], [true, true]], [false, false]);
    r.observed_outputs[0].push(vec![json!(true)]);
    let details = feedback_details_from_test_results(&LearnerState::default(), &tasks, &r).expect("details");
    assert_eq!(details.category(), FeedbackCategory::SuiteLevelFailure);
    assert_eq!(details.specific_test_message(), Ok("suite message"));
  }

  #[test]
  fn performance_and_success() {
    let tasks = two_tasks();
    let mut r = result("a", [[true, true], [true, true]], [false, false]);
    assert_eq!(
      feedback_details_from_test_results(&LearnerState::default(), &tasks, &r),
      Ok(FeedbackDetails::Successful)
    );
    r.performance_test_results[1][0] = "quadratic".into();
    assert_eq!(
      feedback_details_from_test_results(&LearnerState::default(), &tasks, &r),
      Ok(FeedbackDetails::PerformanceTestFailure { expected_performance: "linear".into() })
    );
  }

  #[test]
  fn missing_outputs_are_malformed() {
    let mut r = result("a", [[true, true], [true, true]], [false, false]);
    r.observed_outputs.truncate(1);
    assert!(matches!(
      feedback_details_from_test_results(&LearnerState::default(), &two_tasks(), &r),
      Err(TieError::MalformedResults(_))
    ));
  }

  #[test]
  fn error_cases_in_priority_order() {
    let mut state = LearnerState::default();
    let timeout = CodeEvalResult::from_error("", "", ErrorTraceback::new("TimeLimitError: too slow", vec![]), None);
    assert_eq!(
      feedback_details_for_error_cases(&mut state, &timeout, ExecutionContext::RunWithTests, "python"),
      Some(FeedbackDetails::TimeLimitError)
    );
    let server = CodeEvalResult::from_error("", "", ErrorTraceback::from_server_error(), None);
    assert_eq!(
      feedback_details_for_error_cases(&mut state, &server, ExecutionContext::Compilation, "python"),
      Some(FeedbackDetails::ServerError)
    );

    let runtime = CodeEvalResult::from_error(
      "",
      "",
      ErrorTraceback::new("NameError: name 'x' is not defined", vec![TracebackCoordinates::new(Some(2), None)]),
      Some(json!("abc")),
    );
    let details = feedback_details_for_error_cases(&mut state, &runtime, ExecutionContext::RunWithTests, "python")
      .expect("runtime details");
    assert_eq!(details.error_string(), Ok("NameError: name 'x' is not defined on line 2"));
    assert_eq!(details.error_input(), Ok(&json!("abc")));

    let compile = feedback_details_for_error_cases(&mut state, &runtime, ExecutionContext::Compilation, "python")
      .expect("syntax details");
    assert_eq!(compile.category(), FeedbackCategory::SyntaxError);

    assert_eq!(
      feedback_details_for_error_cases(&mut state, &CodeEvalResult::default(), ExecutionContext::RunWithTests, "python"),
      None
    );
  }

  #[test]
  fn fifth_identical_runtime_error_asks_about_the_language() {
    let mut state = LearnerState::default();
    let runtime = CodeEvalResult::from_error("", "", ErrorTraceback::new("KeyError: 'a'", vec![]), None);
    let flags: Vec<bool> = (0..6)
      .map(|_| {
        feedback_details_for_error_cases(&mut state, &runtime, ExecutionContext::RunWithTests, "python")
          .and_then(|d| d.is_language_unfamiliarity_feedback_needed().ok())
          .unwrap_or(false)
      })
      .collect();
    assert_eq!(flags, vec![false, false, false, false, true, false]);
  }
}
