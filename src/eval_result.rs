//! Outcome of one code execution, as reported by a runner.
//!
//! Observed outputs are nested `[task][suite][case]`; buggy-output flags and
//! performance labels are nested `[task][test]`. A result is built once per
//! submission and never mutated afterwards.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::Task;
use crate::traceback::ErrorTraceback;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeEvalResult {
  pub preprocessed_code: String,
  pub raw_code: String,
  /// Stdout captured per test case, in task/suite/case order.
  #[serde(default)] pub observed_stdouts: Vec<String>,
  #[serde(default)] pub observed_outputs: Vec<Vec<Vec<Value>>>,
  #[serde(default)] pub buggy_output_test_results: Vec<Vec<bool>>,
  #[serde(default)] pub performance_test_results: Vec<Vec<String>>,
  #[serde(default)] pub error_traceback: Option<ErrorTraceback>,
  #[serde(default)] pub error_input: Option<Value>,
  #[serde(default)] pub memory_limit_exceeded: bool,
}

impl CodeEvalResult {
  /// Result of a run that stopped on an error before producing test results.
  pub fn from_error(
    preprocessed_code: impl Into<String>,
    raw_code: impl Into<String>,
    error_traceback: ErrorTraceback,
    error_input: Option<Value>,
  ) -> Self {
    Self {
      preprocessed_code: preprocessed_code.into(),
      raw_code: raw_code.into(),
      error_traceback: Some(error_traceback),
      error_input,
      ..Self::default()
    }
  }

  pub fn observed_output(&self, task: usize, suite: usize, case: usize) -> Option<&Value> {
    self.observed_outputs.get(task)?.get(suite)?.get(case)
  }

  pub fn buggy_output_matched(&self, task: usize, test: usize) -> bool {
    self.buggy_output_test_results
      .get(task)
      .and_then(|t| t.get(test))
      .copied()
      .unwrap_or(false)
  }

  pub fn observed_performance(&self, task: usize, test: usize) -> Option<&str> {
    self.performance_test_results
      .get(task)
      .and_then(|t| t.get(test))
      .map(String::as_str)
  }

  pub fn error_string(&self) -> Option<String> {
    self.error_traceback.as_ref().map(ErrorTraceback::error_string)
  }

  pub fn error_line_number(&self) -> Option<u32> {
    self.error_traceback.as_ref().and_then(ErrorTraceback::error_line_number)
  }

  pub fn has_time_limit_error(&self) -> bool {
    self.error_traceback.as_ref().is_some_and(ErrorTraceback::is_time_limit_error)
  }

  pub fn has_stack_exceeded_error(&self) -> bool {
    self.error_traceback.as_ref().is_some_and(ErrorTraceback::is_stack_exceeded_error)
  }

  pub fn has_server_error(&self) -> bool {
    self.error_traceback.as_ref().is_some_and(ErrorTraceback::is_server_error)
  }

  pub fn has_memory_limit_error(&self) -> bool {
    self.memory_limit_exceeded
  }

  fn case_passes(&self, task: &Task, ti: usize, si: usize, ci: usize) -> bool {
    let case = &task.test_suites[si].test_cases[ci];
    self.observed_output(ti, si, ci)
      .is_some_and(|observed| case.matches_output(observed))
  }

  fn suite_passes(&self, task: &Task, ti: usize, si: usize) -> bool {
    (0..task.test_suites[si].test_cases.len()).all(|ci| self.case_passes(task, ti, si, ci))
  }

  /// Index of the first task with a failing case. `Some(0)` when nothing was
  /// observed (runtime or infinite-loop error), `None` when everything passed.
  pub fn index_of_first_failed_task(&self, tasks: &[Task]) -> Option<usize> {
    if self.observed_outputs.is_empty() {
      return Some(0);
    }
    tasks.iter().enumerate().find_map(|(ti, task)| {
      let passed = (0..task.test_suites.len()).all(|si| self.suite_passes(task, ti, si));
      if passed { None } else { Some(ti) }
    })
  }

  /// Ids of the suites of `task_index` where every case passed.
  pub fn passing_suite_ids(&self, tasks: &[Task], task_index: usize) -> Vec<String> {
    let Some(task) = tasks.get(task_index) else {
      return vec![];
    };
    task.test_suites
      .iter()
      .enumerate()
      .filter(|(si, _)| self.suite_passes(task, task_index, *si))
      .map(|(_, suite)| suite.id.clone())
      .collect()
  }

  /// Stdout of the first failing test case (counted across all tasks), or
  /// of the last case run when they all pass. `None` if nothing ran.
  pub fn stdout_to_display(&self, tasks: &[Task]) -> Option<&str> {
    if self.observed_outputs.is_empty() {
      return None;
    }
    let mut test_number = 0usize;
    for (ti, task_outputs) in self.observed_outputs.iter().enumerate() {
      let Some(task) = tasks.get(ti) else { break };
      for (si, suite_outputs) in task_outputs.iter().enumerate() {
        for ci in 0..suite_outputs.len() {
          let in_bounds = task.test_suites
            .get(si)
            .is_some_and(|s| ci < s.test_cases.len());
          if !in_bounds || !self.case_passes(task, ti, si, ci) {
            return self.observed_stdouts.get(test_number).map(String::as_str);
          }
          test_number += 1;
        }
      }
    }
    test_number
      .checked_sub(1)
      .and_then(|last| self.observed_stdouts.get(last))
      .map(String::as_str)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{TestCase, TestSuite};
  use crate::traceback::TracebackCoordinates;
  use serde_json::json;

  fn task(suites: &[(&str, usize)]) -> Task {
    Task {
      id: "t".into(),
      instructions: vec![],
      prerequisite_skills: vec![],
      acquired_skills: vec![],
      main_function_name: "mockMainFunction".into(),
      input_function_name: None,
      output_function_name: None,
      language_specific_tips: Default::default(),
      test_suites: suites
        .iter()
        .map(|(id, n)| TestSuite {
          id: id.to_string(),
          human_readable_name: String::new(),
          test_cases: (0..*n)
            .map(|i| TestCase { input: json!(format!("{id}_{i}")), allowed_outputs: vec![json!(true)], tag: None })
            .collect(),
        })
        .collect(),
      buggy_output_tests: vec![],
      suite_level_tests: vec![],
      performance_tests: vec![],
    }
  }

  fn result(outputs: Vec<Vec<Vec<bool>>>) -> CodeEvalResult {
    CodeEvalResult {
      observed_stdouts: vec!["out0".into(), "out1".into(), "out2".into(), "out3".into()],
      observed_outputs: outputs
        .into_iter()
        .map(|t| t.into_iter().map(|s| s.into_iter().map(Value::Bool).collect()).collect())
        .collect(),
      ..CodeEvalResult::default()
    }
  }

  #[test]
  fn first_failed_task_scans_in_order() {
    let tasks = vec![task(&[("GENERAL", 2)]), task(&[("FIRST", 1), ("SECOND", 1)])];
    assert_eq!(result(vec![vec![vec![true, true]], vec![vec![true], vec![true]]]).index_of_first_failed_task(&tasks), None);
    assert_eq!(result(vec![vec![vec![true, false]], vec![vec![false], vec![true]]]).index_of_first_failed_task(&tasks), Some(0));
    assert_eq!(result(vec![vec![vec![true, true]], vec![vec![true], vec![false]]]).index_of_first_failed_task(&tasks), Some(1));
    assert_eq!(CodeEvalResult::default().index_of_first_failed_task(&tasks), Some(0));
  }

  #[test]
  fn passing_suite_ids_require_every_case() {
    let tasks = vec![task(&[("TASK1_SUITE1", 2), ("TASK1_SUITE2", 2)]), task(&[("TASK2_SUITE1", 2)])];
    let r = result(vec![vec![vec![true, false], vec![true, true]], vec![vec![true, true]]]);
    assert_eq!(r.passing_suite_ids(&tasks, 0), vec!["TASK1_SUITE2".to_string()]);
    assert_eq!(r.passing_suite_ids(&tasks, 1), vec!["TASK2_SUITE1".to_string()]);
    let r = result(vec![vec![vec![false, true], vec![false, true]], vec![vec![true, true]]]);
    assert!(r.passing_suite_ids(&tasks, 0).is_empty());
  }

  #[test]
  fn stdout_to_display_follows_first_failure() {
    let tasks = vec![task(&[("GENERAL", 2)]), task(&[("FIRST", 1), ("SECOND", 1)])];
    let all_pass = result(vec![vec![vec![true, true]], vec![vec![true], vec![true]]]);
    assert_eq!(all_pass.stdout_to_display(&tasks), Some("out3"));
    let second_fails = result(vec![vec![vec![true, false]], vec![vec![true], vec![true]]]);
    assert_eq!(second_fails.stdout_to_display(&tasks), Some("out1"));
    let third_fails = result(vec![vec![vec![true, true]], vec![vec![false], vec![true]]]);
    assert_eq!(third_fails.stdout_to_display(&tasks), Some("out2"));
    let only_first_task = result(vec![vec![vec![true, true]]]);
    assert_eq!(only_first_task.stdout_to_display(&tasks), Some("out1"));
    assert_eq!(CodeEvalResult::default().stdout_to_display(&tasks), None);
  }

  #[test]
  fn error_classification_reads_traceback() {
    let r = CodeEvalResult::from_error(
      "",
      "",
      ErrorTraceback::new("TimeLimitError: code took more than 3 seconds to run", vec![TracebackCoordinates::new(Some(5), Some(1))]),
      None,
    );
    assert!(r.has_time_limit_error());
    assert!(!r.has_stack_exceeded_error());
    assert_eq!(r.error_line_number(), None);
    assert!(CodeEvalResult::default().error_string().is_none());
  }
}
