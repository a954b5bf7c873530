//! Known-buggy reference implementations.
//!
//! Buggy-output tests name a function that reproduces a common mistake. The
//! registry maps those names (and task input/output transform names) to pure
//! functions, so a question can be checked once at load time and buggy
//! matches can be computed for runners that only report observed outputs.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, instrument};

use crate::domain::{Question, Task};
use crate::error::{TieError, TieResult};
use crate::util::values_equal;

pub type ReferenceFn = fn(&Value) -> Value;

#[derive(Clone, Debug)]
pub struct BuggyRegistry {
  functions: HashMap<String, ReferenceFn>,
}

impl Default for BuggyRegistry {
  fn default() -> Self {
    let mut registry = Self::empty();
    registry.register("AuxiliaryCode.reverseCharacters", reverse_characters);
    registry.register("AuxiliaryCode.reverseWordsCollapsingSpaces", reverse_words_collapsing_spaces);
    registry.register("AuxiliaryCode.returnInput", Value::clone);
    registry
  }
}

impl BuggyRegistry {
  pub fn empty() -> Self {
    Self { functions: HashMap::new() }
  }

  pub fn register(&mut self, name: impl Into<String>, f: ReferenceFn) {
    self.functions.insert(name.into(), f);
  }

  pub fn get(&self, name: &str) -> TieResult<ReferenceFn> {
    self.functions
      .get(name)
      .copied()
      .ok_or_else(|| TieError::UnknownBuggyFunction(name.to_string()))
  }

  /// Fails if any buggy function or input/output transform named by the
  /// question is not registered.
  #[instrument(level = "debug", skip_all, fields(question = %question.id))]
  pub fn resolve_question(&self, question: &Question) -> TieResult<()> {
    for task in question.tasks() {
      for name in task.input_function_name.iter().chain(task.output_function_name.iter()) {
        self.get(name)?;
      }
      for test in &task.buggy_output_tests {
        self.get(&test.buggy_function_name)?;
      }
    }
    Ok(())
  }

  fn transformed_output(&self, task: &Task, f: ReferenceFn, input: &Value) -> TieResult<Value> {
    let input = match &task.input_function_name {
      Some(name) => {
        let transform = self.get(name)?;
        transform(input)
      }
      None => input.clone(),
    };
    let output = f(&input);
    match &task.output_function_name {
      Some(name) => {
        let transform = self.get(name)?;
        Ok(transform(&output))
      }
      None => Ok(output),
    }
  }

  /// `[task][buggy test]` flags: true when the buggy function reproduces every
  /// observed output of the task, ignoring the test's ignored suites.
  pub fn compute_results(&self, tasks: &[Task], observed_outputs: &[Vec<Vec<Value>>]) -> TieResult<Vec<Vec<bool>>> {
    let mut results = Vec::with_capacity(tasks.len());
    for (ti, task) in tasks.iter().enumerate() {
      let mut task_results = Vec::with_capacity(task.buggy_output_tests.len());
      for test in &task.buggy_output_tests {
        let f = self.get(&test.buggy_function_name)?;
        let mut matches = true;
        'suites: for (si, suite) in task.test_suites.iter().enumerate() {
          if test.ignored_test_suite_ids.contains(&suite.id) {
            continue;
          }
          for (ci, case) in suite.test_cases.iter().enumerate() {
            let observed = observed_outputs.get(ti).and_then(|t| t.get(si)).and_then(|s| s.get(ci));
            let expected = self.transformed_output(task, f, &case.input)?;
            if !observed.is_some_and(|o| values_equal(o, &expected)) {
              matches = false;
              break 'suites;
            }
          }
        }
        debug!(target: "feedback", task = %task.id, buggy = %test.buggy_function_name, matches, "Buggy output check");
        task_results.push(matches);
      }
      results.push(task_results);
    }
    Ok(results)
  }
}

fn reverse_characters(input: &Value) -> Value {
  match input.as_str() {
    Some(s) => Value::String(s.chars().rev().collect()),
    None => input.clone(),
  }
}

/// Reverses words but splits on any whitespace, so runs of spaces collapse.
fn reverse_words_collapsing_spaces(input: &Value) -> Value {
  match input.as_str() {
    Some(s) => Value::String(s.split_whitespace().rev().collect::<Vec<_>>().join(" ")),
    None => input.clone(),
  }
}
