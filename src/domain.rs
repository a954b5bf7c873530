//! Question bank models: questions, tasks, test suites, specific tests and tips.
//!
//! Everything here is immutable once loaded. Inputs and outputs are kept as
//! JSON values so that any Python-serializable test data round-trips.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TieError;
use crate::util::values_equal;

pub const LANGUAGE_PYTHON: &str = "python";
pub const ALL_SUPPORTED_LANGUAGES: &[&str] = &[LANGUAGE_PYTHON];

/// One coding question: starter/auxiliary code per language plus ordered tasks.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
  pub id: String,
  pub title: String,
  #[serde(default)] pub starter_code: HashMap<String, String>,
  #[serde(default)] pub auxiliary_code: HashMap<String, String>,
  pub tasks: Vec<Task>,
}

impl Question {
  pub fn tasks(&self) -> &[Task] {
    &self.tasks
  }

  pub fn starter_code(&self, language: &str) -> Option<&str> {
    self.starter_code.get(language).map(String::as_str)
  }

  pub fn auxiliary_code(&self, language: &str) -> Option<&str> {
    self.auxiliary_code.get(language).map(String::as_str)
  }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Instruction {
  pub content: String,
  #[serde(rename = "type", default = "default_instruction_kind")]
  pub kind: String,
}

fn default_instruction_kind() -> String {
  "text".into()
}

/// One coding sub-challenge of a question.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
  pub id: String,
  #[serde(default)] pub instructions: Vec<Instruction>,
  #[serde(default)] pub prerequisite_skills: Vec<String>,
  #[serde(default)] pub acquired_skills: Vec<String>,
  pub main_function_name: String,
  #[serde(default)] pub input_function_name: Option<String>,
  #[serde(default)] pub output_function_name: Option<String>,
  #[serde(default)] pub language_specific_tips: HashMap<String, Vec<Tip>>,
  #[serde(default)] pub test_suites: Vec<TestSuite>,
  #[serde(default)] pub buggy_output_tests: Vec<BuggyOutputTest>,
  #[serde(default)] pub suite_level_tests: Vec<SuiteLevelTest>,
  #[serde(default)] pub performance_tests: Vec<PerformanceTest>,
}

impl Task {
  /// Task-specific tips for a language; missing languages have no tips.
  pub fn tips(&self, language: &str) -> &[Tip] {
    self.language_specific_tips
      .get(language)
      .map(Vec::as_slice)
      .unwrap_or(&[])
  }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSuite {
  pub id: String,
  #[serde(default)] pub human_readable_name: String,
  pub test_cases: Vec<TestCase>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
  pub input: Value,
  pub allowed_outputs: Vec<Value>,
  #[serde(default)] pub tag: Option<String>,
}

impl TestCase {
  /// True if `output` equals any of the allowed outputs (`2.0` matches `2`).
  pub fn matches_output(&self, output: &Value) -> bool {
    self.allowed_outputs.iter().any(|allowed| values_equal(allowed, output))
  }

  pub fn any_allowed_output(&self) -> Option<&Value> {
    self.allowed_outputs.first()
  }
}

/// Detects a known-incorrect implementation and carries escalating hints for it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuggyOutputTest {
  pub buggy_function_name: String,
  #[serde(default)] pub ignored_test_suite_ids: Vec<String>,
  pub messages: Vec<String>,
}

/// Fires when a given combination of suites passes and fails.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteLevelTest {
  #[serde(default)] pub test_suite_ids_that_must_pass: Vec<String>,
  #[serde(default)] pub test_suite_ids_that_must_fail: Vec<String>,
  pub messages: Vec<String>,
}

impl SuiteLevelTest {
  pub fn are_conditions_met(&self, passing_suite_ids: &[String]) -> bool {
    self.test_suite_ids_that_must_pass
      .iter()
      .all(|id| passing_suite_ids.contains(id))
      && self.test_suite_ids_that_must_fail
        .iter()
        .all(|id| !passing_suite_ids.contains(id))
  }
}

/// The performance label ("linear", "quadratic"...) comes from an external classifier.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceTest {
  #[serde(default)] pub input_data_atom: Value,
  #[serde(default)] pub transformation_function_name: String,
  pub expected_performance: String,
  #[serde(default)] pub evaluation_function_name: String,
}

/// Raw tip entry as written in question data.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TipSpec {
  pub regex_string: String,
  pub message: String,
  #[serde(default)] pub require_print_to_be_disabled: bool,
}

/// A regex trigger plus the message shown once it has been seen twice in a row.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "TipSpec", into = "TipSpec")]
pub struct Tip {
  regex: Regex,
  message: String,
  require_print_to_be_disabled: bool,
}

impl Tip {
  pub fn new(regex_string: &str, message: impl Into<String>) -> Result<Self, TieError> {
    Self::try_from(TipSpec {
      regex_string: regex_string.to_string(),
      message: message.into(),
      require_print_to_be_disabled: false,
    })
  }

  pub fn message(&self) -> &str {
    &self.message
  }

  pub fn requires_print_to_be_disabled(&self) -> bool {
    self.require_print_to_be_disabled
  }

  /// True if any line matches the trigger.
  pub fn is_triggered_by<S: AsRef<str>>(&self, code_lines: &[S]) -> bool {
    code_lines.iter().any(|line| self.regex.is_match(line.as_ref()))
  }
}

impl TryFrom<TipSpec> for Tip {
  type Error = TieError;

  fn try_from(spec: TipSpec) -> Result<Self, Self::Error> {
    let regex = Regex::new(&spec.regex_string).map_err(|e| TieError::InvalidTipRegex {
      pattern: spec.regex_string.clone(),
      reason: e.to_string(),
    })?;
    Ok(Self {
      regex,
      message: spec.message,
      require_print_to_be_disabled: spec.require_print_to_be_disabled,
    })
  }
}

impl From<Tip> for TipSpec {
  fn from(tip: Tip) -> Self {
    TipSpec {
      regex_string: tip.regex.as_str().to_string(),
      message: tip.message,
      require_print_to_be_disabled: tip.require_print_to_be_disabled,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_case_accepts_any_allowed_output() {
    let tc = TestCase { input: json!("abc"), allowed_outputs: vec![json!("a"), json!("b")], tag: None };
    assert!(tc.matches_output(&json!("a")));
    assert!(tc.matches_output(&json!("b")));
    assert!(!tc.matches_output(&json!("c")));
    assert_eq!(tc.any_allowed_output(), Some(&json!("a")));
  }

  #[test]
  fn list_outputs_compare_structurally() {
    let tc = TestCase { input: json!(1), allowed_outputs: vec![json!([1, 2]), json!([2, 1])], tag: None };
    assert!(tc.matches_output(&json!([2, 1])));
    assert!(!tc.matches_output(&json!([1, 2, 3])));
  }

  #[test]
  fn float_output_matches_integer_allowed_output() {
    let tc = TestCase { input: json!(4), allowed_outputs: vec![json!(2)], tag: None };
    let observed: Value = serde_json::from_str("2.0").expect("json");
    assert!(tc.matches_output(&observed));
    assert!(tc.matches_output(&json!([2.0])[0]));
    assert!(!tc.matches_output(&json!(2.5)));
  }

  #[test]
  fn suite_level_conditions_need_pass_and_fail_sets() {
    let t = SuiteLevelTest {
      test_suite_ids_that_must_pass: vec!["A".into()],
      test_suite_ids_that_must_fail: vec!["B".into()],
      messages: vec!["m".into()],
    };
    assert!(t.are_conditions_met(&["A".to_string()]));
    assert!(!t.are_conditions_met(&["A".to_string(), "B".to_string()]));
    assert!(!t.are_conditions_met(&[]));
  }

  #[test]
  fn tip_triggers_on_any_line() {
    let tip = Tip::new(r"\bprint\b", "no printing").expect("regex");
    assert!(tip.is_triggered_by(&["x = 1", "    print(x)"]));
    assert!(!tip.is_triggered_by(&["x = 1", "blueprint = 2"]));
    let empty: [&str; 0] = [];
    assert!(!tip.is_triggered_by(&empty));
  }

  #[test]
  fn invalid_tip_regex_is_rejected_at_load() {
    let bad = serde_json::from_value::<Tip>(json!({ "regexString": "(", "message": "m" }));
    assert!(bad.is_err());
  }

  #[test]
  fn task_deserializes_from_camel_case() {
    let task: Task = serde_json::from_value(json!({
      "id": "t1",
      "mainFunctionName": "reverseWords",
      "languageSpecificTips": { "python": [{ "regexString": "split", "message": "m" }] },
      "testSuites": [{ "id": "GENERAL", "testCases": [{ "input": "a b", "allowedOutputs": ["b a"] }] }]
    }))
    .expect("task");
    assert_eq!(task.tips("python").len(), 1);
    assert!(task.tips("java").is_empty());
    assert!(task.buggy_output_tests.is_empty());
    assert_eq!(task.test_suites[0].test_cases.len(), 1);
  }
}
