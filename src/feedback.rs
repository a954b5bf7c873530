//! Feedback data and rendering.
//!
//! `FeedbackDetails` is what the evaluator decides (one variant per category,
//! carrying only the fields valid for it). `FeedbackGenerator` turns details
//! into learner-facing `Feedback` paragraphs.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, instrument};

use crate::domain::{TestCase, LANGUAGE_PYTHON};
use crate::error::{TieError, TieResult};
use crate::util::{fill_template, to_python_repr};

pub const DEFAULT_CODE_EXECUTION_TIMEOUT_SECONDS: u64 = 3;
pub const PYTHON_PRIMER_BUTTON_NAME: &str = "New to Python?";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedbackCategory {
  SyntaxError,
  RuntimeError,
  TimeLimitError,
  MemoryLimitError,
  StackExceededError,
  ServerError,
  KnownBugFailure,
  SuiteLevelFailure,
  IncorrectOutputFailure,
  PerformanceTestFailure,
  Successful,
}

impl FeedbackCategory {
  pub const ALL: [FeedbackCategory; 11] = [
    FeedbackCategory::SyntaxError,
    FeedbackCategory::RuntimeError,
    FeedbackCategory::TimeLimitError,
    FeedbackCategory::MemoryLimitError,
    FeedbackCategory::StackExceededError,
    FeedbackCategory::ServerError,
    FeedbackCategory::KnownBugFailure,
    FeedbackCategory::SuiteLevelFailure,
    FeedbackCategory::IncorrectOutputFailure,
    FeedbackCategory::PerformanceTestFailure,
    FeedbackCategory::Successful,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      FeedbackCategory::SyntaxError => "SYNTAX_ERROR",
      FeedbackCategory::RuntimeError => "RUNTIME_ERROR",
      FeedbackCategory::TimeLimitError => "TIME_LIMIT_ERROR",
      FeedbackCategory::MemoryLimitError => "MEMORY_LIMIT_ERROR",
      FeedbackCategory::StackExceededError => "STACK_EXCEEDED_ERROR",
      FeedbackCategory::ServerError => "SERVER_ERROR",
      FeedbackCategory::KnownBugFailure => "KNOWN_BUG_FAILURE",
      FeedbackCategory::SuiteLevelFailure => "SUITE_LEVEL_FAILURE",
      FeedbackCategory::IncorrectOutputFailure => "INCORRECT_OUTPUT_FAILURE",
      FeedbackCategory::PerformanceTestFailure => "PERFORMANCE_TEST_FAILURE",
      FeedbackCategory::Successful => "SUCCESSFUL",
    }
  }
}

impl fmt::Display for FeedbackCategory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for FeedbackCategory {
  type Err = TieError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    FeedbackCategory::ALL
      .into_iter()
      .find(|c| c.as_str() == s)
      .ok_or_else(|| TieError::InvalidFeedbackCategory(s.to_string()))
  }
}

/// How much of a failing test case has been revealed, least to most.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CorrectnessState {
  InputDisplayed,
  ExpectedOutputDisplayed,
  ObservedOutputDisplayed,
  NoMoreFeedback,
}

pub const CORRECTNESS_STATES: [CorrectnessState; 4] = [
  CorrectnessState::InputDisplayed,
  CorrectnessState::ExpectedOutputDisplayed,
  CorrectnessState::ObservedOutputDisplayed,
  CorrectnessState::NoMoreFeedback,
];

impl CorrectnessState {
  pub fn as_str(&self) -> &'static str {
    match self {
      CorrectnessState::InputDisplayed => "INPUT_DISPLAYED",
      CorrectnessState::ExpectedOutputDisplayed => "EXPECTED_OUTPUT_DISPLAYED",
      CorrectnessState::ObservedOutputDisplayed => "OBSERVED_OUTPUT_DISPLAYED",
      CorrectnessState::NoMoreFeedback => "NO_MORE_FEEDBACK",
    }
  }

  /// Position in `CORRECTNESS_STATES`.
  pub fn index(&self) -> usize {
    *self as usize
  }

  /// State at `index`, clamped to the last one.
  pub fn at_clamped(index: usize) -> Self {
    CORRECTNESS_STATES[index.min(CORRECTNESS_STATES.len() - 1)]
  }

  fn phrases(&self) -> &'static [&'static str] {
    match self {
      CorrectnessState::InputDisplayed => INPUT_TO_TRY_TEXT,
      CorrectnessState::ExpectedOutputDisplayed => EXPECTED_OUTPUT_TEXT,
      CorrectnessState::ObservedOutputDisplayed | CorrectnessState::NoMoreFeedback => OUTPUT_ENABLED_TEXT,
    }
  }
}

impl FromStr for CorrectnessState {
  type Err = TieError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    CORRECTNESS_STATES
      .into_iter()
      .find(|c| c.as_str() == s)
      .ok_or_else(|| TieError::InvalidCorrectnessState(s.to_string()))
  }
}

const INPUT_TO_TRY_TEXT: &[&str] = &[
  "Would your code work for the following input?",
  "How about the following input? Would your code still work?",
  "What would happen if you run your code with this input?",
  "Consider the input below. How would your code handle it?",
  "Have you considered input such as the following?",
];

const EXPECTED_OUTPUT_TEXT: &[&str] = &[
  "Below is the output your code should produce for the given input. Can you find the bug?",
  "Consider the input/output pair below. Can you find the bug?",
  "Here is the input/output pair. Where could the bug be?",
  "Your code should produce the output shown below. Can you update your code to produce the same output?",
  "It looks like there is still a bug. Can you modify your code so that it produces the output shown below?",
];

const OUTPUT_ENABLED_TEXT: &[&str] = &[
  "If you are really stuck, you can display the output of your code.",
  "If you are stuck and need help, you can display the output of your code.",
  "If you can't seem to get unstuck, you can display the output of your code.",
  "If you feel stumped, you can display the output of your code.",
  "If you can't find the bug, you can display the output of your code.",
];

/// Which kind of specific (hand-written) test produced a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpecificTestCategory {
  KnownBug,
  SuiteLevel,
}

/// What went wrong (or right) with one submission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum FeedbackDetails {
  SyntaxError {
    language: String,
    error_string: String,
    error_line_number: Option<u32>,
    language_unfamiliarity_feedback_needed: bool,
  },
  RuntimeError {
    language: String,
    error_string: String,
    error_line_number: Option<u32>,
    error_input: Value,
    language_unfamiliarity_feedback_needed: bool,
  },
  TimeLimitError,
  MemoryLimitError,
  StackExceededError,
  ServerError,
  KnownBugFailure {
    task_index: usize,
    test_suite_id: String,
    test_case_index: usize,
    specific_test_index: usize,
    message_index: usize,
    message: String,
  },
  SuiteLevelFailure {
    task_index: usize,
    test_suite_id: String,
    test_case_index: usize,
    specific_test_index: usize,
    message_index: usize,
    message: String,
  },
  IncorrectOutputFailure {
    task_index: usize,
    test_suite_id: String,
    test_case_index: usize,
    test_case: TestCase,
    observed_output: Value,
    correctness_state: CorrectnessState,
    /// Set once every message of a buggy/suite-level test has been shown.
    specific_test: Option<(SpecificTestCategory, usize)>,
  },
  PerformanceTestFailure {
    expected_performance: String,
  },
  Successful,
}

impl FeedbackDetails {
  pub fn category(&self) -> FeedbackCategory {
    match self {
      FeedbackDetails::SyntaxError { .. } => FeedbackCategory::SyntaxError,
      FeedbackDetails::RuntimeError { .. } => FeedbackCategory::RuntimeError,
      FeedbackDetails::TimeLimitError => FeedbackCategory::TimeLimitError,
      FeedbackDetails::MemoryLimitError => FeedbackCategory::MemoryLimitError,
      FeedbackDetails::StackExceededError => FeedbackCategory::StackExceededError,
      FeedbackDetails::ServerError => FeedbackCategory::ServerError,
      FeedbackDetails::KnownBugFailure { .. } => FeedbackCategory::KnownBugFailure,
      FeedbackDetails::SuiteLevelFailure { .. } => FeedbackCategory::SuiteLevelFailure,
      FeedbackDetails::IncorrectOutputFailure { .. } => FeedbackCategory::IncorrectOutputFailure,
      FeedbackDetails::PerformanceTestFailure { .. } => FeedbackCategory::PerformanceTestFailure,
      FeedbackDetails::Successful => FeedbackCategory::Successful,
    }
  }

  /// True for failures tied to a specific task/suite/test case.
  pub fn has_output_related_failure(&self) -> bool {
    matches!(
      self,
      FeedbackDetails::KnownBugFailure { .. }
        | FeedbackDetails::SuiteLevelFailure { .. }
        | FeedbackDetails::IncorrectOutputFailure { .. }
    )
  }

  fn wrong(&self, accessor: &'static str) -> TieError {
    TieError::WrongCategory { accessor, category: self.category().as_str() }
  }

  pub fn task_index(&self) -> TieResult<usize> {
    match self {
      FeedbackDetails::KnownBugFailure { task_index, .. }
      | FeedbackDetails::SuiteLevelFailure { task_index, .. }
      | FeedbackDetails::IncorrectOutputFailure { task_index, .. } => Ok(*task_index),
      _ => Err(self.wrong("task_index")),
    }
  }

  pub fn test_suite_id(&self) -> TieResult<&str> {
    match self {
      FeedbackDetails::KnownBugFailure { test_suite_id, .. }
      | FeedbackDetails::SuiteLevelFailure { test_suite_id, .. }
      | FeedbackDetails::IncorrectOutputFailure { test_suite_id, .. } => Ok(test_suite_id),
      _ => Err(self.wrong("test_suite_id")),
    }
  }

  pub fn test_case_index(&self) -> TieResult<usize> {
    match self {
      FeedbackDetails::KnownBugFailure { test_case_index, .. }
      | FeedbackDetails::SuiteLevelFailure { test_case_index, .. }
      | FeedbackDetails::IncorrectOutputFailure { test_case_index, .. } => Ok(*test_case_index),
      _ => Err(self.wrong("test_case_index")),
    }
  }

  pub fn error_string(&self) -> TieResult<&str> {
    match self {
      FeedbackDetails::SyntaxError { error_string, .. }
      | FeedbackDetails::RuntimeError { error_string, .. } => Ok(error_string),
      _ => Err(self.wrong("error_string")),
    }
  }

  pub fn error_line_number(&self) -> TieResult<Option<u32>> {
    match self {
      FeedbackDetails::SyntaxError { error_line_number, .. }
      | FeedbackDetails::RuntimeError { error_line_number, .. } => Ok(*error_line_number),
      _ => Err(self.wrong("error_line_number")),
    }
  }

  pub fn error_input(&self) -> TieResult<&Value> {
    match self {
      FeedbackDetails::RuntimeError { error_input, .. } => Ok(error_input),
      _ => Err(self.wrong("error_input")),
    }
  }

  pub fn language(&self) -> TieResult<&str> {
    match self {
      FeedbackDetails::SyntaxError { language, .. }
      | FeedbackDetails::RuntimeError { language, .. } => Ok(language),
      _ => Err(self.wrong("language")),
    }
  }

  pub fn is_language_unfamiliarity_feedback_needed(&self) -> TieResult<bool> {
    match self {
      FeedbackDetails::SyntaxError { language_unfamiliarity_feedback_needed, .. }
      | FeedbackDetails::RuntimeError { language_unfamiliarity_feedback_needed, .. } => {
        Ok(*language_unfamiliarity_feedback_needed)
      }
      _ => Err(self.wrong("language_unfamiliarity_feedback_needed")),
    }
  }

  pub fn correctness_state(&self) -> TieResult<CorrectnessState> {
    match self {
      FeedbackDetails::IncorrectOutputFailure { correctness_state, .. } => Ok(*correctness_state),
      _ => Err(self.wrong("correctness_state")),
    }
  }

  /// Category/index of the specific test this failure is attributed to.
  pub fn specific_test(&self) -> TieResult<Option<(SpecificTestCategory, usize)>> {
    match self {
      FeedbackDetails::KnownBugFailure { specific_test_index, .. } => {
        Ok(Some((SpecificTestCategory::KnownBug, *specific_test_index)))
      }
      FeedbackDetails::SuiteLevelFailure { specific_test_index, .. } => {
        Ok(Some((SpecificTestCategory::SuiteLevel, *specific_test_index)))
      }
      FeedbackDetails::IncorrectOutputFailure { specific_test, .. } => Ok(*specific_test),
      _ => Err(self.wrong("specific_test")),
    }
  }

  pub fn specific_test_message(&self) -> TieResult<&str> {
    match self {
      FeedbackDetails::KnownBugFailure { message, .. }
      | FeedbackDetails::SuiteLevelFailure { message, .. } => Ok(message),
      _ => Err(self.wrong("specific_test_message")),
    }
  }

  pub fn message_index(&self) -> TieResult<usize> {
    match self {
      FeedbackDetails::KnownBugFailure { message_index, .. }
      | FeedbackDetails::SuiteLevelFailure { message_index, .. } => Ok(*message_index),
      _ => Err(self.wrong("message_index")),
    }
  }

  pub fn expected_performance(&self) -> TieResult<&str> {
    match self {
      FeedbackDetails::PerformanceTestFailure { expected_performance } => Ok(expected_performance),
      _ => Err(self.wrong("expected_performance")),
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParagraphKind {
  Text,
  Code,
  Error,
  Output,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackParagraph {
  #[serde(rename = "type")]
  pub kind: ParagraphKind,
  pub content: String,
}

impl FeedbackParagraph {
  pub fn text(content: impl Into<String>) -> Self {
    Self { kind: ParagraphKind::Text, content: content.into() }
  }

  pub fn code(content: impl Into<String>) -> Self {
    Self { kind: ParagraphKind::Code, content: content.into() }
  }

  pub fn error(content: impl Into<String>) -> Self {
    Self { kind: ParagraphKind::Error, content: content.into() }
  }

  pub fn output(content: impl Into<String>) -> Self {
    Self { kind: ParagraphKind::Output, content: content.into() }
  }
}

/// Rendered feedback for one submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
  pub category: FeedbackCategory,
  pub paragraphs: Vec<FeedbackParagraph>,
  #[serde(default)]
  pub error_line_number: Option<u32>,
}

impl Feedback {
  pub fn new(category: FeedbackCategory) -> Self {
    Self { category, paragraphs: vec![], error_line_number: None }
  }

  pub fn is_answer_correct(&self) -> bool {
    self.category == FeedbackCategory::Successful
  }

  pub fn append_text_paragraph(&mut self, content: impl Into<String>) {
    self.paragraphs.push(FeedbackParagraph::text(content));
  }

  pub fn append_code_paragraph(&mut self, content: impl Into<String>) {
    self.paragraphs.push(FeedbackParagraph::code(content));
  }

  pub fn append_error_paragraph(&mut self, content: impl Into<String>) {
    self.paragraphs.push(FeedbackParagraph::error(content));
  }

  pub fn append_output_paragraph(&mut self, content: impl Into<String>) {
    self.paragraphs.push(FeedbackParagraph::output(content));
  }

  pub fn append_paragraphs(&mut self, paragraphs: impl IntoIterator<Item = FeedbackParagraph>) {
    self.paragraphs.extend(paragraphs);
  }
}

pub fn unfamiliar_language_feedback(language: &str) -> String {
  if language == LANGUAGE_PYTHON {
    format!(
      "Seems like you're having some trouble with Python. Why don't you take a look at the page linked through the '{}' button at the bottom of the screen?",
      PYTHON_PRIMER_BUTTON_NAME
    )
  } else {
    String::new()
  }
}

fn regex_cell(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
  cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn capture(cell: &'static OnceLock<Option<Regex>>, pattern: &str, text: &str, group: usize) -> Option<String> {
  regex_cell(cell, pattern)?
    .captures(text)?
    .get(group)
    .map(|m| m.as_str().to_string())
}

/// Plain-language explanation for common Python runtime errors.
pub fn friendly_runtime_feedback(error_string: &str) -> Option<String> {
  static NAME_ERROR: OnceLock<Option<Regex>> = OnceLock::new();
  static ATTRIBUTE_ERROR: OnceLock<Option<Regex>> = OnceLock::new();
  static KEY_ERROR: OnceLock<Option<Regex>> = OnceLock::new();

  if error_string.starts_with("IndentationError: ") {
    return Some(
      "It looks like your code has some inconsistencies with indentation. Double check that you indent after every statement that ends with a \":\" and un-indent when necessary.".into(),
    );
  }
  if error_string.starts_with("TypeError: 'str' does not support item assignment") {
    return Some(
      "Unfortunately Python doesn't support directly assigning characters in a string. If you need to do so, try slicing the string and adding new characters instead of assigning them. If you need a refresher on slicing, check out the primer.".into(),
    );
  }
  if error_string.starts_with("TypeError: ")
    && error_string.contains("cannot concatenate 'str' and")
    && error_string.contains("objects")
  {
    return Some(
      "Did you remember to explicitly convert all objects to strings when necessary (like when you're concatenating a string)? Make sure everything that isn't a string gets converted using the str() method or by using a formatted string.".into(),
    );
  }
  if error_string.starts_with("NameError: ") {
    let name = capture(&NAME_ERROR, r"NameError:\sname\s'(\w+)'\sis\snot\sdefined", error_string, 1)?;
    return Some(format!(
      "It looks like {name} isn't a declared variable. Did you make sure to spell it correctly? And is it correctly initialized?"
    ));
  }
  if error_string.starts_with("AttributeError: ") {
    let re = regex_cell(&ATTRIBUTE_ERROR, r"AttributeError:\s'(\w+)'\sobject\shas\sno\sattribute\s'(.+)'")?;
    let caps = re.captures(error_string)?;
    return Some(format!(
      "{} doesn't have a property or method named {}. Double check to make sure everything is spelled correctly.",
      &caps[1], &caps[2]
    ));
  }
  if error_string.starts_with("IndexError: list index out of range") {
    return Some(
      "It looks like you're trying to access an index that is out of the bounds for the list. Double check that your loops and assignments don't try to retrieve from indexes below 0 or above the length of the string.".into(),
    );
  }
  if error_string.starts_with("KeyError: ") {
    let key = capture(&KEY_ERROR, r"KeyError:\s(\S+)", error_string, 1)?;
    return Some(format!(
      "The key {key} is not in the dictionary you're trying to retrieve from. Double check to make sure everything is spelled correctly and that you haven't forgotten to add any key-value pairs."
    ));
  }
  None
}

/// Rewrites a trailing `line N` (preprocessed numbering) to the learner's own
/// numbering; lines that belong to harness code become "a line in the test code".
fn remap_error_line(error_string: &str, raw_code_line_indexes: &[Option<usize>]) -> String {
  static TRAILING_LINE: OnceLock<Option<Regex>> = OnceLock::new();
  let Some(re) = regex_cell(&TRAILING_LINE, r"line ([0-9]+)$") else {
    return error_string.to_string();
  };
  re.replace(error_string, |caps: &regex::Captures| {
    let raw_index = caps[1]
      .parse::<usize>()
      .ok()
      .and_then(|n| n.checked_sub(1))
      .and_then(|idx| raw_code_line_indexes.get(idx).copied().flatten());
    match raw_index {
      Some(raw) => format!("line {}", raw + 1),
      None => {
        error!(target: "feedback", line = &caps[1], "Runtime error inside preprocessed harness code");
        "a line in the test code".to_string()
      }
    }
  })
  .into_owned()
}

/// Renders `FeedbackDetails` into paragraphs. Keeps one pool of unused intro
/// phrasings per correctness state so the same phrasing is not repeated
/// until every alternative has been used.
#[derive(Debug)]
pub struct FeedbackGenerator {
  timeout_seconds: u64,
  available_phrase_indexes: HashMap<CorrectnessState, Vec<usize>>,
}

impl Default for FeedbackGenerator {
  fn default() -> Self {
    Self::new(DEFAULT_CODE_EXECUTION_TIMEOUT_SECONDS)
  }
}

impl FeedbackGenerator {
  pub fn new(timeout_seconds: u64) -> Self {
    Self { timeout_seconds, available_phrase_indexes: HashMap::new() }
  }

  fn correctness_phrase(&mut self, state: CorrectnessState) -> &'static str {
    let phrases = state.phrases();
    let pool = self.available_phrase_indexes.entry(state).or_default();
    if pool.is_empty() {
      pool.extend(0..phrases.len());
    }
    let pick = rand::thread_rng().gen_range(0..pool.len());
    phrases[pool.swap_remove(pick)]
  }

  #[instrument(level = "debug", skip_all, fields(category = %details.category()))]
  pub fn generate(&mut self, details: &FeedbackDetails, raw_code_line_indexes: &[Option<usize>]) -> TieResult<Feedback> {
    let feedback = match details {
      FeedbackDetails::SyntaxError { .. } => self.syntax_error_feedback(details)?,
      FeedbackDetails::RuntimeError { .. } => self.runtime_error_feedback(details, raw_code_line_indexes)?,
      FeedbackDetails::TimeLimitError => self.time_limit_error_feedback(),
      FeedbackDetails::MemoryLimitError => single(
        FeedbackCategory::MemoryLimitError,
        "Your program used too much memory during execution. Check your code and try to be more efficient with your space usage.",
      ),
      FeedbackDetails::StackExceededError => single(
        FeedbackCategory::StackExceededError,
        "Your code appears to be hitting an infinite recursive loop. Check to make sure that your recursive calls terminate.",
      ),
      FeedbackDetails::ServerError => single(
        FeedbackCategory::ServerError,
        "A server error has occurred. We are looking into it and will fix it as quickly as possible. We apologize for the inconvenience.",
      ),
      FeedbackDetails::KnownBugFailure { message, .. } => single(FeedbackCategory::KnownBugFailure, message),
      FeedbackDetails::SuiteLevelFailure { message, .. } => single(FeedbackCategory::SuiteLevelFailure, message),
      FeedbackDetails::IncorrectOutputFailure { .. } => self.incorrect_output_feedback(details)?,
      FeedbackDetails::PerformanceTestFailure { expected_performance } => single(
        FeedbackCategory::PerformanceTestFailure,
        &fill_template(
          "Your code is running more slowly than expected. Can you reconfigure it such that it runs in {expected} time?",
          &[("expected", expected_performance)],
        ),
      ),
      FeedbackDetails::Successful => single(
        FeedbackCategory::Successful,
        "You've completed all the tasks for this question! Click the \"Next\" button to move on to the next question.",
      ),
    };
    debug!(target: "feedback", paragraphs = feedback.paragraphs.len(), "Feedback rendered");
    Ok(feedback)
  }

  fn time_limit_error_feedback(&self) -> Feedback {
    let seconds = self.timeout_seconds.to_string();
    single(
      FeedbackCategory::TimeLimitError,
      &fill_template(
        "Your program's exceeded the time limit ({seconds} seconds) we've set. Can you try to make it run more efficiently?",
        &[("seconds", &seconds)],
      ),
    )
  }

  fn syntax_error_feedback(&self, details: &FeedbackDetails) -> TieResult<Feedback> {
    let error_string = details.error_string()?;
    let line = details.error_line_number()?;
    let mut feedback = Feedback::new(FeedbackCategory::SyntaxError);
    feedback.error_line_number = line;
    match line {
      Some(n) => feedback.append_text_paragraph(format!("Error detected on or near line {n}:")),
      None => feedback.append_text_paragraph("Error detected:"),
    }
    feedback.append_text_paragraph(format!("<code>{error_string}</code>"));
    if details.is_language_unfamiliarity_feedback_needed()? {
      feedback.append_text_paragraph(unfamiliar_language_feedback(details.language()?));
    }
    Ok(feedback)
  }

  fn runtime_error_feedback(&self, details: &FeedbackDetails, raw_code_line_indexes: &[Option<usize>]) -> TieResult<Feedback> {
    let line = details.error_line_number()?;
    if let Some(n) = line {
      let index = i64::from(n) - 1;
      if index < 0 || index >= raw_code_line_indexes.len() as i64 {
        return Err(TieError::LineOutOfRange(index));
      }
    }

    let error_string = remap_error_line(details.error_string()?, raw_code_line_indexes);
    let mut feedback = Feedback::new(FeedbackCategory::RuntimeError);
    feedback.error_line_number = line
      .and_then(|n| raw_code_line_indexes.get(n as usize - 1).copied().flatten())
      .map(|raw| raw as u32 + 1);

    match friendly_runtime_feedback(&error_string) {
      Some(text) => feedback.append_text_paragraph(text),
      None => {
        feedback.append_text_paragraph(format!(
          "Looks like your code had a runtime error when evaluating the input {}.",
          to_python_repr(details.error_input()?)
        ));
        feedback.append_error_paragraph(error_string);
      }
    }
    if details.is_language_unfamiliarity_feedback_needed()? {
      feedback.append_text_paragraph(unfamiliar_language_feedback(details.language()?));
    }
    Ok(feedback)
  }

  fn incorrect_output_feedback(&mut self, details: &FeedbackDetails) -> TieResult<Feedback> {
    let FeedbackDetails::IncorrectOutputFailure { test_case, observed_output, correctness_state, .. } = details else {
      return Err(details.wrong("test_case"));
    };
    let input = to_python_repr(&test_case.input);
    let expected = to_python_repr(test_case.any_allowed_output().unwrap_or(&Value::Null));

    let mut feedback = Feedback::new(FeedbackCategory::IncorrectOutputFailure);
    feedback.append_text_paragraph(self.correctness_phrase(*correctness_state));
    match correctness_state {
      CorrectnessState::InputDisplayed => {
        feedback.append_code_paragraph(format!("Input: {input}"));
      }
      CorrectnessState::ExpectedOutputDisplayed => {
        feedback.append_code_paragraph(format!("Input: {input}\nExpected Output: {expected}"));
      }
      CorrectnessState::ObservedOutputDisplayed | CorrectnessState::NoMoreFeedback => {
        feedback.append_output_paragraph(format!(
          "Input: {input}\nExpected Output: {expected}\nActual Output: {}",
          to_python_repr(observed_output)
        ));
      }
    }
    Ok(feedback)
  }
}

fn single(category: FeedbackCategory, text: &str) -> Feedback {
  let mut feedback = Feedback::new(category);
  feedback.append_text_paragraph(text);
  feedback
}
