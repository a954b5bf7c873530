//! Normalizes raw interpreter error text into line/column addressed tracebacks.
//!
//! Sources handled:
//! - CPython stderr from the remote runner (`from_python_error`)
//! - in-browser interpreter errors that already carry frames (`from_interpreter_error`)
//! - transport failures talking to the runner (`from_server_error`)

use serde::{Deserialize, Serialize};

const LINE_DELIMITER_PYTHON: &str = ", line ";
const TIME_LIMIT_ERROR_PREFIX: &str = "TimeLimitError";
const RECURSION_DEPTH_MARKER: &str = "maximum recursion depth exceeded";
const RANGE_ERROR_MARKER: &str = "RangeError";
pub const SERVER_ERROR_MESSAGE: &str = "A server error occurred.";

/// 1-indexed location inside the submitted code. Either part may be unknown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracebackCoordinates {
  pub line: Option<u32>,
  pub column: Option<u32>,
}

impl TracebackCoordinates {
  pub fn new(line: Option<u32>, column: Option<u32>) -> Self {
    Self { line, column }
  }
}

/// One frame reported by an in-process interpreter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpreterFrame {
  pub lineno: u32,
  #[serde(default)]
  pub colno: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorTraceback {
  message: String,
  coordinates: Vec<TracebackCoordinates>,
}

impl ErrorTraceback {
  pub fn new(message: impl Into<String>, coordinates: Vec<TracebackCoordinates>) -> Self {
    Self { message: message.into(), coordinates }
  }

  /// Parses CPython stderr. The last line is the error; the innermost
  /// `File "...", line N` marker above the code excerpt gives the line, and a
  /// caret on the second-to-last line gives the column.
  pub fn from_python_error(stderr: &str) -> Self {
    let lines: Vec<&str> = stderr.trim().lines().collect();
    let message = lines.last().copied().unwrap_or_default().to_string();

    let mut line_number = None;
    if lines.len() >= 3 {
      for candidate in lines[..lines.len() - 2].iter().rev() {
        if let Some(pos) = candidate.find(LINE_DELIMITER_PYTHON) {
          line_number = leading_number(&candidate[pos + LINE_DELIMITER_PYTHON.len()..]);
          break;
        }
      }
    }

    let mut column_number = None;
    if lines.len() >= 2 {
      let caret_line = lines[lines.len() - 2];
      if caret_line.contains('^') {
        column_number = u32::try_from(caret_line.chars().count()).ok();
      }
    }

    Self::new(message, vec![TracebackCoordinates::new(line_number, column_number)])
  }

  /// Builds a traceback from an interpreter error whose display text ends in
  /// `" on line N"`; that suffix is dropped because frames carry the lines.
  pub fn from_interpreter_error(error_text: &str, frames: &[InterpreterFrame]) -> Self {
    let message = match error_text.find(" on line") {
      Some(idx) => &error_text[..idx],
      None => error_text,
    };
    let coordinates = frames
      .iter()
      .map(|f| TracebackCoordinates::new(Some(f.lineno), f.colno))
      .collect();
    Self::new(message.trim_end(), coordinates)
  }

  pub fn from_server_error() -> Self {
    Self::new(SERVER_ERROR_MESSAGE, vec![])
  }

  pub fn message(&self) -> &str {
    &self.message
  }

  pub fn coordinates(&self) -> &[TracebackCoordinates] {
    &self.coordinates
  }

  pub fn is_time_limit_error(&self) -> bool {
    self.message.starts_with(TIME_LIMIT_ERROR_PREFIX)
  }

  pub fn is_stack_exceeded_error(&self) -> bool {
    self.message.contains(RECURSION_DEPTH_MARKER) || self.message.contains(RANGE_ERROR_MARKER)
  }

  pub fn is_server_error(&self) -> bool {
    self.message.starts_with(SERVER_ERROR_MESSAGE)
  }

  /// Line of the primary (first) coordinate. Time-limit errors have none.
  pub fn error_line_number(&self) -> Option<u32> {
    if self.is_time_limit_error() {
      return None;
    }
    self.coordinates.first().and_then(|c| c.line)
  }

  /// The message plus `" on line N"`. Time-limit errors, and tracebacks
  /// where no line could be recovered, return the bare message.
  pub fn error_string(&self) -> String {
    match self.error_line_number() {
      Some(line) => format!("{} on line {}", self.message, line),
      None => self.message.clone(),
    }
  }
}

fn leading_number(s: &str) -> Option<u32> {
  let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
  digits.parse().ok()
}
