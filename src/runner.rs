//! Code execution backends.
//!
//! `RemoteCodeRunner` talks to a sandboxed execution server over HTTP.
//! `ReportedCodeRunner` replays results that the learner's browser already
//! computed with an in-process interpreter.
//!
//! Neither backend ever fails a submission on transport problems: those turn
//! into a server-error `CodeEvalResult`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::buggy::BuggyRegistry;
use crate::config::RunnerSettings;
use crate::domain::Task;
use crate::error::TieResult;
use crate::eval_result::CodeEvalResult;
use crate::preprocess::{PreprocessedCode, SEPARATOR_LENGTH};
use crate::traceback::{ErrorTraceback, InterpreterFrame};
use crate::util::trunc_for_log;

const COMPILE_PATH: &str = "/ajax/compile_code";
const RUN_PATH: &str = "/ajax/run_code";
const MEMORY_ERROR_PREFIX: &str = "MemoryError";

#[async_trait]
pub trait CodeRunner: Send + Sync {
  /// Checks that the raw code compiles. Only the error traceback matters.
  async fn compile(&self, raw_code: &str, language: &str) -> TieResult<CodeEvalResult>;

  /// Runs the harness against every task's tests.
  async fn run_with_tests(
    &self,
    raw_code: &str,
    preprocessed: &PreprocessedCode,
    language: &str,
    tasks: &[Task],
  ) -> TieResult<CodeEvalResult>;

  /// True when error coordinates refer to lines of the generated harness.
  /// Runners that report raw-code lines return false.
  fn reports_harness_lines(&self) -> bool {
    true
  }
}

#[derive(Serialize)]
struct CodeRequest<'a> {
  code: &'a str,
  language: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct RunnerResponse {
  #[serde(default)]
  stdout: String,
  #[serde(default)]
  stderr: String,
  #[serde(default)]
  results: Option<RunnerResults>,
  #[serde(default)]
  most_recent_input: Option<Value>,
}

/// Values are `None` when the harness died before assigning them.
#[derive(Debug, Default, Deserialize)]
struct RunnerResults {
  #[serde(default)]
  correctness_test_results: Option<Vec<Vec<Vec<Value>>>>,
  #[serde(default)]
  buggy_output_test_results: Option<Vec<Vec<bool>>>,
  #[serde(default)]
  performance_test_results: Option<Vec<Vec<String>>>,
  #[serde(default)]
  most_recent_input: Option<Value>,
}

/// Splits runner stdout into one string per test case, using the harness
/// separator that is printed after every case.
pub fn standardize_server_output(stdout: &str, separator: &str) -> Vec<String> {
  if stdout.is_empty() {
    return vec![];
  }
  let Some(last) = stdout.rfind(separator) else {
    return vec![stdout.to_string()];
  };
  let end = (last + SEPARATOR_LENGTH).min(stdout.len());
  let cleaned = format!("{}\n", &stdout[..end]);
  cleaned.split(&format!("{separator}\n")).map(str::to_string).collect()
}

fn is_memory_error(traceback: &ErrorTraceback) -> bool {
  traceback.message().starts_with(MEMORY_ERROR_PREFIX)
}

#[derive(Clone)]
pub struct RemoteCodeRunner {
  pub client: reqwest::Client,
  pub base_url: String,
}

impl RemoteCodeRunner {
  /// Construct the runner if a base URL is configured; otherwise return None.
  pub fn from_settings(settings: &RunnerSettings) -> Option<Self> {
    let base_url = settings.base_url.clone()?.trim_end_matches('/').to_string();
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(settings.request_timeout_seconds))
      .build()
      .ok()?;
    Some(Self { client, base_url })
  }

  #[instrument(level = "info", skip(self, code), fields(code_len = code.len()))]
  async fn post_code(&self, path: &str, code: &str, language: &str) -> Result<RunnerResponse, String> {
    let url = format!("{}{}", self.base_url, path);
    let res = self.client.post(&url)
      .header(USER_AGENT, "tie-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .json(&CodeRequest { code, language })
      .send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      return Err(format!("Runner HTTP {}: {}", status, trunc_for_log(&body, 200)));
    }
    res.json::<RunnerResponse>().await.map_err(|e| e.to_string())
  }

  fn server_error_result(code: &str, raw_code: &str) -> CodeEvalResult {
    CodeEvalResult::from_error(code, raw_code, ErrorTraceback::from_server_error(), None)
  }
}

#[async_trait]
impl CodeRunner for RemoteCodeRunner {
  async fn compile(&self, raw_code: &str, language: &str) -> TieResult<CodeEvalResult> {
    match self.post_code(COMPILE_PATH, raw_code, language).await {
      Ok(response) => {
        let error_traceback = (!response.stderr.is_empty())
          .then(|| ErrorTraceback::from_python_error(&response.stderr));
        Ok(CodeEvalResult {
          preprocessed_code: raw_code.to_string(),
          raw_code: raw_code.to_string(),
          observed_stdouts: vec![response.stdout],
          memory_limit_exceeded: error_traceback.as_ref().is_some_and(is_memory_error),
          error_traceback,
          ..CodeEvalResult::default()
        })
      }
      Err(e) => {
        error!(target: "runner", error = %e, "Compile request failed; reporting server error");
        Ok(Self::server_error_result(raw_code, raw_code))
      }
    }
  }

  async fn run_with_tests(
    &self,
    raw_code: &str,
    preprocessed: &PreprocessedCode,
    language: &str,
    _tasks: &[Task],
  ) -> TieResult<CodeEvalResult> {
    let response = match self.post_code(RUN_PATH, &preprocessed.code, language).await {
      Ok(response) => response,
      Err(e) => {
        error!(target: "runner", error = %e, "Run request failed; reporting server error");
        return Ok(Self::server_error_result(&preprocessed.code, raw_code));
      }
    };

    if !response.stderr.is_empty() {
      let traceback = ErrorTraceback::from_python_error(&response.stderr);
      let error_input = response
        .most_recent_input
        .or_else(|| response.results.and_then(|r| r.most_recent_input));
      let mut result = CodeEvalResult::from_error(&preprocessed.code, raw_code, traceback, error_input);
      result.memory_limit_exceeded = result.error_traceback.as_ref().is_some_and(is_memory_error);
      info!(target: "runner", error = %trunc_for_log(&response.stderr, 200), "Run finished with an error");
      return Ok(result);
    }

    let Some(results) = response.results else {
      warn!(target: "runner", "Run response carried neither stderr nor results");
      return Ok(Self::server_error_result(&preprocessed.code, raw_code));
    };
    Ok(CodeEvalResult {
      preprocessed_code: preprocessed.code.clone(),
      raw_code: raw_code.to_string(),
      observed_stdouts: standardize_server_output(&response.stdout, &preprocessed.separator),
      observed_outputs: results.correctness_test_results.unwrap_or_default(),
      buggy_output_test_results: results.buggy_output_test_results.unwrap_or_default(),
      performance_test_results: results.performance_test_results.unwrap_or_default(),
      ..CodeEvalResult::default()
    })
  }
}

/// An error raised by the in-browser interpreter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedError {
  pub message: String,
  #[serde(default)]
  pub frames: Vec<InterpreterFrame>,
}

impl ReportedError {
  fn traceback(&self) -> ErrorTraceback {
    ErrorTraceback::from_interpreter_error(&self.message, &self.frames)
  }
}

/// Results computed client-side for one submission. Error frames carry
/// line numbers of the learner's raw code.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedRun {
  #[serde(default)]
  pub compile_error: Option<ReportedError>,
  #[serde(default)]
  pub runtime_error: Option<ReportedError>,
  #[serde(default)]
  pub error_input: Option<Value>,
  #[serde(default)]
  pub stdouts: Vec<String>,
  #[serde(default)]
  pub observed_outputs: Vec<Vec<Vec<Value>>>,
  /// Computed from `observed_outputs` when absent.
  #[serde(default)]
  pub buggy_output_test_results: Option<Vec<Vec<bool>>>,
  #[serde(default)]
  pub performance_test_results: Vec<Vec<String>>,
  #[serde(default)]
  pub memory_limit_exceeded: bool,
}

pub struct ReportedCodeRunner {
  run: ReportedRun,
  registry: Arc<BuggyRegistry>,
}

impl ReportedCodeRunner {
  pub fn new(run: ReportedRun, registry: Arc<BuggyRegistry>) -> Self {
    Self { run, registry }
  }
}

#[async_trait]
impl CodeRunner for ReportedCodeRunner {
  /// The browser runs the learner's code directly, so frames are raw-code lines.
  fn reports_harness_lines(&self) -> bool {
    false
  }

  async fn compile(&self, raw_code: &str, _language: &str) -> TieResult<CodeEvalResult> {
    Ok(match &self.run.compile_error {
      Some(err) => CodeEvalResult::from_error(raw_code, raw_code, err.traceback(), None),
      None => CodeEvalResult {
        preprocessed_code: raw_code.to_string(),
        raw_code: raw_code.to_string(),
        ..CodeEvalResult::default()
      },
    })
  }

  async fn run_with_tests(
    &self,
    raw_code: &str,
    preprocessed: &PreprocessedCode,
    _language: &str,
    tasks: &[Task],
  ) -> TieResult<CodeEvalResult> {
    if let Some(err) = &self.run.runtime_error {
      let mut result = CodeEvalResult::from_error(&preprocessed.code, raw_code, err.traceback(), self.run.error_input.clone());
      result.memory_limit_exceeded = self.run.memory_limit_exceeded;
      return Ok(result);
    }
    let buggy_output_test_results = match &self.run.buggy_output_test_results {
      Some(results) => results.clone(),
      None => self.registry.compute_results(tasks, &self.run.observed_outputs)?,
    };
    Ok(CodeEvalResult {
      preprocessed_code: preprocessed.code.clone(),
      raw_code: raw_code.to_string(),
      observed_stdouts: self.run.stdouts.clone(),
      observed_outputs: self.run.observed_outputs.clone(),
      buggy_output_test_results,
      performance_test_results: self.run.performance_test_results.clone(),
      memory_limit_exceeded: self.run.memory_limit_exceeded,
      ..CodeEvalResult::default()
    })
  }
}
