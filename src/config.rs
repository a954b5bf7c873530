//! Loading application configuration (feedback tuning, runner, question bank) from TOML.
//!
//! See `AppConfig` for the expected schema. Every section is optional.

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::Question;
use crate::feedback::DEFAULT_CODE_EXECUTION_TIMEOUT_SECONDS;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub feedback: FeedbackSettings,
  #[serde(default)]
  pub runner: RunnerSettings,
  #[serde(default)]
  pub questions: Vec<Question>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FeedbackSettings {
  /// Consecutive syntax/identical runtime errors before suggesting the primer.
  pub unfamiliarity_threshold: u32,
  /// Only used in the time-limit message; the runner enforces the limit.
  pub code_execution_timeout_seconds: u64,
  /// When true, tips flagged `requirePrintToBeDisabled` are skipped.
  pub print_supported: bool,
}

impl Default for FeedbackSettings {
  fn default() -> Self {
    Self {
      unfamiliarity_threshold: 5,
      code_execution_timeout_seconds: DEFAULT_CODE_EXECUTION_TIMEOUT_SECONDS,
      print_supported: false,
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
  /// Base URL of the remote code runner (e.g. "http://localhost:8080").
  /// Without one, only client-reported results can be evaluated.
  pub base_url: Option<String>,
  pub request_timeout_seconds: u64,
}

impl Default for RunnerSettings {
  fn default() -> Self {
    Self { base_url: None, request_timeout_seconds: 20 }
  }
}

impl AppConfig {
  /// Applies environment overrides on top of the file (or defaults).
  pub fn with_env_overrides(mut self) -> Self {
    if let Ok(url) = std::env::var("TIE_RUNNER_URL") {
      if !url.trim().is_empty() {
        self.runner.base_url = Some(url);
      }
    }
    self
  }
}

pub fn parse_app_config(s: &str) -> Result<AppConfig, toml::de::Error> {
  toml::from_str::<AppConfig>(s)
}

/// Attempt to load `AppConfig` from TIE_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_app_config_from_env() -> Option<AppConfig> {
  let path = std::env::var("TIE_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_app_config(&s) {
      Ok(cfg) => {
        info!(target: "tie_backend", %path, questions = cfg.questions.len(), "Loaded app config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "tie_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "tie_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
