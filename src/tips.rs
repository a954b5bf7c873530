//! Unprompted tips: nudges shown without the learner asking for them.
//!
//! Each tip has a key `{source}-{language}-{index}` where source is
//! `task{taskId}` or `system`. A tip is shown only after its trigger has
//! matched on two consecutive checks, and then never again until `reset`.

use std::collections::HashMap;

use tracing::{debug, info, instrument, warn};

use crate::domain::{Task, Tip, TipSpec, ALL_SUPPORTED_LANGUAGES, LANGUAGE_PYTHON};
use crate::feedback::FeedbackParagraph;

const TIP_SOURCE_TASK: &str = "task";
const TIP_SOURCE_SYSTEM: &str = "system";

pub const PRINT_TIP_MESSAGE: &str = "We noticed that you're using a print statement within your code. Since you will not be able to use such statements in a technical interview, TIE does not support this feature. We encourage you to instead step through your code by hand.";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TipState {
  #[default]
  NotSeen,
  Tentative,
  Displayed,
}

/// Tips that apply to every question in `language`.
pub fn system_tips(language: &str) -> Vec<Tip> {
  let specs = match language {
    LANGUAGE_PYTHON => vec![TipSpec {
      regex_string: r"\bprint\b".into(),
      message: PRINT_TIP_MESSAGE.into(),
      require_print_to_be_disabled: true,
    }],
    _ => vec![],
  };
  specs
    .into_iter()
    .filter_map(|spec| match Tip::try_from(spec) {
      Ok(tip) => Some(tip),
      Err(e) => {
        warn!(target: "tips", %language, error = %e, "Skipping invalid system tip");
        None
      }
    })
    .collect()
}

/// Lines without any string literal. Tips never fire on text inside strings;
/// lines that contain a quote are skipped entirely.
pub fn non_string_lines(code: &str) -> Vec<&str> {
  code
    .split('\n')
    .filter(|line| !line.contains('"') && !line.contains('\''))
    .collect()
}

fn tip_list_key(source: &str, language: &str) -> String {
  format!("{source}-{language}")
}

#[derive(Debug, Default)]
pub struct UnpromptedFeedbackManager {
  print_supported: bool,
  tip_lists: HashMap<String, Vec<Tip>>,
  states: HashMap<String, TipState>,
}

impl UnpromptedFeedbackManager {
  pub fn new(print_supported: bool) -> Self {
    Self { print_supported, ..Self::default() }
  }

  /// Forgets every tip state and loads the tip lists for a new question.
  #[instrument(level = "debug", skip_all, fields(tasks = tasks.len()))]
  pub fn reset(&mut self, tasks: &[Task]) {
    self.states.clear();
    self.tip_lists.clear();
    for language in ALL_SUPPORTED_LANGUAGES {
      self.tip_lists.insert(tip_list_key(TIP_SOURCE_SYSTEM, language), system_tips(language));
      for task in tasks {
        let source = format!("{TIP_SOURCE_TASK}{}", task.id);
        self.tip_lists.insert(tip_list_key(&source, language), task.tips(language).to_vec());
      }
    }
  }

  pub fn state_of(&self, tip_key: &str) -> TipState {
    self.states.get(tip_key).copied().unwrap_or_default()
  }

  /// Advances every tip's state for this code and returns the paragraph of
  /// at most one newly displayed tip. Task tips take precedence over system tips.
  #[instrument(level = "debug", skip(self, code), fields(code_len = code.len()))]
  pub fn run_tips_check(&mut self, language: &str, code: &str, task_id: &str) -> Option<Vec<FeedbackParagraph>> {
    let code_lines = non_string_lines(code);
    let list_keys = [
      tip_list_key(&format!("{TIP_SOURCE_TASK}{task_id}"), language),
      tip_list_key(TIP_SOURCE_SYSTEM, language),
    ];

    let mut paragraphs: Option<Vec<FeedbackParagraph>> = None;
    for list_key in &list_keys {
      let Some(tips) = self.tip_lists.get(list_key) else {
        continue;
      };
      for (index, tip) in tips.iter().enumerate() {
        if tip.requires_print_to_be_disabled() && self.print_supported {
          continue;
        }
        let tip_key = format!("{list_key}-{index}");
        let state = self.states.get(&tip_key).copied().unwrap_or_default();
        if tip.is_triggered_by(&code_lines) {
          match state {
            TipState::NotSeen => {
              debug!(target: "tips", %tip_key, "Tip tentatively triggered");
              self.states.insert(tip_key, TipState::Tentative);
            }
            TipState::Tentative if paragraphs.is_none() => {
              info!(target: "tips", %tip_key, "Tip displayed");
              self.states.insert(tip_key, TipState::Displayed);
              paragraphs = Some(vec![FeedbackParagraph::text(tip.message())]);
            }
            _ => {}
          }
        } else if state == TipState::Tentative {
          self.states.insert(tip_key, TipState::NotSeen);
        }
      }
    }
    paragraphs
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn task_with_tips(id: &str, tips: serde_json::Value) -> Task {
    serde_json::from_value(json!({
      "id": id,
      "mainFunctionName": "f",
      "languageSpecificTips": { "python": tips },
    }))
    .expect("task")
  }

  fn manager(tasks: &[Task]) -> UnpromptedFeedbackManager {
    let mut m = UnpromptedFeedbackManager::new(false);
    m.reset(tasks);
    m
  }

  const PRINT_CODE: &str = "def f(x):\n    print(x)\n    return x";
  const CLEAN_CODE: &str = "def f(x):\n    return x";

  #[test]
  fn tip_shows_on_second_consecutive_trigger_only() {
    let mut m = manager(&[]);
    assert_eq!(m.run_tips_check("python", PRINT_CODE, "t1"), None);
    assert_eq!(m.state_of("system-python-0"), TipState::Tentative);
    assert_eq!(
      m.run_tips_check("python", PRINT_CODE, "t1"),
      Some(vec![FeedbackParagraph::text(PRINT_TIP_MESSAGE)])
    );
    assert_eq!(m.run_tips_check("python", PRINT_CODE, "t1"), None);
    assert_eq!(m.state_of("system-python-0"), TipState::Displayed);
  }

  #[test]
  fn non_consecutive_triggers_do_not_accumulate() {
    let mut m = manager(&[]);
    assert_eq!(m.run_tips_check("python", PRINT_CODE, "t1"), None);
    assert_eq!(m.run_tips_check("python", CLEAN_CODE, "t1"), None);
    assert_eq!(m.state_of("system-python-0"), TipState::NotSeen);
    assert_eq!(m.run_tips_check("python", PRINT_CODE, "t1"), None);
    assert!(m.run_tips_check("python", PRINT_CODE, "t1").is_some());
  }

  #[test]
  fn task_tips_win_and_only_one_is_shown_per_call() {
    let task = task_with_tips("t1", json!([
      { "regexString": r"\bprint\b", "message": "task print tip" },
      { "regexString": r"\breturn\b", "message": "return tip" },
    ]));
    let mut m = manager(&[task]);
    assert_eq!(m.run_tips_check("python", PRINT_CODE, "t1"), None);
    assert_eq!(
      m.run_tips_check("python", PRINT_CODE, "t1"),
      Some(vec![FeedbackParagraph::text("task print tip")])
    );
    assert_eq!(m.state_of("taskt1-python-1"), TipState::Tentative);
    assert_eq!(m.state_of("system-python-0"), TipState::Tentative);
    assert_eq!(
      m.run_tips_check("python", PRINT_CODE, "t1"),
      Some(vec![FeedbackParagraph::text("return tip")])
    );
    assert_eq!(
      m.run_tips_check("python", PRINT_CODE, "t1"),
      Some(vec![FeedbackParagraph::text(PRINT_TIP_MESSAGE)])
    );
  }

  #[test]
  fn string_lines_and_supported_print_are_ignored() {
    let mut m = manager(&[]);
    let quoted = "def f(x):\n    print('x')\n    return x";
    assert_eq!(m.run_tips_check("python", quoted, "t1"), None);
    assert_eq!(m.run_tips_check("python", quoted, "t1"), None);

    let mut printing = UnpromptedFeedbackManager::new(true);
    printing.reset(&[]);
    assert_eq!(printing.run_tips_check("python", PRINT_CODE, "t1"), None);
    assert_eq!(printing.run_tips_check("python", PRINT_CODE, "t1"), None);
  }

  #[test]
  fn reset_forgets_displayed_tips() {
    let mut m = manager(&[]);
    m.run_tips_check("python", PRINT_CODE, "t1");
    assert!(m.run_tips_check("python", PRINT_CODE, "t1").is_some());
    m.reset(&[]);
    assert_eq!(m.state_of("system-python-0"), TipState::NotSeen);
    m.run_tips_check("python", PRINT_CODE, "t1");
    assert!(m.run_tips_check("python", PRINT_CODE, "t1").is_some());
  }
}
