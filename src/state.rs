//! Application state: question bank, learner sessions, saved work and code runners.
//!
//! This module owns:
//!   - the question bank (built-in seeds plus configured questions)
//!   - learner sessions, one `LearnerSession` per session id
//!   - local storage of the latest code/feedback per (question, language)
//!   - the optional remote code runner and the buggy-function registry
//!
//! A session is locked for the whole submission pipeline, so submissions
//! within one session are processed strictly one at a time.

use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::buggy::BuggyRegistry;
use crate::config::{load_app_config_from_env, AppConfig, FeedbackSettings};
use crate::domain::Question;
use crate::error::{TieError, TieResult};
use crate::feedback::Feedback;
use crate::learner::LearnerSession;
use crate::logic::{process_submission, SubmissionResult};
use crate::runner::{CodeRunner, RemoteCodeRunner, ReportedCodeRunner, ReportedRun};
use crate::seeds::seed_questions;
use crate::storage::LocalStorage;

#[derive(Clone)]
pub struct AppState {
    pub questions: Arc<RwLock<HashMap<String, Question>>>,
    pub sessions: Arc<RwLock<HashMap<String, Arc<Mutex<LearnerSession>>>>>,
    pub storage: LocalStorage,
    pub runner: Option<Arc<dyn CodeRunner>>,
    pub registry: Arc<BuggyRegistry>,
    pub settings: FeedbackSettings,
}

impl AppState {
    /// Build state from env: load config (TIE_CONFIG_PATH), apply env overrides.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_app_config_from_env().unwrap_or_default().with_env_overrides();
        Self::from_config(cfg)
    }

    /// Build state from an explicit config: seed questions, configured bank, runner.
    #[instrument(level = "info", skip_all, fields(configured = cfg.questions.len()))]
    pub fn from_config(cfg: AppConfig) -> Self {
        let registry = BuggyRegistry::default();
        let mut bank = HashMap::<String, Question>::new();

        // Configured questions first so that seeds never overwrite them.
        let seeds = seed_questions().unwrap_or_else(|e| {
            error!(target: "tie_backend", error = %e, "Built-in seed questions failed to load");
            vec![]
        });
        for q in cfg.questions.into_iter().chain(seeds) {
            if bank.contains_key(&q.id) {
                continue;
            }
            match registry.resolve_question(&q) {
                Ok(()) => {
                    bank.insert(q.id.clone(), q);
                }
                Err(e) => {
                    error!(target: "tie_backend", id = %q.id, error = %e, "Skipping question with unresolved reference functions");
                }
            }
        }
        info!(target: "tie_backend", questions = bank.len(), "Question bank loaded");

        let runner = RemoteCodeRunner::from_settings(&cfg.runner).map(|r| {
            info!(target: "tie_backend", base_url = %r.base_url, "Remote code runner enabled.");
            Arc::new(r) as Arc<dyn CodeRunner>
        });
        if runner.is_none() {
            warn!(target: "tie_backend", "No runner URL (TIE_RUNNER_URL); only in-browser results can be evaluated.");
        }

        Self {
            questions: Arc::new(RwLock::new(bank)),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            storage: LocalStorage::in_memory(),
            runner,
            registry: Arc::new(registry),
            settings: cfg.feedback,
        }
    }

    /// All questions, ordered by id.
    pub async fn list_questions(&self) -> Vec<Question> {
        let mut out: Vec<Question> = self.questions.read().await.values().cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Read-only access to a question by id.
    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn get_question(&self, id: &str) -> TieResult<Question> {
        self.questions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| TieError::UnknownQuestion(id.to_string()))
    }

    /// Starts a fresh learner session on a question and returns its id.
    #[instrument(level = "info", skip(self), fields(%question_id))]
    pub async fn start_session(&self, question_id: &str) -> TieResult<String> {
        let question = self.get_question(question_id).await?;
        let session_id = Uuid::new_v4().to_string();
        let session = LearnerSession::new(&question, &self.settings);
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), Arc::new(Mutex::new(session)));
        info!(target: "tie_backend", %session_id, %question_id, "Learner session started");
        Ok(session_id)
    }

    /// Drops a session. Its lock is released once any in-flight submission finishes.
    #[instrument(level = "info", skip(self), fields(%session_id))]
    pub async fn end_session(&self, session_id: &str) -> TieResult<()> {
        self.sessions
            .write()
            .await
            .remove(session_id)
            .map(|_| info!(target: "tie_backend", %session_id, "Learner session ended"))
            .ok_or_else(|| TieError::UnknownSession(session_id.to_string()))
    }

    async fn get_session(&self, session_id: &str) -> TieResult<Arc<Mutex<LearnerSession>>> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| TieError::UnknownSession(session_id.to_string()))
    }

    /// Runs one submission through the pipeline and saves the code and feedback.
    /// In-browser results take precedence over the remote runner.
    #[instrument(level = "info", skip(self, code, reported), fields(code_len = code.len(), reported = reported.is_some()))]
    pub async fn submit(
        &self,
        session_id: &str,
        question_id: &str,
        language: &str,
        code: &str,
        reported: Option<ReportedRun>,
    ) -> TieResult<SubmissionResult> {
        let question = self.get_question(question_id).await?;
        let session = self.get_session(session_id).await?;

        let runner: Arc<dyn CodeRunner> = match (reported, &self.runner) {
            (Some(run), _) => Arc::new(ReportedCodeRunner::new(run, self.registry.clone())),
            (None, Some(remote)) => remote.clone(),
            (None, None) => return Err(TieError::RunnerUnavailable),
        };

        let result = {
            let mut session = session.lock().await;
            process_submission(&mut session, &question, language, code, runner.as_ref()).await?
        };

        self.storage.save_code(question_id, language, code).await;
        self.storage.save_feedback(question_id, language, &result.feedback).await?;
        Ok(result)
    }

    /// Latest saved code (or the starter code) and feedback for a question.
    pub async fn saved_work(&self, question_id: &str, language: &str) -> TieResult<(Option<String>, Option<Feedback>)> {
        let question = self.get_question(question_id).await?;
        let code = match self.storage.load_code(question_id, language).await {
            Some(code) => Some(code),
            None => question.starter_code(language).map(str::to_string),
        };
        let feedback = self.storage.load_feedback(question_id, language).await;
        Ok((code, feedback))
    }

    /// Forgets the saved code and feedback, so the starter code is served again.
    #[instrument(level = "info", skip(self), fields(%question_id, %language))]
    pub async fn clear_saved_work(&self, question_id: &str, language: &str) -> TieResult<(Option<String>, Option<Feedback>)> {
        self.get_question(question_id).await?;
        self.storage.clear(question_id, language).await;
        self.saved_work(question_id, language).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::{FeedbackCategory, FeedbackParagraph};
    use crate::runner::ReportedError;
    use crate::traceback::InterpreterFrame;
    use serde_json::json;

    fn state() -> AppState {
        AppState::from_config(AppConfig::default())
    }

    #[tokio::test]
    async fn seeds_are_loaded_and_configured_questions_win() {
        let mut cfg = AppConfig::default();
        cfg.questions.push(
            serde_json::from_value(json!({ "id": "reverseWords", "title": "Configured", "tasks": [] }))
                .expect("question"),
        );
        let state = AppState::from_config(cfg);
        let q = state.get_question("reverseWords").await.expect("question");
        assert_eq!(q.title, "Configured");
        assert!(state.runner.is_none());
    }

    #[tokio::test]
    async fn unknown_ids_are_errors() {
        let state = state();
        assert_eq!(
            state.start_session("nope").await,
            Err(TieError::UnknownQuestion("nope".into()))
        );
        assert_eq!(
            state.submit("missing", "reverseWords", "python", "x", None).await,
            Err(TieError::UnknownSession("missing".into()))
        );
    }

    #[tokio::test]
    async fn ended_sessions_are_removed() {
        let state = state();
        let first = state.start_session("reverseWords").await.expect("session");
        let second = state.start_session("reverseWords").await.expect("session");
        assert_eq!(state.sessions.read().await.len(), 2);

        state.end_session(&first).await.expect("end");
        assert_eq!(state.sessions.read().await.len(), 1);
        assert!(state.sessions.read().await.contains_key(&second));
        assert_eq!(state.end_session(&first).await, Err(TieError::UnknownSession(first.clone())));
        assert_eq!(
            state.submit(&first, "reverseWords", "python", "x", Some(ReportedRun::default())).await,
            Err(TieError::UnknownSession(first))
        );
    }

    #[tokio::test]
    async fn submissions_need_a_runner() {
        let state = state();
        let session_id = state.start_session("reverseWords").await.expect("session");
        assert_eq!(
            state.submit(&session_id, "reverseWords", "python", "x", None).await,
            Err(TieError::RunnerUnavailable)
        );
    }

    #[tokio::test]
    async fn reported_runtime_errors_keep_raw_code_lines() {
        let state = state();
        let session_id = state.start_session("reverseWords").await.expect("session");
        let run = ReportedRun {
            runtime_error: Some(ReportedError {
                message: "ZeroDivisionError: integer division or modulo by zero on line 2".into(),
                frames: vec![InterpreterFrame { lineno: 2, colno: None }],
            }),
            error_input: Some(json!("hello world")),
            ..ReportedRun::default()
        };
        let result = state
            .submit(&session_id, "reverseWords", "python", "def reverseWords(s):\n    return 1/0", Some(run))
            .await
            .expect("result");
        assert_eq!(result.feedback.category, FeedbackCategory::RuntimeError);
        assert_eq!(result.feedback.error_line_number, Some(2));
        assert_eq!(
            result.feedback.paragraphs.last(),
            Some(&FeedbackParagraph::error("ZeroDivisionError: integer division or modulo by zero on line 2"))
        );
    }

    #[tokio::test]
    async fn reported_results_are_evaluated_and_saved() {
        let state = state();
        let session_id = state.start_session("reverseWords").await.expect("session");
        let (code, feedback) = state.saved_work("reverseWords", "python").await.expect("saved");
        assert_eq!(code.as_deref(), Some("def reverseWords(s):\n    return \"\"\n"));
        assert!(feedback.is_none());

        let run = ReportedRun {
            observed_outputs: vec![
                vec![
                    vec![json!("dlrow olleh"), json!("xof nworb kciuq eht"), json!("fed cba")],
                    vec![json!(""), json!("elgnis")],
                ],
                vec![vec![json!(""), json!(""), json!("")]],
            ],
            ..ReportedRun::default()
        };
        let code = "def reverseWords(s):\n    return s[::-1]";
        let result = state
            .submit(&session_id, "reverseWords", "python", code, Some(run))
            .await
            .expect("result");
        assert_eq!(result.feedback.category, FeedbackCategory::KnownBugFailure);

        let (saved_code, saved_feedback) = state.saved_work("reverseWords", "python").await.expect("saved");
        assert_eq!(saved_code.as_deref(), Some(code));
        assert_eq!(saved_feedback, Some(result.feedback));

        let (code, feedback) = state.clear_saved_work("reverseWords", "python").await.expect("cleared");
        assert_eq!(code.as_deref(), Some("def reverseWords(s):\n    return \"\"\n"));
        assert!(feedback.is_none());
    }
}
