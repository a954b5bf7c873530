//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Test data (suites, buggy outputs, performance tests) never leaves the server.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Instruction, Question, Task};
use crate::feedback::Feedback;
use crate::logic::SubmissionResult;
use crate::runner::ReportedRun;

fn default_language() -> String {
    "python".to_string()
}

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    ListQuestions,
    GetQuestion {
        #[serde(rename = "questionId")]
        question_id: String,
    },
    StartSession {
        #[serde(rename = "questionId")]
        question_id: String,
    },
    EndSession {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Submit(SubmitIn),
    LoadSaved {
        #[serde(rename = "questionId")]
        question_id: String,
        #[serde(default = "default_language")]
        language: String,
    },
    ClearSaved {
        #[serde(rename = "questionId")]
        question_id: String,
        #[serde(default = "default_language")]
        language: String,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Questions {
        questions: Vec<QuestionSummary>,
    },
    Question {
        question: QuestionOut,
    },
    Session {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    SessionEnded {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    SubmissionResult {
        feedback: Feedback,
        stdout: Option<String>,
    },
    Saved(SavedOut),
    Error {
        message: String,
    },
}

impl From<SubmissionResult> for ServerWsMessage {
    fn from(r: SubmissionResult) -> Self {
        ServerWsMessage::SubmissionResult { feedback: r.feedback, stdout: r.stdout }
    }
}

#[derive(Debug, Serialize)]
pub struct QuestionSummary {
    pub id: String,
    pub title: String,
    #[serde(rename = "taskCount")]
    pub task_count: usize,
}

impl From<&Question> for QuestionSummary {
    fn from(q: &Question) -> Self {
        Self { id: q.id.clone(), title: q.title.clone(), task_count: q.tasks().len() }
    }
}

/// DTO used by both WS and HTTP for question delivery.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOut {
    pub id: String,
    pub title: String,
    pub starter_code: HashMap<String, String>,
    pub tasks: Vec<TaskOut>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOut {
    pub id: String,
    pub instructions: Vec<Instruction>,
    pub prerequisite_skills: Vec<String>,
    pub acquired_skills: Vec<String>,
    pub main_function_name: String,
}

impl From<&Task> for TaskOut {
    fn from(t: &Task) -> Self {
        Self {
            id: t.id.clone(),
            instructions: t.instructions.clone(),
            prerequisite_skills: t.prerequisite_skills.clone(),
            acquired_skills: t.acquired_skills.clone(),
            main_function_name: t.main_function_name.clone(),
        }
    }
}

/// Convert a full `Question` (internal) to the public DTO.
pub fn to_out(q: &Question) -> QuestionOut {
    QuestionOut {
        id: q.id.clone(),
        title: q.title.clone(),
        starter_code: q.starter_code.clone(),
        tasks: q.tasks().iter().map(TaskOut::from).collect(),
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct QuestionQuery {
    #[serde(rename = "questionId")]
    pub question_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionIn {
    #[serde(rename = "questionId")]
    pub question_id: String,
}
#[derive(Debug, Serialize)]
pub struct SessionOut {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// One submission. `reported` carries results computed by an in-browser interpreter.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitIn {
    pub session_id: String,
    pub question_id: String,
    #[serde(default = "default_language")]
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub reported: Option<ReportedRun>,
}

#[derive(Debug, Deserialize)]
pub struct SavedQuery {
    #[serde(rename = "questionId")]
    pub question_id: String,
    #[serde(default = "default_language")]
    pub language: String,
}
#[derive(Debug, Serialize)]
pub struct SavedOut {
    pub code: Option<String>,
    pub feedback: Option<Feedback>,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seeds::seed_questions;
    use serde_json::{json, Value};

    #[test]
    fn client_messages_parse() {
        let msg: ClientWsMessage = serde_json::from_value(json!({
            "type": "submit",
            "sessionId": "s1",
            "questionId": "reverseWords",
            "code": "def reverseWords(s):\n    return s",
        }))
        .expect("submit");
        match msg {
            ClientWsMessage::Submit(s) => {
                assert_eq!(s.language, "python");
                assert!(s.reported.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }

        let msg: ClientWsMessage = serde_json::from_value(json!({ "type": "load_saved", "questionId": "q" })).expect("load_saved");
        assert!(matches!(msg, ClientWsMessage::LoadSaved { language, .. } if language == "python"));
    }

    #[test]
    fn question_out_hides_test_data() {
        let questions = seed_questions().expect("seeds");
        let out = serde_json::to_value(to_out(&questions[0])).expect("json");
        let task = &out["tasks"][0];
        assert_eq!(task["mainFunctionName"], "reverseWords");
        assert_eq!(task.get("testSuites"), None::<&Value>);
        assert_eq!(task.get("buggyOutputTests"), None::<&Value>);
        assert!(out.get("auxiliaryCode").is_none());
    }

    #[test]
    fn server_messages_are_tagged() {
        let v = serde_json::to_value(ServerWsMessage::Session { session_id: "abc".into() }).expect("json");
        assert_eq!(v, json!({ "type": "session", "sessionId": "abc" }));
    }
}
