//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to `AppState`. We reply with a single JSON message per request.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument};

use crate::error::TieResult;
use crate::protocol::{to_out, ClientWsMessage, QuestionSummary, SavedOut, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "tie_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "tie_backend", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "tie_backend", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state).await
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "tie_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "tie_backend", "WebSocket disconnected");
}

/// Errors become a `ServerWsMessage::Error`; the connection stays open.
#[instrument(level = "info", skip_all)]
pub async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  dispatch(msg, state)
    .await
    .unwrap_or_else(|e| ServerWsMessage::Error { message: e.to_string() })
}

async fn dispatch(msg: ClientWsMessage, state: &AppState) -> TieResult<ServerWsMessage> {
  Ok(match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::ListQuestions => {
      let questions = state.list_questions().await.iter().map(QuestionSummary::from).collect();
      ServerWsMessage::Questions { questions }
    }

    ClientWsMessage::GetQuestion { question_id } => {
      let question = state.get_question(&question_id).await?;
      ServerWsMessage::Question { question: to_out(&question) }
    }

    ClientWsMessage::StartSession { question_id } => {
      let session_id = state.start_session(&question_id).await?;
      ServerWsMessage::Session { session_id }
    }

    ClientWsMessage::EndSession { session_id } => {
      state.end_session(&session_id).await?;
      ServerWsMessage::SessionEnded { session_id }
    }

    ClientWsMessage::Submit(body) => {
      let result = state
        .submit(&body.session_id, &body.question_id, &body.language, &body.code, body.reported)
        .await?;
      info!(target: "feedback", id = %body.question_id, category = %result.feedback.category, "WS submission evaluated");
      result.into()
    }

    ClientWsMessage::LoadSaved { question_id, language } => {
      let (code, feedback) = state.saved_work(&question_id, &language).await?;
      ServerWsMessage::Saved(SavedOut { code, feedback })
    }

    ClientWsMessage::ClearSaved { question_id, language } => {
      let (code, feedback) = state.clear_saved_work(&question_id, &language).await?;
      ServerWsMessage::Saved(SavedOut { code, feedback })
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::AppConfig;
  use serde_json::{json, Value};

  async fn reply(state: &AppState, msg: Value) -> Value {
    let msg: ClientWsMessage = serde_json::from_value(msg).expect("client message");
    serde_json::to_value(handle_client_ws(msg, state).await).expect("json")
  }

  #[tokio::test]
  async fn session_flow_over_messages() {
    let state = AppState::from_config(AppConfig::default());
    assert_eq!(reply(&state, json!({ "type": "ping" })).await, json!({ "type": "pong" }));

    let listed = reply(&state, json!({ "type": "list_questions" })).await;
    assert_eq!(listed["questions"][0]["id"], "reverseWords");

    let session = reply(&state, json!({ "type": "start_session", "questionId": "reverseWords" })).await;
    let session_id = session["sessionId"].as_str().expect("session id").to_string();

    let result = reply(&state, json!({
      "type": "submit",
      "sessionId": session_id,
      "questionId": "reverseWords",
      "code": "def reverseWords(s):\n    return s.foo()",
      "reported": {
        "runtimeError": { "message": "AttributeError: 'str' object has no attribute 'foo' on line 2", "frames": [{ "lineno": 2 }] },
        "errorInput": "hello world",
      },
    }))
    .await;
    assert_eq!(result["type"], "submission_result");
    assert_eq!(result["feedback"]["category"], "RUNTIME_ERROR");
    assert_eq!(result["feedback"]["errorLineNumber"], 2);

    let ended = reply(&state, json!({ "type": "end_session", "sessionId": session_id })).await;
    assert_eq!(ended, json!({ "type": "session_ended", "sessionId": session_id }));
    assert!(state.sessions.read().await.is_empty());

    let cleared = reply(&state, json!({ "type": "clear_saved", "questionId": "reverseWords" })).await;
    assert_eq!(cleared["type"], "saved");
    assert!(cleared["feedback"].is_null());
  }

  #[tokio::test]
  async fn errors_are_reported_as_messages() {
    let state = AppState::from_config(AppConfig::default());
    let out = reply(&state, json!({ "type": "get_question", "questionId": "missing" })).await;
    assert_eq!(out, json!({ "type": "error", "message": "Unknown question: missing" }));
  }
}
