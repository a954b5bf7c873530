//! TIE · Coding Tutor Feedback Backend
//!
//! - Axum HTTP + WebSocket API
//! - Optional remote code runner (via environment variables)
//!
//! Important env variables:
//!   PORT            : u16 (default 3000)
//!   TIE_CONFIG_PATH : path to TOML config (feedback tuning, runner, question bank)
//!   TIE_RUNNER_URL  : base URL of the remote code runner; overrides the config
//!   LOG_LEVEL       : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT      : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use tie_backend::routes::build_router;
use tie_backend::state::AppState;
use tie_backend::telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Question bank, sessions, storage and runner.
  let state = Arc::new(AppState::new());

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "tie_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
