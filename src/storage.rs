//! Persistence of the learner's latest code and feedback per (question, language).
//!
//! Values are stored as `"{version}:{payload}"`. Anything written under a
//! different schema version is treated as absent.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::error::TieResult;
use crate::feedback::Feedback;

pub const STORAGE_VERSION: &str = "1";

#[async_trait]
pub trait KeyValueStore: Send + Sync {
  async fn get(&self, key: &str) -> Option<String>;
  async fn put(&self, key: &str, value: String);
  async fn delete(&self, key: &str);
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
  entries: Arc<RwLock<HashMap<String, String>>>,
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
  async fn get(&self, key: &str) -> Option<String> {
    self.entries.read().await.get(key).cloned()
  }

  async fn put(&self, key: &str, value: String) {
    self.entries.write().await.insert(key.to_string(), value);
  }

  async fn delete(&self, key: &str) {
    self.entries.write().await.remove(key);
  }
}

pub fn code_key(question_id: &str, language: &str) -> String {
  format!("{question_id}:{language}:code")
}

pub fn feedback_key(question_id: &str, language: &str) -> String {
  format!("{question_id}:{language}:feedback")
}

fn versioned(payload: &str) -> String {
  format!("{STORAGE_VERSION}:{payload}")
}

fn unversioned(key: &str, stored: String) -> Option<String> {
  match stored.split_once(':') {
    Some((version, payload)) if version == STORAGE_VERSION => Some(payload.to_string()),
    _ => {
      warn!(target: "tie_backend", %key, "Ignoring stored value with unknown schema version");
      None
    }
  }
}

#[derive(Clone)]
pub struct LocalStorage {
  store: Arc<dyn KeyValueStore>,
}

impl LocalStorage {
  pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
    Self { store }
  }

  pub fn in_memory() -> Self {
    Self::new(Arc::new(InMemoryStore::default()))
  }

  #[instrument(level = "debug", skip(self, code), fields(code_len = code.len()))]
  pub async fn save_code(&self, question_id: &str, language: &str, code: &str) {
    self.store.put(&code_key(question_id, language), versioned(code)).await;
  }

  pub async fn load_code(&self, question_id: &str, language: &str) -> Option<String> {
    let key = code_key(question_id, language);
    let stored = self.store.get(&key).await?;
    unversioned(&key, stored)
  }

  #[instrument(level = "debug", skip(self, feedback), fields(category = %feedback.category))]
  pub async fn save_feedback(&self, question_id: &str, language: &str, feedback: &Feedback) -> TieResult<()> {
    let json = serde_json::to_string(feedback)?;
    self.store.put(&feedback_key(question_id, language), versioned(&json)).await;
    Ok(())
  }

  /// Stored feedback that no longer parses is dropped rather than reported.
  pub async fn load_feedback(&self, question_id: &str, language: &str) -> Option<Feedback> {
    let key = feedback_key(question_id, language);
    let payload = unversioned(&key, self.store.get(&key).await?)?;
    match serde_json::from_str(&payload) {
      Ok(feedback) => Some(feedback),
      Err(e) => {
        warn!(target: "tie_backend", %key, error = %e, "Discarding unreadable stored feedback");
        None
      }
    }
  }

  pub async fn clear(&self, question_id: &str, language: &str) {
    debug!(target: "tie_backend", %question_id, %language, "Clearing saved code and feedback");
    self.store.delete(&code_key(question_id, language)).await;
    self.store.delete(&feedback_key(question_id, language)).await;
  }
}
