//! Whole-file synchronization store.
//!
//! A single JSON document holds the conversation list. `POST` replaces it
//! verbatim (last writer wins), `GET` returns it, nothing else is allowed.
//! The CLI reads and writes the same document through [`SyncStore::load`]
//! and [`SyncStore::save`].

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::conversation::Conversation;
use crate::core::state::AppState;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("sync file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl SyncResponse {
    fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.as_bytes().to_vec(),
        }
    }
}

/// Persisted shape of the conversation store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDocument {
    #[serde(default)]
    pub chats: Vec<Conversation>,
    #[serde(default)]
    pub current_chat_index: usize,
}

impl SyncDocument {
    pub fn from_state(state: &AppState) -> Self {
        Self {
            chats: state.chats().iter().map(|chat| chat.as_ref().clone()).collect(),
            current_chat_index: state.current_chat_index(),
        }
    }

    pub fn into_state(self) -> AppState {
        let index = self.current_chat_index.min(self.chats.len().saturating_sub(1));
        let state = AppState::new(self.chats);
        state.set_current_chat_index(index);
        state
    }
}

pub struct SyncStore {
    path: PathBuf,
}

impl SyncStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn handle(&self, method: &str, body: &[u8]) -> SyncResponse {
        match method.to_ascii_uppercase().as_str() {
            "POST" => match self.write_atomic(body) {
                Ok(()) => {
                    debug!(
                        path = %self.path.display(),
                        bytes = body.len(),
                        "sync document replaced"
                    );
                    SyncResponse::text(200, "ok")
                }
                Err(err) => {
                    warn!(error = %err, "sync write failed");
                    SyncResponse::text(500, &err.to_string())
                }
            },
            "GET" => match fs::read(&self.path) {
                Ok(contents) => SyncResponse {
                    status: 200,
                    content_type: "application/json",
                    body: contents,
                },
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    SyncResponse::text(404, "No data")
                }
                Err(err) => {
                    warn!(error = %err, "sync read failed");
                    SyncResponse::text(500, &SyncError::from(err).to_string())
                }
            },
            _ => SyncResponse::text(405, "Method not allowed"),
        }
    }

    /// Loads the stored document, or `None` when nothing was saved yet.
    pub fn load(&self) -> Result<Option<SyncDocument>, SyncError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }

    pub fn save(&self, document: &SyncDocument) -> Result<(), SyncError> {
        let json = serde_json::to_vec_pretty(document)?;
        self.write_atomic(&json)?;
        Ok(())
    }

    /// Convenience for writing the current state snapshot.
    pub fn save_state(&self, state: &AppState) -> Result<(), SyncError> {
        self.save(&SyncDocument::from_state(state))
    }

    fn write_atomic(&self, contents: &[u8]) -> Result<(), std::io::Error> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        let mut temp_file = NamedTempFile::new_in(parent)?;
        temp_file.write_all(contents)?;
        temp_file.flush()?;
        temp_file.persist(&self.path).map_err(|err| err.error)?;
        Ok(())
    }
}
