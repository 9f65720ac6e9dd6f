use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::message::Message;

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_MAX_TOKENS: usize = 4000;

/// Per-conversation generation settings. `max_tokens` is the history
/// budget used when trimming; it is not forwarded to the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatConfig {
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub presence_penalty: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default)]
    pub frequency_penalty: f32,
}

fn default_max_tokens() -> usize {
    DEFAULT_MAX_TOKENS
}

fn default_temperature() -> f32 {
    1.0
}

fn default_top_p() -> f32 {
    1.0
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: default_temperature(),
            presence_penalty: 0.0,
            top_p: default_top_p(),
            frequency_penalty: 0.0,
        }
    }
}

impl ChatConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub title_set: bool,
    #[serde(default)]
    pub messages: Vec<Arc<Message>>,
    #[serde(default)]
    pub config: ChatConfig,
}

impl Conversation {
    pub fn new(id: impl Into<String>, config: ChatConfig) -> Self {
        Self {
            id: id.into(),
            title: "New Chat".to_string(),
            title_set: false,
            messages: Vec::new(),
            config,
        }
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(Arc::new(message));
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last().map(Arc::as_ref)
    }

    /// Mutable access to the trailing message, cloning it only if another
    /// snapshot still shares it.
    pub fn last_message_mut(&mut self) -> Option<&mut Message> {
        self.messages.last_mut().map(Arc::make_mut)
    }
}

/// The most recent user message in `messages`, skipping any trailing
/// assistant replies.
pub fn last_user_message(messages: &[Arc<Message>]) -> Option<&Message> {
    messages
        .iter()
        .rev()
        .map(Arc::as_ref)
        .find(|message| message.is_user())
}
