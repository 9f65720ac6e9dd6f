pub mod models;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::conversation::ChatConfig;
use crate::core::message::Message;

/// Body of a chat-completions call. `max_tokens` from the conversation
/// config is a local history budget and is deliberately absent here.
#[derive(Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Arc<Message>],
    pub stream: bool,
    pub temperature: f32,
    pub presence_penalty: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
}

impl<'a> ChatRequest<'a> {
    pub fn new(config: &'a ChatConfig, messages: &'a [Arc<Message>], stream: bool) -> Self {
        Self {
            model: &config.model,
            messages,
            stream,
            temperature: config.temperature,
            presence_penalty: config.presence_penalty,
            top_p: config.top_p,
            frequency_penalty: config.frequency_penalty,
        }
    }
}

#[derive(Deserialize)]
pub struct ChatResponseDelta {
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub struct ChatResponseChoice {
    pub delta: Option<ChatResponseDelta>,
}

/// One streamed `data:` record.
#[derive(Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatResponseChoice>,
}

impl ChatResponse {
    pub fn delta_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.as_ref())
            .and_then(|delta| delta.content.as_deref())
    }
}

#[derive(Serialize)]
pub struct ImageRequest<'a> {
    pub prompt: &'a str,
    pub model: &'a str,
    pub size: &'a str,
    pub n: u32,
}

#[derive(Deserialize)]
pub struct ImageData {
    pub url: Option<String>,
    pub b64_json: Option<String>,
    pub revised_prompt: Option<String>,
}

#[derive(Deserialize)]
pub struct ImageResponse {
    #[serde(default)]
    pub data: Vec<ImageData>,
}
