//! Conversation title generation from the first exchange.

use std::sync::Arc;

use tracing::debug;

use crate::api::ChatRequest;
use crate::core::completion::NonStreamInvoker;
use crate::core::conversation::ChatConfig;
use crate::core::error::ChatError;
use crate::core::message::{ContentBlock, Message, Role};
use crate::core::router::ResolvedRoute;
use crate::core::transport::CompletionTransport;

pub fn title_instruction(language: &str) -> String {
    format!(
        "Generate a title in less than 6 words for the conversation so far (language: {language})"
    )
}

/// Removes one pair of matching quotes wrapping the whole title.
pub fn strip_wrapping_quotes(raw: &str) -> String {
    let trimmed = raw.trim();
    for (open, close) in [('"', '"'), ('\'', '\''), ('“', '”')] {
        if trimmed.chars().count() >= 2 {
            if let Some(inner) = trimmed
                .strip_prefix(open)
                .and_then(|rest| rest.strip_suffix(close))
            {
                return inner.to_string();
            }
        }
    }
    trimmed.to_string()
}

/// The single synthetic user message sent to the title model: the user's
/// content, the assistant's content, then the instruction.
pub fn build_title_prompt(user: &Message, assistant: &Message, language: &str) -> Message {
    let content: Vec<ContentBlock> = user
        .content
        .iter()
        .chain(assistant.content.iter())
        .cloned()
        .chain(std::iter::once(ContentBlock::text(title_instruction(language))))
        .collect();
    Message::new(Role::User, content)
}

pub struct TitleGenerator<'a, T: CompletionTransport + ?Sized> {
    transport: &'a T,
}

impl<'a, T: CompletionTransport + ?Sized> TitleGenerator<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        Self { transport }
    }

    /// Asks `config.model` for a title. Every failure is reported as
    /// [`ChatError::TitleGeneration`].
    pub async fn generate(
        &self,
        route: &ResolvedRoute,
        config: &ChatConfig,
        prompt: &[Arc<Message>],
    ) -> Result<String, ChatError> {
        debug!(model = %config.model, "requesting title");
        let request = ChatRequest::new(config, prompt, false);
        let raw = NonStreamInvoker::new(self.transport)
            .invoke(route, &request)
            .await
            .map_err(|err| ChatError::TitleGeneration(err.to_string()))?;

        let title = strip_wrapping_quotes(&raw);
        if title.is_empty() {
            return Err(ChatError::TitleGeneration("empty title".into()));
        }
        Ok(title)
    }
}
