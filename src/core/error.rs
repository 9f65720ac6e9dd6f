//! Failure taxonomy for a single submit.
//!
//! Every variant raised on the primary text or image path is caught by
//! [`crate::core::service::ChatService::submit`] and surfaced as one
//! user-visible message. Title failures are isolated by the caller.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("No API key supplied! Please set an API key or use a custom API endpoint.")]
    MissingApiKey,

    #[error("No messages submitted!")]
    NoMessages,

    #[error("Message exceeds the token budget ({required} tokens required, {budget} allowed)")]
    TokenBudgetExceeded { budget: usize, required: usize },

    #[error("Response stream is already locked by another reader")]
    StreamLocked,

    #[error("Stream failed: {0}")]
    StreamFailure(String),

    #[error("Failed to retrieve valid chat completion response: {0}")]
    MalformedResponse(String),

    #[error("No user message found to generate an image from")]
    NoUserMessage,

    #[error("Image generation failed: {0}")]
    ImageGeneration(String),

    #[error("Error generating title!\n{0}")]
    TitleGeneration(String),

    #[error("{0}")]
    Api(String),

    #[error("No active conversation at index {0}")]
    NoActiveConversation(usize),
}

impl ChatError {
    /// Errors that come from a remote call rather than local validation.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            ChatError::StreamFailure(_)
                | ChatError::MalformedResponse(_)
                | ChatError::ImageGeneration(_)
                | ChatError::Api(_)
        )
    }
}
