use tracing::debug;

use crate::api::ChatRequest;
use crate::core::error::ChatError;
use crate::core::router::ResolvedRoute;
use crate::core::transport::CompletionTransport;

/// Pulls `choices[0].message.content` out of a completion body.
pub fn extract_completion_text(body: &serde_json::Value) -> Result<String, ChatError> {
    let choice = body
        .get("choices")
        .and_then(|choices| choices.as_array())
        .and_then(|choices| choices.first())
        .ok_or_else(|| ChatError::MalformedResponse("response has no choices".into()))?;

    let content = choice
        .pointer("/message/content")
        .ok_or_else(|| ChatError::MalformedResponse("choice has no message content".into()))?;

    match content.as_str() {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        Some(_) => Err(ChatError::MalformedResponse("message content is empty".into())),
        None => Err(ChatError::MalformedResponse(
            "message content is not text".into(),
        )),
    }
}

/// Single request/response completion.
pub struct NonStreamInvoker<'a, T: CompletionTransport + ?Sized> {
    transport: &'a T,
}

impl<'a, T: CompletionTransport + ?Sized> NonStreamInvoker<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        Self { transport }
    }

    pub async fn invoke(
        &self,
        route: &ResolvedRoute,
        request: &ChatRequest<'_>,
    ) -> Result<String, ChatError> {
        debug!(model = request.model, messages = request.messages.len(), "completion request");
        let body = self.transport.complete(route, request).await?;
        extract_completion_text(&body)
    }
}
