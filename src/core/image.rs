//! Image generation for image-modality models.

use std::sync::Arc;

use tracing::debug;

use crate::api::{ImageData, ImageRequest, ImageResponse};
use crate::core::conversation::last_user_message;
use crate::core::error::ChatError;
use crate::core::message::{ContentBlock, ImageDetail, Message, Role};
use crate::core::router::ResolvedRoute;
use crate::core::transport::CompletionTransport;

pub const IMAGE_SIZE: &str = "1024x1024";

pub struct ImageDispatcher<'a, T: CompletionTransport + ?Sized> {
    transport: &'a T,
}

impl<'a, T: CompletionTransport + ?Sized> ImageDispatcher<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        Self { transport }
    }

    /// Generates an image from the most recent user message's first text
    /// block and returns the assistant message that should replace the
    /// in-flight placeholder.
    pub async fn dispatch(
        &self,
        route: &ResolvedRoute,
        model: &str,
        history: &[Arc<Message>],
    ) -> Result<Message, ChatError> {
        if history.is_empty() {
            return Err(ChatError::NoMessages);
        }
        let prompt = last_user_message(history)
            .and_then(|message| message.first_text())
            .ok_or(ChatError::NoUserMessage)?;

        debug!(model, size = IMAGE_SIZE, "image request");
        let request = ImageRequest {
            prompt,
            model,
            size: IMAGE_SIZE,
            n: 1,
        };
        let body = self.transport.generate_image(route, &request).await?;
        let response: ImageResponse = serde_json::from_value(body)
            .map_err(|e| ChatError::ImageGeneration(format!("unexpected response: {e}")))?;
        let image = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::ImageGeneration("response has no images".into()))?;

        build_image_message(image)
    }
}

fn build_image_message(image: ImageData) -> Result<Message, ChatError> {
    let url = match (image.url, image.b64_json) {
        (Some(url), _) if !url.is_empty() => url,
        (_, Some(encoded)) if !encoded.is_empty() => format!("data:image/png;base64,{encoded}"),
        _ => {
            return Err(ChatError::ImageGeneration(
                "response has neither url nor b64_json".into(),
            ))
        }
    };

    let mut content = Vec::with_capacity(2);
    if let Some(revised) = image.revised_prompt.filter(|text| !text.is_empty()) {
        content.push(ContentBlock::text(revised));
    }
    content.push(ContentBlock::image(url, ImageDetail::Auto));
    Ok(Message::new(Role::Assistant, content))
}
