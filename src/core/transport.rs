//! The network seam between the orchestrator and a provider.

use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::debug;

use crate::api::{ChatRequest, ImageRequest};
use crate::core::chat_stream::{format_api_error, ResponseStream};
use crate::core::error::ChatError;
use crate::core::router::ResolvedRoute;
use crate::utils::auth::add_auth_headers;

#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// Single request/response completion call. Returns the raw JSON body.
    async fn complete(
        &self,
        route: &ResolvedRoute,
        request: &ChatRequest<'_>,
    ) -> Result<serde_json::Value, ChatError>;

    /// Opens a streamed completion call.
    async fn open_stream(
        &self,
        route: &ResolvedRoute,
        request: &ChatRequest<'_>,
    ) -> Result<ResponseStream, ChatError>;

    async fn generate_image(
        &self,
        route: &ResolvedRoute,
        request: &ImageRequest<'_>,
    ) -> Result<serde_json::Value, ChatError>;
}

/// [`CompletionTransport`] over reqwest. Timeouts are whatever the client
/// was built with.
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn post<B: serde::Serialize + Sync>(
        &self,
        route: &ResolvedRoute,
        body: &B,
    ) -> Result<reqwest::Response, ChatError> {
        let http_request = self
            .client
            .post(&route.endpoint)
            .header("Content-Type", "application/json");
        let http_request =
            add_auth_headers(http_request, route.key.as_deref(), route.version.as_deref());

        let response = http_request
            .json(body)
            .send()
            .await
            .map_err(|e| ChatError::Api(format_api_error(&e.to_string())))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            debug!(status = %status, endpoint = %route.endpoint, "provider rejected request");
            return Err(ChatError::Api(format_api_error(&error_text)));
        }

        Ok(response)
    }

    async fn post_json<B: serde::Serialize + Sync>(
        &self,
        route: &ResolvedRoute,
        body: &B,
    ) -> Result<serde_json::Value, ChatError> {
        self.post(route, body)
            .await?
            .json::<serde_json::Value>()
            .await
            .map_err(|e| ChatError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl CompletionTransport for HttpTransport {
    async fn complete(
        &self,
        route: &ResolvedRoute,
        request: &ChatRequest<'_>,
    ) -> Result<serde_json::Value, ChatError> {
        self.post_json(route, request).await
    }

    async fn open_stream(
        &self,
        route: &ResolvedRoute,
        request: &ChatRequest<'_>,
    ) -> Result<ResponseStream, ChatError> {
        let response = self.post(route, request).await?;
        debug!(endpoint = %route.endpoint, "stream opened");
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| e.to_string()))
            .boxed();
        Ok(ResponseStream::new(chunks))
    }

    async fn generate_image(
        &self,
        route: &ResolvedRoute,
        request: &ImageRequest<'_>,
    ) -> Result<serde_json::Value, ChatError> {
        self.post_json(route, request)
            .await
            .map_err(|err| match err {
                ChatError::MalformedResponse(text) | ChatError::Api(text) => {
                    ChatError::ImageGeneration(text)
                }
                other => other,
            })
    }
}
