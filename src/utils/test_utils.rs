use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;

use crate::api::{ChatRequest, ImageRequest};
use crate::core::chat_stream::{ReleaseReason, ResponseStream};
use crate::core::conversation::{ChatConfig, Conversation};
use crate::core::error::ChatError;
use crate::core::message::Message;
use crate::core::router::ResolvedRoute;
use crate::core::transport::CompletionTransport;

type ChunkHook = Arc<dyn Fn(usize) + Send + Sync>;

pub fn test_route() -> ResolvedRoute {
    ResolvedRoute {
        endpoint: "https://api.test.com/v1/chat/completions".to_string(),
        key: Some("test-key".to_string()),
        version: None,
    }
}

pub fn completion_body(text: &str) -> serde_json::Value {
    serde_json::json!({
        "choices": [{"message": {"role": "assistant", "content": text}}]
    })
}

/// One SSE event carrying `text` as a content delta.
pub fn delta_chunk(text: &str) -> Vec<u8> {
    format!(
        "data: {}\n\n",
        serde_json::json!({"choices": [{"delta": {"content": text}}]})
    )
    .into_bytes()
}

/// SSE body streaming `fragments` one event each, then the terminator.
pub fn sse_body(fragments: &[&str]) -> String {
    let mut body: String = fragments
        .iter()
        .map(|fragment| String::from_utf8_lossy(&delta_chunk(fragment)).into_owned())
        .collect();
    body.push_str("data: [DONE]\n\n");
    body
}

pub fn create_test_conversation(messages: &[(&str, &str)]) -> Conversation {
    let mut conversation = Conversation::new("test", ChatConfig::default());
    for (role, text) in messages {
        let message = match *role {
            "user" => Message::user(*text),
            "assistant" => Message::assistant(*text),
            _ => Message::system(*text),
        };
        conversation.push_message(message);
    }
    conversation
}

struct ScriptedStream {
    chunks: Vec<Result<Vec<u8>, String>>,
    hook: Option<ChunkHook>,
}

#[derive(Default)]
struct Script {
    completions: VecDeque<Result<serde_json::Value, ChatError>>,
    streams: VecDeque<Result<ScriptedStream, ChatError>>,
    images: VecDeque<Result<serde_json::Value, ChatError>>,
    completion_requests: Vec<serde_json::Value>,
    stream_requests: Vec<serde_json::Value>,
    image_requests: Vec<serde_json::Value>,
    routes: Vec<ResolvedRoute>,
}

/// In-memory [`CompletionTransport`] answering from queued responses and
/// recording every request body it receives.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
    releases: Arc<Mutex<Vec<ReleaseReason>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_completion(self, body: serde_json::Value) -> Self {
        self.script.lock().unwrap().completions.push_back(Ok(body));
        self
    }

    pub fn with_completion_error(self, error: ChatError) -> Self {
        self.script.lock().unwrap().completions.push_back(Err(error));
        self
    }

    pub fn with_stream(self, body: &str) -> Self {
        self.with_stream_chunks(vec![Ok(body.as_bytes().to_vec())], None)
    }

    /// Queues a stream yielding `chunks` in order. `hook` runs with the
    /// chunk index right before each chunk is handed to the reader.
    pub fn with_stream_chunks(
        self,
        chunks: Vec<Result<Vec<u8>, String>>,
        hook: Option<ChunkHook>,
    ) -> Self {
        self.script
            .lock()
            .unwrap()
            .streams
            .push_back(Ok(ScriptedStream { chunks, hook }));
        self
    }

    pub fn with_stream_error(self, error: ChatError) -> Self {
        self.script.lock().unwrap().streams.push_back(Err(error));
        self
    }

    pub fn with_image(self, body: serde_json::Value) -> Self {
        self.script.lock().unwrap().images.push_back(Ok(body));
        self
    }

    pub fn completion_requests(&self) -> Vec<serde_json::Value> {
        self.script.lock().unwrap().completion_requests.clone()
    }

    pub fn stream_requests(&self) -> Vec<serde_json::Value> {
        self.script.lock().unwrap().stream_requests.clone()
    }

    pub fn image_requests(&self) -> Vec<serde_json::Value> {
        self.script.lock().unwrap().image_requests.clone()
    }

    pub fn routes(&self) -> Vec<ResolvedRoute> {
        self.script.lock().unwrap().routes.clone()
    }

    pub fn release_reasons(&self) -> Vec<ReleaseReason> {
        self.releases.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        let script = self.script.lock().unwrap();
        script.completion_requests.len()
            + script.stream_requests.len()
            + script.image_requests.len()
    }
}

fn unscripted(kind: &str) -> ChatError {
    ChatError::Api(format!("no scripted {kind} response"))
}

#[async_trait]
impl CompletionTransport for ScriptedTransport {
    async fn complete(
        &self,
        route: &ResolvedRoute,
        request: &ChatRequest<'_>,
    ) -> Result<serde_json::Value, ChatError> {
        let mut script = self.script.lock().unwrap();
        script.routes.push(route.clone());
        script
            .completion_requests
            .push(serde_json::to_value(request).unwrap());
        script
            .completions
            .pop_front()
            .unwrap_or_else(|| Err(unscripted("completion")))
    }

    async fn open_stream(
        &self,
        route: &ResolvedRoute,
        request: &ChatRequest<'_>,
    ) -> Result<ResponseStream, ChatError> {
        let scripted = {
            let mut script = self.script.lock().unwrap();
            script.routes.push(route.clone());
            script
                .stream_requests
                .push(serde_json::to_value(request).unwrap());
            script
                .streams
                .pop_front()
                .unwrap_or_else(|| Err(unscripted("stream")))?
        };

        let hook = scripted.hook;
        let chunks = futures_util::stream::iter(scripted.chunks.into_iter().enumerate())
            .map(move |(index, chunk)| {
                if let Some(hook) = &hook {
                    hook(index);
                }
                chunk.map(Bytes::from)
            })
            .boxed();

        let releases = Arc::clone(&self.releases);
        Ok(ResponseStream::new(chunks)
            .on_release(move |reason| releases.lock().unwrap().push(reason)))
    }

    async fn generate_image(
        &self,
        route: &ResolvedRoute,
        request: &ImageRequest<'_>,
    ) -> Result<serde_json::Value, ChatError> {
        let mut script = self.script.lock().unwrap();
        script.routes.push(route.clone());
        script
            .image_requests
            .push(serde_json::to_value(request).unwrap());
        script
            .images
            .pop_front()
            .unwrap_or_else(|| Err(unscripted("image")))
    }
}
