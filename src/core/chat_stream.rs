use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::ChatResponse;
use crate::core::error::ChatError;
use crate::core::sse::{EventBuffer, SseRecord};

pub type ChunkStream = BoxStream<'static, Result<Bytes, String>>;
type ReleaseHook = Box<dyn FnOnce(ReleaseReason) + Send>;

/// Why a stream handle was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseReason {
    Completed,
    UserCancelled,
    Failed,
}

impl ReleaseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ReleaseReason::Completed => "Generation completed",
            ReleaseReason::UserCancelled => "Cancelled by user",
            ReleaseReason::Failed => "Stream failed",
        }
    }
}

/// A streamed response body. Only one reader may hold it at a time.
pub struct ResponseStream {
    chunks: Option<ChunkStream>,
    on_release: Option<ReleaseHook>,
}

impl ResponseStream {
    pub fn new(chunks: ChunkStream) -> Self {
        Self {
            chunks: Some(chunks),
            on_release: None,
        }
    }

    /// Registers a callback invoked exactly once when the reader lets go.
    pub fn on_release(mut self, hook: impl FnOnce(ReleaseReason) + Send + 'static) -> Self {
        self.on_release = Some(Box::new(hook));
        self
    }

    pub fn is_locked(&self) -> bool {
        self.chunks.is_none()
    }

    /// Locks the stream and hands out its reader.
    pub fn reader(&mut self) -> Result<StreamReader, ChatError> {
        let chunks = self.chunks.take().ok_or(ChatError::StreamLocked)?;
        Ok(StreamReader {
            chunks: Some(chunks),
            on_release: self.on_release.take(),
        })
    }
}

/// Exclusive reader over a [`ResponseStream`]. Released explicitly with a
/// reason, or as [`ReleaseReason::Failed`] if dropped unreleased.
pub struct StreamReader {
    chunks: Option<ChunkStream>,
    on_release: Option<ReleaseHook>,
}

impl StreamReader {
    pub async fn read(&mut self) -> Option<Result<Bytes, String>> {
        match self.chunks.as_mut() {
            Some(chunks) => chunks.next().await,
            None => None,
        }
    }

    pub fn release(mut self, reason: ReleaseReason) {
        self.release_inner(reason);
    }

    fn release_inner(&mut self, reason: ReleaseReason) {
        // Dropping the chunk stream closes the underlying connection.
        self.chunks = None;
        if let Some(hook) = self.on_release.take() {
            debug!(reason = reason.as_str(), "stream released");
            hook(reason);
        }
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        self.release_inner(ReleaseReason::Failed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Reading,
    Done,
    Cancelled,
    Errored,
}

impl StreamState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StreamState::Done | StreamState::Cancelled | StreamState::Errored
        )
    }
}

enum StreamEvent {
    Delta(Option<String>),
    Done,
}

fn parse_stream_event(record: &SseRecord) -> Result<StreamEvent, ChatError> {
    let payload = record.data.trim();
    if payload == "[DONE]" {
        return Ok(StreamEvent::Done);
    }
    if payload.is_empty() {
        return Ok(StreamEvent::Delta(None));
    }

    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(value) if value.get("error").is_some() => {
            Err(ChatError::StreamFailure(format_api_error(payload)))
        }
        Ok(value) => serde_json::from_value::<ChatResponse>(value)
            .map(|response| StreamEvent::Delta(response.delta_content().map(str::to_owned)))
            .map_err(|err| ChatError::StreamFailure(format!("unexpected event shape: {err}"))),
        Err(_) => Err(ChatError::StreamFailure(format_api_error(payload))),
    }
}

/// Folds a streamed completion into conversation state.
///
/// `Idle → Reading → {Done | Cancelled | Errored}`. Cancellation is polled
/// once per read iteration, and deltas are committed at most once per read.
pub struct StreamConsumer {
    cancel: CancellationToken,
    state: StreamState,
}

impl StreamConsumer {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            state: StreamState::Idle,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Reads `stream` to a terminal state, passing each read's concatenated
    /// deltas to `commit`. Returns the terminal state on success.
    pub async fn consume<F>(
        &mut self,
        stream: &mut ResponseStream,
        mut commit: F,
    ) -> Result<StreamState, ChatError>
    where
        F: FnMut(&str) -> Result<(), ChatError>,
    {
        let mut reader = stream.reader()?;
        self.state = StreamState::Reading;
        let mut buffer = EventBuffer::new();

        loop {
            if self.cancel.is_cancelled() {
                reader.release(ReleaseReason::UserCancelled);
                self.state = StreamState::Cancelled;
                return Ok(self.state);
            }

            let (fragment, finished) = match reader.read().await {
                Some(Ok(bytes)) => {
                    buffer.push(&bytes);
                    match drain_events(std::iter::from_fn(|| buffer.next_record())) {
                        Ok(result) => result,
                        Err(err) => return self.fail(reader, err),
                    }
                }
                Some(Err(message)) => {
                    return self.fail(reader, ChatError::StreamFailure(message));
                }
                None => match drain_events(buffer.finish()) {
                    Ok((fragment, _)) => (fragment, true),
                    Err(err) => return self.fail(reader, err),
                },
            };

            if !fragment.is_empty() {
                if let Err(err) = commit(&fragment) {
                    return self.fail(reader, err);
                }
            }

            if finished {
                reader.release(ReleaseReason::Completed);
                self.state = StreamState::Done;
                return Ok(self.state);
            }
        }
    }

    fn fail(&mut self, reader: StreamReader, err: ChatError) -> Result<StreamState, ChatError> {
        warn!(error = %err, "stream errored");
        reader.release(ReleaseReason::Failed);
        self.state = StreamState::Errored;
        Err(err)
    }
}

/// Concatenates the deltas of `records`, stopping at the terminator.
fn drain_events(
    records: impl IntoIterator<Item = SseRecord>,
) -> Result<(String, bool), ChatError> {
    let mut fragment = String::new();
    for record in records {
        match parse_stream_event(&record)? {
            StreamEvent::Done => return Ok((fragment, true)),
            StreamEvent::Delta(Some(content)) => fragment.push_str(&content),
            StreamEvent::Delta(None) => {}
        }
    }
    Ok((fragment, false))
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Renders a provider error body for display: a one-line summary when the
/// body is JSON with a message, followed by the pretty-printed body.
pub(crate) fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "API Error: <empty>".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Ok(pretty_json) = serde_json::to_string_pretty(&json_value) {
            return match extract_error_summary(&json_value) {
                Some(summary) if !summary.is_empty() => {
                    format!("API Error: {summary}\n```json\n{pretty_json}\n```")
                }
                _ => format!("API Error:\n```json\n{pretty_json}\n```"),
            };
        }
    }

    format!("API Error:\n```\n{trimmed}\n```")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn delta(text: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices":[{"delta":{"content":text}}]})
        )
    }

    fn stream_of(chunks: Vec<Result<Vec<u8>, String>>) -> ChunkStream {
        futures_util::stream::iter(
            chunks
                .into_iter()
                .map(|chunk| chunk.map(Bytes::from))
                .collect::<Vec<_>>(),
        )
        .boxed()
    }

    struct Releases {
        count: Arc<AtomicUsize>,
        reasons: Arc<Mutex<Vec<ReleaseReason>>>,
    }

    fn tracked(chunks: ChunkStream) -> (ResponseStream, Releases) {
        let count = Arc::new(AtomicUsize::new(0));
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let hook_count = Arc::clone(&count);
        let hook_reasons = Arc::clone(&reasons);
        let stream = ResponseStream::new(chunks).on_release(move |reason| {
            hook_count.fetch_add(1, Ordering::SeqCst);
            hook_reasons.lock().unwrap().push(reason);
        });
        (stream, Releases { count, reasons })
    }

    async fn collect(
        stream: &mut ResponseStream,
        cancel: CancellationToken,
    ) -> (Result<StreamState, ChatError>, Vec<String>) {
        let mut commits = Vec::new();
        let mut consumer = StreamConsumer::new(cancel);
        let result = consumer
            .consume(stream, |fragment| {
                commits.push(fragment.to_string());
                Ok(())
            })
            .await;
        (result, commits)
    }

    #[tokio::test]
    async fn natural_termination_reaches_done_and_releases_once() {
        let body = format!("{}{}data: [DONE]\n\n", delta("Hel"), delta("lo"));
        let (mut stream, releases) = tracked(stream_of(vec![Ok(body.into_bytes())]));

        let (result, commits) = collect(&mut stream, CancellationToken::new()).await;

        assert_eq!(result.unwrap(), StreamState::Done);
        assert_eq!(commits, vec!["Hello"]);
        assert_eq!(releases.count.load(Ordering::SeqCst), 1);
        assert_eq!(
            *releases.reasons.lock().unwrap(),
            vec![ReleaseReason::Completed]
        );
    }

    #[tokio::test]
    async fn text_is_independent_of_chunk_boundaries() {
        let fragments = ["The ", "quick ", "brøwn ", "fox ✓"];
        let body: String =
            fragments.iter().map(|f| delta(f)).collect::<String>() + "data: [DONE]\n\n";
        let bytes = body.into_bytes();

        let (mut per_event, _) = tracked(stream_of(vec![Ok(bytes.clone())]));
        let (expected, _) = collect(&mut per_event, CancellationToken::new()).await;
        assert_eq!(expected.unwrap(), StreamState::Done);

        for split in [1usize, 3, 7, 13] {
            let chunks = bytes.chunks(split).map(|c| Ok(c.to_vec())).collect();
            let (mut stream, releases) = tracked(stream_of(chunks));
            let (result, commits) = collect(&mut stream, CancellationToken::new()).await;
            assert_eq!(result.unwrap(), StreamState::Done);
            assert_eq!(commits.concat(), fragments.concat(), "split at {split}");
            assert_eq!(releases.count.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn deltas_are_committed_once_per_read() {
        let first = format!("{}{}", delta("a"), delta("b"));
        let second = format!("{}data: [DONE]\n\n", delta("c"));
        let (mut stream, _) = tracked(stream_of(vec![
            Ok(first.into_bytes()),
            Ok(second.into_bytes()),
        ]));

        let (_, commits) = collect(&mut stream, CancellationToken::new()).await;

        assert_eq!(commits, vec!["ab", "c"]);
    }

    #[tokio::test]
    async fn end_of_body_without_terminator_is_done() {
        let (mut stream, releases) = tracked(stream_of(vec![Ok(delta("tail").into_bytes())]));

        let (result, commits) = collect(&mut stream, CancellationToken::new()).await;

        assert_eq!(result.unwrap(), StreamState::Done);
        assert_eq!(commits, vec!["tail"]);
        assert_eq!(releases.count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_at_next_read_boundary() {
        let cancel = CancellationToken::new();
        let (mut stream, releases) = tracked(stream_of(vec![
            Ok(delta("kept").into_bytes()),
            Ok(delta("dropped").into_bytes()),
            Ok(b"data: [DONE]\n\n".to_vec()),
        ]));

        let mut commits = Vec::new();
        let mut consumer = StreamConsumer::new(cancel.clone());
        let result = consumer
            .consume(&mut stream, |fragment| {
                commits.push(fragment.to_string());
                cancel.cancel();
                Ok(())
            })
            .await;

        assert_eq!(result.unwrap(), StreamState::Cancelled);
        assert_eq!(consumer.state(), StreamState::Cancelled);
        assert_eq!(commits, vec!["kept"]);
        assert_eq!(releases.count.load(Ordering::SeqCst), 1);
        assert_eq!(
            *releases.reasons.lock().unwrap(),
            vec![ReleaseReason::UserCancelled]
        );
    }

    #[tokio::test]
    async fn read_fault_errors_and_releases_once() {
        let (mut stream, releases) = tracked(stream_of(vec![
            Ok(delta("partial").into_bytes()),
            Err("connection reset".into()),
        ]));

        let mut consumer = StreamConsumer::new(CancellationToken::new());
        let result = consumer.consume(&mut stream, |_| Ok(())).await;

        assert_eq!(
            result.unwrap_err(),
            ChatError::StreamFailure("connection reset".into())
        );
        assert_eq!(consumer.state(), StreamState::Errored);
        assert_eq!(releases.count.load(Ordering::SeqCst), 1);
        assert_eq!(*releases.reasons.lock().unwrap(), vec![ReleaseReason::Failed]);
    }

    #[tokio::test]
    async fn provider_error_event_is_a_stream_failure() {
        let body = "data: {\"error\":{\"message\":\"internal server error\"}}\n\n";
        let (mut stream, releases) = tracked(stream_of(vec![Ok(body.as_bytes().to_vec())]));

        let (result, commits) = collect(&mut stream, CancellationToken::new()).await;

        match result.unwrap_err() {
            ChatError::StreamFailure(text) => {
                assert!(text.starts_with("API Error: internal server error"))
            }
            other => panic!("expected stream failure, got {other:?}"),
        }
        assert!(commits.is_empty());
        assert_eq!(releases.count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn locked_stream_fails_without_reading() {
        let (mut stream, releases) = tracked(stream_of(vec![Ok(delta("x").into_bytes())]));
        let held = stream.reader().expect("first reader");
        assert!(stream.is_locked());

        let mut consumer = StreamConsumer::new(CancellationToken::new());
        let result = consumer.consume(&mut stream, |_| Ok(())).await;

        assert_eq!(result.unwrap_err(), ChatError::StreamLocked);
        assert_eq!(consumer.state(), StreamState::Idle);
        assert_eq!(releases.count.load(Ordering::SeqCst), 0);
        drop(held);
        assert_eq!(releases.count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn format_api_error_prettifies_json_with_summary() {
        let raw = r#"{"error":{"message":"model overloaded","type":"invalid_request_error"}}"#;
        let formatted = format_api_error(raw);

        let expected = r#"API Error: model overloaded
```json
{
  "error": {
    "message": "model overloaded",
    "type": "invalid_request_error"
  }
}
```"#;
        assert_eq!(formatted, expected);
    }

    #[test]
    fn format_api_error_handles_plaintext() {
        assert_eq!(
            format_api_error("bad gateway"),
            "API Error:\n```\nbad gateway\n```"
        );
        assert_eq!(format_api_error("   "), "API Error: <empty>");
    }
}
