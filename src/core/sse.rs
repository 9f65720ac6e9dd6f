//! Incremental server-sent-event record buffer.
//!
//! Transport chunks are appended as raw bytes; complete records (terminated
//! by a blank line) are handed out one at a time and any trailing partial
//! record stays buffered for the next read. Working on bytes means a UTF-8
//! sequence split across reads is decoded only once it is whole.

use memchr::memmem;

const RECORD_TERMINATOR: &[u8] = b"\n\n";

/// The payload of one complete event: its `data:` lines joined by `\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseRecord {
    pub data: String,
}

#[derive(Debug, Default)]
pub struct EventBuffer {
    pending: Vec<u8>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw bytes. Carriage returns are dropped so `\r\n` framing
    /// reduces to `\n` regardless of where a chunk boundary falls.
    pub fn push(&mut self, chunk: &[u8]) {
        self.pending
            .extend(chunk.iter().copied().filter(|byte| *byte != b'\r'));
    }

    pub fn has_complete_record(&self) -> bool {
        memmem::find(&self.pending, RECORD_TERMINATOR).is_some()
    }

    /// Removes and returns the next complete record that carries data.
    /// Records with no `data:` lines (comments, keep-alives) are skipped.
    pub fn next_record(&mut self) -> Option<SseRecord> {
        while let Some(end) = memmem::find(&self.pending, RECORD_TERMINATOR) {
            let raw: Vec<u8> = self.pending.drain(..end + RECORD_TERMINATOR.len()).collect();
            if let Some(record) = parse_record(&raw[..end]) {
                return Some(record);
            }
        }
        None
    }

    /// Flushes whatever remains once the transport reports end of stream.
    pub fn finish(&mut self) -> Option<SseRecord> {
        if self.pending.iter().all(u8::is_ascii_whitespace) {
            self.pending.clear();
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        parse_record(&raw)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn parse_record(raw: &[u8]) -> Option<SseRecord> {
    let text = String::from_utf8_lossy(raw);
    let mut data_lines = Vec::new();
    for line in text.split('\n') {
        if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }

    if data_lines.is_empty() {
        return None;
    }
    Some(SseRecord {
        data: data_lines.join("\n"),
    })
}
