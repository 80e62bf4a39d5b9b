//! Streaming utilities: line framing for upstream bodies, per-dialect
//! decoding into [`StreamEvent`]s, and outbound SSE formatting.

use super::{DialectCodec, StreamEvent};
use crate::core::error::UpstreamError;

// ============================================================================
// Line Framing
// ============================================================================

/// Longest unterminated line kept while waiting for its `\n`.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Splits an upstream byte stream into lines.
///
/// Splitting happens on `\n` at the byte level, so a UTF-8 sequence cut
/// across network chunks is reassembled before decoding. A trailing `\r`
/// is stripped from every line.
#[derive(Debug)]
pub struct LineBuffer {
    buffer: Vec<u8>,
    max_line: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_limit(MAX_LINE_BYTES)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer that fails once a pending line grows past `max_line` bytes.
    pub fn with_limit(max_line: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line,
        }
    }

    /// Append bytes and return every line completed by them.
    ///
    /// Fails with `Decode` when the remaining unterminated line exceeds
    /// the limit; the buffered bytes are discarded.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, UpstreamError> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            lines.push(Self::decode(&raw[..raw.len() - 1]));
        }

        if self.buffer.len() > self.max_line {
            let pending = self.buffer.len();
            self.buffer = Vec::new();
            return Err(UpstreamError::Decode(format!(
                "stream line exceeds {} bytes ({} buffered without newline)",
                self.max_line, pending
            )));
        }
        Ok(lines)
    }

    /// Take the final unterminated line, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.buffer);
        Some(Self::decode(&raw))
    }

    fn decode(raw: &[u8]) -> String {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        String::from_utf8_lossy(raw).into_owned()
    }
}

// ============================================================================
// Stream Decoder
// ============================================================================

/// Turns raw upstream body chunks into [`StreamEvent`]s for one dialect.
///
/// Once a terminal event has been produced, further input is ignored.
pub struct StreamDecoder {
    codec: &'static dyn DialectCodec,
    lines: LineBuffer,
    finished: bool,
}

impl StreamDecoder {
    pub fn new(codec: &'static dyn DialectCodec) -> Self {
        Self::with_line_buffer(codec, LineBuffer::new())
    }

    pub fn with_line_buffer(codec: &'static dyn DialectCodec, lines: LineBuffer) -> Self {
        Self {
            codec,
            lines,
            finished: false,
        }
    }

    /// Whether a terminal event has been produced.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Decode a body chunk.
    ///
    /// An overlong line ends the stream with a `Decode` error.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        match self.lines.push(chunk) {
            Ok(lines) => self.decode_lines(lines),
            Err(error) => {
                tracing::error!(error = %error, "Upstream stream line too long");
                self.finished = true;
                vec![StreamEvent::Error(error)]
            }
        }
    }

    /// Flush at upstream end-of-stream.
    ///
    /// If the upstream closed without a terminal marker the stream still
    /// ends cleanly with `Done { finish_reason: None }`.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        let mut events = match self.lines.finish() {
            Some(line) => self.decode_lines(vec![line]),
            None => Vec::new(),
        };
        if !self.finished {
            self.finished = true;
            events.push(StreamEvent::done(None));
        }
        events
    }

    fn decode_lines(&mut self, lines: Vec<String>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for line in lines {
            for event in self.codec.decode_stream_line(&line) {
                let terminal = event.is_terminal();
                events.push(event);
                if terminal {
                    self.finished = true;
                    return events;
                }
            }
        }
        events
    }
}

// ============================================================================
// SSE Serializer
// ============================================================================

/// Format a simple data-only SSE event.
pub fn format_sse_data(data: &str) -> String {
    format!("data: {}\n\n", data)
}

/// Format the SSE done marker.
pub fn format_sse_done() -> String {
    "data: [DONE]\n\n".to_string()
}
