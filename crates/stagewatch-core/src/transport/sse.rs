//! SSE (Server-Sent Events) wire decoding
//!
//! Turns raw byte chunks from a `text/event-stream` body into named frames.
//! Chunks may split lines, frames and even UTF-8 sequences at any point.

use std::time::Instant;

use tracing::{debug, info, warn};

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the last `event:` field, `None` for the default `message` type
    pub event: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
}

/// Incremental SSE decoder that handles partial lines and buffering
pub struct SseDecoder {
    /// Bytes of an incomplete UTF-8 sequence from the previous chunk
    pending_bytes: Vec<u8>,
    /// Accumulated partial line from previous chunks
    partial_line: String,
    /// Previous chunk ended in `\r`; a leading `\n` belongs to that line break
    pending_cr: bool,
    /// Whether the byte-order mark check has run
    started: bool,
    /// Event name of the frame being built
    event: Option<String>,
    /// Data of the frame being built
    data: String,
    has_data: bool,
    /// When the stream started
    stream_start: Instant,
    /// Frame counter for logging
    frame_count: usize,
    /// Bytes received counter
    bytes_received: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            pending_bytes: Vec::new(),
            partial_line: String::new(),
            pending_cr: false,
            started: false,
            event: None,
            data: String::new(),
            has_data: false,
            stream_start: Instant::now(),
            frame_count: 0,
            bytes_received: 0,
        }
    }

    /// Feed a chunk of bytes, returning every frame it completes
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.bytes_received += bytes.len();
        debug!(
            "SSE chunk received: {} bytes (total: {} bytes)",
            bytes.len(),
            self.bytes_received
        );

        let mut text = self.take_text(bytes);
        if !self.started && !text.is_empty() {
            self.started = true;
            if let Some(stripped) = text.strip_prefix('\u{FEFF}') {
                text = stripped.to_string();
            }
        }

        let mut frames = Vec::new();
        for ch in text.chars() {
            match ch {
                '\n' if self.pending_cr => {
                    self.pending_cr = false;
                }
                '\n' | '\r' => {
                    self.pending_cr = ch == '\r';
                    let line = std::mem::take(&mut self.partial_line);
                    if let Some(frame) = self.process_line(&line) {
                        frames.push(frame);
                    }
                }
                _ => {
                    self.pending_cr = false;
                    self.partial_line.push(ch);
                }
            }
        }
        frames
    }

    /// End of stream. An unterminated trailing frame is discarded.
    pub fn finish(&mut self) {
        let elapsed = self.stream_start.elapsed();
        if self.has_data || !self.partial_line.is_empty() || !self.pending_bytes.is_empty() {
            warn!(
                "SSE stream ended mid-frame, discarding {} buffered bytes",
                self.data.len() + self.partial_line.len() + self.pending_bytes.len()
            );
        }
        self.partial_line.clear();
        self.pending_bytes.clear();
        self.reset_frame();
        info!(
            "SSE decoder finishing: {:?} elapsed, {} frames, {} bytes total",
            elapsed, self.frame_count, self.bytes_received
        );
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Decode as much UTF-8 as possible, holding back an incomplete trailing sequence.
    /// Each invalid byte run becomes one U+FFFD; valid text around it is kept.
    fn take_text(&mut self, bytes: &[u8]) -> String {
        self.pending_bytes.extend_from_slice(bytes);
        let buffer = std::mem::take(&mut self.pending_bytes);
        let mut text = String::with_capacity(buffer.len());
        let mut rest = buffer.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    text.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.pending_bytes = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        text
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        // Blank line dispatches
        if line.is_empty() {
            return self.dispatch();
        }
        // SSE comment (keep-alive)
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => {
                self.event = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            "id" | "retry" => {}
            other => debug!("Ignoring unknown SSE field: {}", other),
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        if !self.has_data {
            self.reset_frame();
            return None;
        }
        self.frame_count += 1;
        let frame = SseFrame {
            event: self.event.take(),
            data: std::mem::take(&mut self.data),
        };
        self.reset_frame();
        debug!(
            "SSE frame #{} at {:?}: event={}",
            self.frame_count,
            self.stream_start.elapsed(),
            frame.event.as_deref().unwrap_or("message")
        );
        Some(frame)
    }

    fn reset_frame(&mut self) {
        self.event = None;
        self.data.clear();
        self.has_data = false;
    }
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}
