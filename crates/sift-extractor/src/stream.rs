//! Newline-delimited JSON wire format for progress streaming
//!
//! Each line is one self-contained JSON object:
//!
//! ```text
//! {"type":"progress","chunk":1,"totalChunks":4,"currentResults":{...},"usage":{...}}
//! {"type":"complete","results":{...}}
//! {"type":"error","error":"..."}
//! ```

use serde::{Deserialize, Serialize};
use sift_domain::{Accumulator, UsageMetrics};
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::warn;

/// One line of the progress stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireEvent {
    /// A chunk was merged; `chunk` counts from 1
    Progress {
        /// 1-based chunk number
        chunk: usize,
        /// Chunks in the run
        #[serde(rename = "totalChunks")]
        total_chunks: usize,
        /// Accumulator after this chunk
        #[serde(rename = "currentResults")]
        current_results: Accumulator,
        /// Tokens spent on this chunk
        usage: UsageMetrics,
    },

    /// The run finished
    Complete {
        /// Final accumulator
        results: Accumulator,
    },

    /// The run failed
    Error {
        /// Human-readable message
        error: String,
    },
}

/// Encode an event as one JSON line, terminator included
pub fn encode_line(event: &WireEvent) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(event)?;
    line.push('\n');
    Ok(line)
}

/// A line read back from the stream
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedLine {
    /// Progress event
    Progress {
        /// 1-based chunk number
        chunk: usize,
        /// Chunks in the run
        total_chunks: usize,
        /// Accumulator after this chunk
        current_results: Accumulator,
        /// Tokens spent on this chunk
        usage: UsageMetrics,
    },
    /// Completion event
    Complete {
        /// Final accumulator
        results: Accumulator,
    },
    /// Error event
    Error {
        /// Human-readable message
        error: String,
    },
    /// Line that was not a recognised event
    Malformed {
        /// The offending line
        line: String,
        /// Why it was rejected
        reason: String,
    },
}

impl From<WireEvent> for DecodedLine {
    fn from(event: WireEvent) -> Self {
        match event {
            WireEvent::Progress {
                chunk,
                total_chunks,
                current_results,
                usage,
            } => DecodedLine::Progress {
                chunk,
                total_chunks,
                current_results,
                usage,
            },
            WireEvent::Complete { results } => DecodedLine::Complete { results },
            WireEvent::Error { error } => DecodedLine::Error { error },
        }
    }
}

/// Incremental reader for the progress stream
///
/// Bytes may arrive split anywhere, including inside a UTF-8 sequence; an
/// unterminated tail is held until its newline arrives or [`finish`] is
/// called.
///
/// [`finish`]: LineDecoder::finish
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    malformed: usize,
}

impl LineDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every line they complete
    pub fn push(&mut self, bytes: &[u8]) -> Vec<DecodedLine> {
        self.buffer.extend_from_slice(bytes);

        let mut decoded = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(item) = self.decode(&line[..line.len() - 1]) {
                decoded.push(item);
            }
        }
        decoded
    }

    /// Feed text
    pub fn push_str(&mut self, text: &str) -> Vec<DecodedLine> {
        self.push(text.as_bytes())
    }

    /// Decode whatever is left once the stream has ended
    pub fn finish(&mut self) -> Option<DecodedLine> {
        let rest = std::mem::take(&mut self.buffer);
        self.decode(&rest)
    }

    /// Malformed lines seen so far
    pub fn malformed_count(&self) -> usize {
        self.malformed
    }

    /// Bytes buffered awaiting a terminator
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn decode(&mut self, raw: &[u8]) -> Option<DecodedLine> {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = String::from_utf8_lossy(raw);
        if line.trim().is_empty() {
            return None;
        }

        match serde_json::from_str::<WireEvent>(&line) {
            Ok(event) => Some(event.into()),
            Err(e) => {
                self.malformed += 1;
                warn!("Skipping malformed stream line: {}", e);
                Some(DecodedLine::Malformed {
                    line: line.into_owned(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

/// Async NDJSON writer; every event is flushed as soon as it is written
pub struct NdjsonWriter<W> {
    inner: W,
    lines: usize,
}

impl<W: AsyncWrite + Unpin> NdjsonWriter<W> {
    /// Wrap a writer
    pub fn new(inner: W) -> Self {
        Self { inner, lines: 0 }
    }

    /// Write one event and flush
    pub async fn write_event(&mut self, event: &WireEvent) -> io::Result<()> {
        let line = encode_line(event).map_err(io::Error::other)?;
        self.inner.write_all(line.as_bytes()).await?;
        self.inner.flush().await?;
        self.lines += 1;
        Ok(())
    }

    /// Lines written so far
    pub fn lines_written(&self) -> usize {
        self.lines
    }

    /// Unwrap the inner writer
    pub fn into_inner(self) -> W {
        self.inner
    }
}
