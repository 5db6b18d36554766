//! Event-stream frame decoding.
//!
//! The chat endpoint answers with a chunked body of lines of the form
//! `data: {"content":"<delta>"}` separated by blank lines. Network reads
//! split that text anywhere, including inside a multi-byte character, so
//! the decoder buffers raw bytes and only decodes complete lines.

use std::collections::VecDeque;

use futures::stream::{self, BoxStream};
use futures::StreamExt;
use serde::Deserialize;

use crate::error::{Result, StreamError};
use crate::transport::ByteStream;

/// Line prefix that marks a frame.
pub const FRAME_PREFIX: &str = "data:";

/// Default cap on one frame line, in bytes.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// One decoded event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamFrame {
    /// Text appended by this event.
    #[serde(rename = "content")]
    pub content_delta: String,
}

/// Incremental decoder from raw bytes to frames.
///
/// A line longer than the decoder's limit, terminated or not, fails the
/// decoder with `StreamError::FrameTooLarge`.
#[derive(Debug)]
pub struct FrameDecoder {
    pending: Vec<u8>,
    max_line: usize,
    failed: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::with_limit(DEFAULT_MAX_LINE_BYTES)
    }
}

impl FrameDecoder {
    /// Create an empty decoder with the default line limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty decoder that rejects lines over `max_line` bytes.
    #[must_use]
    pub fn with_limit(max_line: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line,
            failed: false,
        }
    }

    /// Feed one chunk of bytes.
    ///
    /// Returns one entry per complete frame line, in order. Decoding stops at
    /// the first malformed line, which is returned as the final `Err` entry;
    /// after that the decoder is spent and yields nothing more.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<StreamFrame>> {
        if self.failed {
            return Vec::new();
        }
        self.pending.extend_from_slice(chunk);

        let mut out = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let parsed = if offset > self.max_line {
                Err(StreamError::FrameTooLarge {
                    limit: self.max_line,
                })
            } else {
                parse_line(&self.pending[start..end])
            };
            start = end + 1;
            match parsed {
                Ok(Some(frame)) => out.push(Ok(frame)),
                Ok(None) => {}
                Err(e) => {
                    self.failed = true;
                    self.pending.clear();
                    out.push(Err(e));
                    return out;
                }
            }
        }
        self.pending.drain(..start);

        if self.pending.len() > self.max_line {
            self.failed = true;
            self.pending.clear();
            out.push(Err(StreamError::FrameTooLarge {
                limit: self.max_line,
            }));
        }
        out
    }

    /// Flush a trailing line that was never newline-terminated.
    ///
    /// Call once when the underlying stream closes.
    pub fn finish(&mut self) -> Vec<Result<StreamFrame>> {
        if self.failed || self.pending.is_empty() {
            return Vec::new();
        }
        let line = std::mem::take(&mut self.pending);
        match parse_line(&line) {
            Ok(Some(frame)) => vec![Ok(frame)],
            Ok(None) => Vec::new(),
            Err(e) => {
                self.failed = true;
                vec![Err(e)]
            }
        }
    }

    /// Whether a partial line is buffered.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Parse one complete line (without its `\n`).
///
/// Lines that are not frames (blank separators, `:` comments, other event
/// fields) yield `None`.
fn parse_line(raw: &[u8]) -> Result<Option<StreamFrame>> {
    let text = String::from_utf8_lossy(raw);
    let line = text.strip_suffix('\r').unwrap_or(&text);

    let Some(payload) = line.strip_prefix(FRAME_PREFIX) else {
        return Ok(None);
    };
    let payload = payload.strip_prefix(' ').unwrap_or(payload);

    serde_json::from_str(payload)
        .map(Some)
        .map_err(|source| StreamError::FrameParse {
            line: line.to_string(),
            source,
        })
}

/// Turn a byte stream into a lazy stream of frames, capping lines at
/// `max_line` bytes.
///
/// The returned stream ends when the byte stream closes, and ends right
/// after yielding the first error.
pub fn frames(bytes: ByteStream, max_line: usize) -> BoxStream<'static, Result<StreamFrame>> {
    struct State {
        bytes: ByteStream,
        decoder: FrameDecoder,
        ready: VecDeque<Result<StreamFrame>>,
        done: bool,
    }

    let state = State {
        bytes,
        decoder: FrameDecoder::with_limit(max_line),
        ready: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.ready.pop_front() {
                if item.is_err() {
                    st.done = true;
                    st.ready.clear();
                }
                return Some((item, st));
            }
            if st.done {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => st.ready.extend(st.decoder.feed(&chunk)),
                Some(Err(e)) => st.ready.push_back(Err(e)),
                None => {
                    st.done = true;
                    st.ready.extend(st.decoder.finish());
                }
            }
        }
    })
    .boxed()
}
