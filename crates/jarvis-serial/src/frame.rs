//! Frame buffer for accumulating partial serial reads.
//!
//! The guest sends one command per line. Bytes are appended as they arrive
//! and complete lines are cut off the front of the buffer; anything after
//! the first delimiter stays buffered for the next extraction, so several
//! commands arriving in one read are all delivered, in order.
//!
//! ```ignore
//! let mut buffer = FrameBuffer::new();
//! buffer.push(b"hel");
//! assert!(buffer.extract().is_none());
//! buffer.push(b"lo\nwor");
//! assert_eq!(buffer.extract().unwrap().text(), "hello");
//! ```

pub const DELIMITER: u8 = b'\n';

/// Default upper bound on a pending, undelimited line.
pub const DEFAULT_MAX_FRAME: usize = 4096;

/// Observable state of the accumulation buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Nothing buffered.
    AwaitingData,
    /// Partial line buffered, no delimiter seen yet.
    AccumulatingFrame,
    /// At least one complete line can be extracted.
    FrameReady,
}

/// One decoded line, without its delimiter and surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(String);

impl Frame {
    pub fn text(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub struct FrameBuffer {
    buffer: Vec<u8>,
    max_frame: usize,
    /// Set while the remainder of an oversized line is still arriving.
    discarding: bool,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::with_max_frame(DEFAULT_MAX_FRAME)
    }

    pub fn with_max_frame(max_frame: usize) -> Self {
        Self { buffer: Vec::with_capacity(256), max_frame, discarding: false }
    }

    /// Append raw bytes. Returns how many bytes were dropped because an
    /// undelimited line grew past the limit (0 in the normal case).
    ///
    /// Once a line is dropped, everything up to and including its delimiter
    /// is dropped too, so its tail never surfaces as a frame of its own.
    pub fn push(&mut self, data: &[u8]) -> usize {
        let mut data = data;
        let mut dropped = 0;

        if self.discarding {
            match data.iter().position(|&b| b == DELIMITER) {
                Some(pos) => {
                    dropped += pos + 1;
                    data = &data[pos + 1..];
                    self.discarding = false;
                }
                None => return data.len(),
            }
        }

        self.buffer.extend_from_slice(data);

        let tail_start = self
            .buffer
            .iter()
            .rposition(|&b| b == DELIMITER)
            .map_or(0, |pos| pos + 1);
        let tail = self.buffer.len() - tail_start;
        if tail > self.max_frame {
            self.buffer.truncate(tail_start);
            self.discarding = true;
            dropped += tail;
        }
        dropped
    }

    /// Cut the first complete line off the buffer.
    ///
    /// Invalid UTF-8 is replaced, a trailing `\r` is tolerated and the text
    /// is trimmed. Bytes after the delimiter are kept.
    pub fn extract(&mut self) -> Option<Frame> {
        let pos = self.buffer.iter().position(|&b| b == DELIMITER)?;
        let line: Vec<u8> = self.buffer.drain(..=pos).collect();
        let text = String::from_utf8_lossy(&line[..pos]);
        Some(Frame(text.trim().to_string()))
    }

    pub fn state(&self) -> FrameState {
        if self.buffer.is_empty() {
            FrameState::AwaitingData
        } else if self.buffer.contains(&DELIMITER) {
            FrameState::FrameReady
        } else {
            FrameState::AccumulatingFrame
        }
    }

    /// Bytes currently buffered.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
