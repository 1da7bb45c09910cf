//! Line framing
//!
//! Reassembles CR/LF-terminated lines from arbitrarily chunked serial reads.

use bytes::{Buf, Bytes, BytesMut};

/// Default cap on an unterminated line before it is flushed as-is
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4096;

#[inline]
fn is_terminator(byte: u8) -> bool {
    byte == b'\r' || byte == b'\n'
}

/// Streaming line splitter
///
/// Bytes are appended with [`push`](Self::push); every complete line is
/// returned and only the trailing partial fragment is retained. Empty
/// segments (e.g. between `\r` and `\n`) are discarded, so CR, LF and CRLF
/// terminators all behave the same.
///
/// After every call the pending buffer holds no line terminator. A fragment
/// longer than the configured maximum is flushed as a line of its own.
#[derive(Debug, Clone)]
pub struct LineBuffer {
    pending: BytesMut,
    max_line_length: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    /// Create an empty buffer with the default line length cap
    pub fn new() -> Self {
        Self::with_max_line_length(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Create an empty buffer with a custom line length cap
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            pending: BytesMut::with_capacity(256),
            max_line_length: max_line_length.max(1),
        }
    }

    /// Append a chunk and return all lines it completes, in arrival order
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| is_terminator(b)) {
            let line = self.pending.split_to(pos).freeze();
            self.pending.advance(1);
            if !line.is_empty() {
                lines.push(line);
            }
        }

        if self.pending.len() > self.max_line_length {
            tracing::debug!(
                "Flushing unterminated fragment of {} bytes",
                self.pending.len()
            );
            lines.push(self.pending.split().freeze());
        }

        lines
    }

    /// The retained partial fragment
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Take the retained fragment, leaving the buffer empty
    pub fn take_pending(&mut self) -> Bytes {
        self.pending.split().freeze()
    }

    /// Is there a partial fragment?
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Discard the partial fragment
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
