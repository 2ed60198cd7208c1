use std::io::{self, Read};
use std::ops::Range;

use bytes::BytesMut;

/// Default read buffer capacity per connection.
pub const READ_BUFFER_SIZE: usize = 2048;

/// Result of a single fill attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// This many bytes were appended.
    Read(usize),
    /// The peer closed its write half.
    Closed,
    /// No more room; the request can never complete.
    Full,
}

/// Bounded receive buffer with parse cursors.
///
/// `read_pos` is the number of bytes received, `checked_pos` how far the
/// line scanner has looked and `line_start` where the current line begins.
/// `line_start <= checked_pos <= read_pos <= capacity` always holds.
#[derive(Debug, Clone)]
pub struct ReadBuffer {
    data: BytesMut,
    capacity: usize,
    checked_pos: usize,
    line_start: usize,
}

impl Default for ReadBuffer {
    fn default() -> Self {
        Self::with_capacity(READ_BUFFER_SIZE)
    }
}

impl PartialEq for ReadBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.capacity == other.capacity
            && self.checked_pos == other.checked_pos
            && self.line_start == other.line_start
            && self.data[..] == other.data[..]
    }
}

impl ReadBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            capacity,
            checked_pos: 0,
            line_start: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn read_pos(&self) -> usize {
        self.data.len()
    }

    pub fn checked_pos(&self) -> usize {
        self.checked_pos
    }

    pub fn line_start(&self) -> usize {
        self.line_start
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.data.len()
    }

    pub fn is_full(&self) -> bool {
        self.remaining() == 0
    }

    /// Bytes received so far.
    pub fn filled(&self) -> &[u8] {
        &self.data
    }

    pub fn slice(&self, span: Range<usize>) -> &[u8] {
        &self.data[span]
    }

    /// Reads once from `src` into the free tail of the buffer.
    ///
    /// `WouldBlock` and other errors are returned untouched.
    pub fn fill_from<R: Read + ?Sized>(&mut self, src: &mut R) -> io::Result<Fill> {
        if self.is_full() {
            return Ok(Fill::Full);
        }
        let start = self.data.len();
        self.data.resize(self.capacity, 0);
        match src.read(&mut self.data[start..]) {
            Ok(0) => {
                self.data.truncate(start);
                Ok(Fill::Closed)
            }
            Ok(n) => {
                self.data.truncate(start + n);
                Ok(Fill::Read(n))
            }
            Err(e) => {
                self.data.truncate(start);
                Err(e)
            }
        }
    }

    /// Appends bytes directly, up to the remaining capacity. Returns how many
    /// were taken.
    pub fn extend(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.remaining());
        self.data.extend_from_slice(&bytes[..n]);
        n
    }

    pub(crate) fn byte_at(&self, pos: usize) -> u8 {
        self.data[pos]
    }

    pub(crate) fn set_checked(&mut self, pos: usize) {
        debug_assert!(pos <= self.data.len());
        self.checked_pos = pos;
    }

    /// Starts the next line at the current scan position.
    pub(crate) fn mark_line(&mut self) {
        self.line_start = self.checked_pos;
    }

    /// Drops all content and rewinds every cursor.
    pub fn clear(&mut self) {
        self.data.clear();
        self.checked_pos = 0;
        self.line_start = 0;
    }
}
