//! Line assembly over arbitrarily chunked network reads.
//!
//! [`LineBuffer`] does no I/O of its own. The blocking and async clients feed
//! it whatever chunks the transport yields and pull complete lines (or exact
//! byte counts) back out, so both execution modes share one buffering policy.

use bytes::{Bytes, BytesMut};
use std::ops::Deref;

/// One newline-delimited line.
///
/// Dereferences to the content with `\n` and any trailing `\r` removed. The
/// removed terminator stays available, since a pkt-line length may count it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    raw: Bytes,
    len: usize,
}

impl Line {
    fn new(raw: Bytes) -> Self {
        let mut len = raw.len();
        if raw.last() == Some(&b'\n') {
            len -= 1;
        }
        while len > 0 && raw[len - 1] == b'\r' {
            len -= 1;
        }
        Self { raw, len }
    }

    /// The line without its terminator.
    pub fn content(&self) -> Bytes {
        self.raw.slice(..self.len)
    }

    /// The line exactly as received, terminator included.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// The bytes removed from the end: empty for the remainder at end of stream.
    pub fn terminator(&self) -> &[u8] {
        &self.raw[self.len..]
    }
}

impl Deref for Line {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.raw[..self.len]
    }
}

impl From<&'static [u8]> for Line {
    fn from(raw: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(raw))
    }
}

impl PartialEq<str> for Line {
    fn eq(&self, other: &str) -> bool {
        **self == *other.as_bytes()
    }
}

impl PartialEq<&str> for Line {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

/// Accumulates raw bytes and hands out newline-delimited lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: BytesMut,
}

impl LineBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk read from the network.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Removes and returns the next complete line.
    ///
    /// Returns `None` when no newline is buffered yet.
    pub fn next_line(&mut self) -> Option<Line> {
        let idx = self.buf.iter().position(|&b| b == b'\n')?;
        Some(Line::new(self.buf.split_to(idx + 1).freeze()))
    }

    /// Drains the newline-less remainder once the stream has ended.
    pub fn finish(&mut self) -> Option<Line> {
        if self.buf.is_empty() {
            return None;
        }
        Some(Line::new(self.buf.split().freeze()))
    }

    /// Removes exactly `n` bytes if that many are buffered.
    pub fn take(&mut self, n: usize) -> Option<Bytes> {
        if self.buf.len() < n {
            return None;
        }
        Some(self.buf.split_to(n).freeze())
    }

    /// Removes everything buffered, untouched.
    pub fn take_all(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
