//! Git pkt-line format implementation.
//!
//! Every line is prefixed with a 4-character lowercase hex length that counts
//! the header itself, or "0000" for a flush marker. Requests are written with
//! [`PktLineWriter`]; responses arrive as newline-delimited lines from a
//! [`LineBuffer`](crate::lines::LineBuffer) and are turned back into frames by
//! [`PktDecoder`], which both execution modes share.

use crate::lines::Line;
use crate::{GitError, Result};
use bytes::Bytes;
use futures::stream::{self, Stream};
use std::collections::VecDeque;
use std::io::Write;

/// The flush marker.
pub const FLUSH: &[u8] = b"0000";

/// Largest total frame length a 4-digit header can declare.
pub const MAX_PKT_LEN: usize = 0xffff;

/// A pkt-line packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    /// Data line with content, trailing newline removed.
    Data(Bytes),
    /// Flush packet (0000).
    Flush,
}

impl PktLine {
    /// Creates a data packet from a string slice.
    pub fn from_string(s: &str) -> Self {
        Self::Data(Bytes::copy_from_slice(s.as_bytes()))
    }

    /// Creates a data packet from bytes.
    pub fn from_bytes(b: impl Into<Bytes>) -> Self {
        Self::Data(b.into())
    }

    /// Encodes the packet, appending the newline data lines are sent with.
    ///
    /// The payload is not checked; use [`encode_lines`] or
    /// [`PktLineWriter::write_line`] for validated encoding.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Data(data) => {
                let len = data.len() + 5; // header plus trailing newline
                let mut result = format!("{:04x}", len).into_bytes();
                result.extend_from_slice(data);
                result.push(b'\n');
                result
            }
            Self::Flush => FLUSH.to_vec(),
        }
    }

    /// Returns true if this is a flush packet.
    pub fn is_flush(&self) -> bool {
        matches!(self, Self::Flush)
    }

    /// Returns the data content, or None for a flush.
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Self::Data(data) => Some(data),
            Self::Flush => None,
        }
    }

    /// Returns the data as a string.
    pub fn as_str(&self) -> Option<&str> {
        self.data().and_then(|d| std::str::from_utf8(d).ok())
    }

    /// Returns the payload, treating a flush as an empty line.
    pub fn payload(&self) -> &[u8] {
        self.data().unwrap_or_default()
    }
}

/// Encodes payloads as consecutive pkt-lines.
///
/// Payloads must not contain a newline, since one is appended to each.
pub fn encode_lines<I, L>(lines: I) -> Result<Bytes>
where
    I: IntoIterator<Item = L>,
    L: AsRef<[u8]>,
{
    let mut writer = PktLineWriter::new(Vec::new());
    for line in lines {
        writer.write_line(line.as_ref())?;
    }
    Ok(Bytes::from(writer.into_inner()))
}

/// Parses a 4-digit hex length header.
///
/// Returns 0 for a flush marker, otherwise the total frame length (>= 4).
pub fn parse_length(header: &[u8]) -> Result<usize> {
    if header.len() != 4 || !header.iter().all(u8::is_ascii_hexdigit) {
        return Err(GitError::InvalidPktLine(format!(
            "invalid length prefix {:?}",
            String::from_utf8_lossy(header)
        )));
    }

    // All four bytes are ASCII hex digits.
    let len = header
        .iter()
        .fold(0usize, |acc, &b| acc * 16 + (b as char).to_digit(16).unwrap_or(0) as usize);

    if (1..4).contains(&len) {
        return Err(GitError::InvalidPktLine(format!(
            "length {len} is below the 4-byte minimum"
        )));
    }
    Ok(len)
}

/// Removes the single trailing newline a data frame is usually sent with.
pub(crate) fn strip_newline(mut payload: Bytes) -> Bytes {
    if payload.last() == Some(&b'\n') {
        payload.truncate(payload.len() - 1);
    }
    payload
}

/// Decodes one newline-delimited line into the frames it contains.
///
/// Servers put a flush marker and the following frame on the same line
/// (`0000` + `0155<id> HEAD...`), so decoding continues after a flush until
/// the line is consumed. A declared length may run into the line's own
/// terminator, and those bytes belong to the payload, but never past it.
pub fn decode_line(line: &Line) -> Result<Vec<PktLine>> {
    if line.is_empty() {
        return Err(GitError::InvalidPktLine("empty line".to_string()));
    }

    let raw = line.raw();
    let mut frames = Vec::new();
    let mut pos = 0;
    while pos < line.len() {
        let header = line
            .get(pos..pos + 4)
            .ok_or_else(|| GitError::InvalidPktLine("truncated length prefix".to_string()))?;
        let len = parse_length(header)?;

        if len == 0 {
            frames.push(PktLine::Flush);
            pos += 4;
            continue;
        }

        let end = pos + len;
        if end > raw.len() {
            return Err(GitError::InvalidPktLine(format!(
                "frame declares {len} bytes but only {} remain",
                raw.len() - pos
            )));
        }
        frames.push(PktLine::Data(strip_newline(raw.slice(pos + 4..end))));
        pos = end;
    }

    Ok(frames)
}

/// Incremental decoder fed one line at a time.
#[derive(Debug, Default)]
pub struct PktDecoder {
    pending: VecDeque<PktLine>,
}

impl PktDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a line and queues its frames.
    pub fn push_line(&mut self, line: Line) -> Result<()> {
        self.pending.extend(decode_line(&line)?);
        Ok(())
    }

    /// Pops the next decoded frame.
    pub fn next_pkt(&mut self) -> Option<PktLine> {
        self.pending.pop_front()
    }
}

/// Lazily decodes frames from a pull-based line producer.
pub fn decode<I>(lines: I) -> Decode<I::IntoIter>
where
    I: IntoIterator<Item = Result<Line>>,
{
    Decode {
        lines: lines.into_iter(),
        decoder: PktDecoder::new(),
    }
}

/// Iterator returned by [`decode`].
#[derive(Debug)]
pub struct Decode<I> {
    lines: I,
    decoder: PktDecoder,
}

impl<I> Iterator for Decode<I>
where
    I: Iterator<Item = Result<Line>>,
{
    type Item = Result<PktLine>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(pkt) = self.decoder.next_pkt() {
                return Some(Ok(pkt));
            }
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e)),
            };
            if let Err(e) = self.decoder.push_line(line) {
                return Some(Err(e));
            }
        }
    }
}

/// Lazily decodes frames from a suspend-on-read line producer.
pub fn decode_stream<S>(lines: S) -> impl Stream<Item = Result<PktLine>>
where
    S: Stream<Item = Result<Line>>,
{
    use futures::StreamExt;

    stream::unfold(
        (Box::pin(lines), PktDecoder::new()),
        |(mut lines, mut decoder)| async move {
            loop {
                if let Some(pkt) = decoder.next_pkt() {
                    return Some((Ok(pkt), (lines, decoder)));
                }
                let line = match lines.next().await? {
                    Ok(line) => line,
                    Err(e) => return Some((Err(e), (lines, decoder))),
                };
                if let Err(e) = decoder.push_line(line) {
                    return Some((Err(e), (lines, decoder)));
                }
            }
        },
    )
}

/// Writer for pkt-line format.
pub struct PktLineWriter<W> {
    writer: W,
}

impl<W: Write> PktLineWriter<W> {
    /// Creates a new pkt-line writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a packet.
    pub fn write(&mut self, pkt: &PktLine) -> Result<()> {
        self.writer.write_all(&pkt.encode())?;
        Ok(())
    }

    /// Writes a data line; the trailing newline is added here.
    pub fn write_line(&mut self, payload: &[u8]) -> Result<()> {
        if payload.contains(&b'\n') {
            return Err(GitError::InvalidPktLine(
                "payload must not contain a newline".to_string(),
            ));
        }
        if payload.len() + 5 > MAX_PKT_LEN {
            return Err(GitError::InvalidPktLine(format!(
                "payload of {} bytes does not fit a pkt-line",
                payload.len()
            )));
        }
        self.write(&PktLine::Data(Bytes::copy_from_slice(payload)))
    }

    /// Writes a flush packet.
    pub fn flush_pkt(&mut self) -> Result<()> {
        self.write(&PktLine::Flush)
    }

    /// Writes bytes verbatim, without framing.
    pub fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        Ok(())
    }

    /// Returns the inner writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
