//! Fuzz target for pkt-line decoding.
//!
//! Splits arbitrary input into lines with varying chunk sizes and decodes
//! every line. Decoding must never panic and must not depend on chunking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use repligit::pktline::decode;
use repligit::{Line, LineBuffer, PktLine, Result};

fn lines(data: &[u8], chunk_size: usize) -> Vec<Result<Line>> {
    let mut buffer = LineBuffer::new();
    let mut out = Vec::new();
    for chunk in data.chunks(chunk_size) {
        buffer.extend(chunk);
        while let Some(line) = buffer.next_line() {
            out.push(Ok(line));
        }
    }
    if let Some(rest) = buffer.finish() {
        out.push(Ok(rest));
    }
    out
}

fn frames(data: &[u8], chunk_size: usize) -> Vec<std::result::Result<PktLine, String>> {
    decode(lines(data, chunk_size))
        .take(1000)
        .map(|r| r.map_err(|e| e.to_string()))
        .collect()
}

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }
    let chunk_size = usize::from(data[0]).max(1);
    let body = &data[1..];

    assert_eq!(frames(body, chunk_size), frames(body, body.len().max(1)));
});
