//! Fuzz target for ref advertisement parsing.
//!
//! Feeds arbitrary bytes through the blocking line producer and the
//! advertisement parser. Any outcome but a panic is acceptable.

#![no_main]

use libfuzzer_sys::fuzz_target;
use repligit::blocking::Lines;
use repligit::pktline::decode;
use repligit::protocol::discovery::parse_advertisement;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    let lines = Lines::with_chunk_size(Cursor::new(data), 7);
    if let Ok(advertisement) = parse_advertisement(decode(lines)) {
        for id in advertisement.refs.values() {
            assert_eq!(id.as_str().len(), repligit::HEX_LEN);
        }
    }
});
