//! Fuzz target for the single-byte transcoder.
//!
//! Tests that narrowing arbitrary strings never panics, that fixed-capacity
//! buffers are always terminated, and that Latin-1 text survives a round trip.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use registry_bridge::ascii::{from_ascii, to_ascii_into, to_new_ascii};

#[derive(Arbitrary, Debug)]
struct Input {
    text: String,
    capacity: u8,
}

fuzz_target!(|input: Input| {
    let ascii = to_new_ascii(&input.text).expect("allocation");
    assert_eq!(ascii.len(), input.text.chars().count());
    assert_eq!(ascii.as_bytes_with_nul().last(), Some(&0));

    let mut buf = vec![0xAAu8; input.capacity as usize];
    let copied = to_ascii_into(&input.text, &mut buf);
    if !buf.is_empty() {
        assert!(copied < buf.len());
        assert_eq!(buf[copied], 0);
    } else {
        assert_eq!(copied, 0);
    }

    let latin1 = input.text.chars().all(|c| (c as u32) < 0x100 && c != '\0');
    if latin1 {
        assert_eq!(from_ascii(ascii.as_bytes_with_nul()), input.text);
    }
});
