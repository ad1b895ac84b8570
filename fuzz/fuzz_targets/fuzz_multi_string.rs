//! Fuzz target for multi-string decoding with arbitrary registry data.
//!
//! Decoding must never panic, and whatever it produces must encode back to a
//! buffer that decodes to the same elements. Splicing a NUL into any element
//! must make encoding fail.

#![no_main]

use libfuzzer_sys::fuzz_target;
use registry_bridge::codec::{decode_multi_string, encode_multi_string};

fuzz_target!(|data: &[u8]| {
    // Limit size to avoid OOM
    if data.len() > 100_000 {
        return;
    }

    let Ok(items) = decode_multi_string(data) else {
        return;
    };

    // Decoded elements never contain the delimiter
    assert!(items.iter().all(|s| !s.contains('\0')));

    let encoded = encode_multi_string(&items).expect("encode");
    assert_eq!(encoded.as_bytes().last(), Some(&0));
    assert_eq!(decode_multi_string(encoded.as_bytes()).expect("decode"), items);

    if let Some(first) = items.first() {
        let mut spliced = items.clone();
        spliced[0] = format!("{first}\0{first}");
        assert!(encode_multi_string(&spliced).is_err());
    }
});
