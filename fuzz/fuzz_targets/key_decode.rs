//! Fuzz target for base64 key decoding
//!
//! # Invariants
//!
//! - `decode_key` never panics on arbitrary text
//! - Decoded bytes re-encode to canonical base64 that decodes to the same bytes
//! - `decode_key_array` accepts exactly the inputs whose decoded length matches

#![no_main]

use edgevault_core::{KEY_LEN, decode_key, decode_key_array, encode_key};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|text: &str| {
    let Ok(bytes) = decode_key(text) else {
        assert!(decode_key_array::<KEY_LEN>(text).is_err());
        return;
    };

    let canonical = encode_key(&bytes);
    assert_eq!(decode_key(&canonical).expect("canonical form must decode"), bytes);

    match decode_key_array::<KEY_LEN>(text) {
        Ok(key) => assert_eq!(key.as_slice(), bytes.as_slice()),
        Err(_) => assert_ne!(bytes.len(), KEY_LEN),
    }
});
